//! Signal de-duplication
//!
//! A signal for the same symbol, pattern type and timeframe is emitted at
//! most once per cooldown window. The store is shared between engines and
//! threads; check-and-set happens in one critical section.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::pattern::PatternKind;

/// Default cooldown window
pub const DEFAULT_COOLDOWN_HOURS: i64 = 4;
/// Default number of keys kept before the least recently emitted is evicted
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Identity of a signal for de-duplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub symbol: String,
    pub pattern: PatternKind,
    pub timeframe: String,
}

impl DedupKey {
    pub fn new(symbol: &str, pattern: PatternKind, timeframe: &str) -> Self {
        Self {
            symbol: symbol.to_owned(),
            pattern,
            timeframe: timeframe.to_owned(),
        }
    }
}

/// Cooldown bookkeeping shared by engines
pub trait CooldownStore: Send + Sync {
    /// Records an emission at `now` and returns true if `key` is outside its
    /// cooldown window. Returns false (and records nothing) otherwise.
    fn try_acquire(&self, key: &DedupKey, now: DateTime<Utc>) -> bool;

    /// Last emission time of `key`, if still tracked
    fn last_emission(&self, key: &DedupKey) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Default)]
struct State {
    /// key -> (last emission, insertion tick)
    entries: HashMap<DedupKey, (DateTime<Utc>, u64)>,
    /// insertion tick -> key, oldest first
    order: BTreeMap<u64, DedupKey>,
    tick: u64,
}

impl State {
    fn remove(&mut self, key: &DedupKey) {
        if let Some((_, tick)) = self.entries.remove(key) {
            self.order.remove(&tick);
        }
    }

    fn insert(&mut self, key: DedupKey, at: DateTime<Utc>) {
        self.remove(&key);
        self.tick += 1;
        self.order.insert(self.tick, key.clone());
        self.entries.insert(key, (at, self.tick));
    }

    fn evict_oldest(&mut self) {
        if let Some((_, key)) = self.order.pop_first() {
            self.entries.remove(&key);
        }
    }
}

/// Bounded in-memory cooldown store.
///
/// Expired entries are dropped lazily when their key is looked up; when the
/// store is full the least recently emitted key is evicted.
#[derive(Debug)]
pub struct InMemoryCooldown {
    cooldown: Duration,
    capacity: usize,
    state: Mutex<State>,
}

impl InMemoryCooldown {
    pub fn new(cooldown: Duration, capacity: usize) -> Self {
        Self {
            cooldown,
            capacity: capacity.max(1),
            state: Mutex::new(State::default()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCooldown {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_COOLDOWN_HOURS), DEFAULT_CAPACITY)
    }
}

impl CooldownStore for InMemoryCooldown {
    fn try_acquire(&self, key: &DedupKey, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        if let Some(&(last, _)) = state.entries.get(key) {
            if now - last < self.cooldown {
                return false;
            }
            // expired
            state.remove(key);
        }
        while state.entries.len() >= self.capacity {
            state.evict_oldest();
        }
        state.insert(key.clone(), now);
        true
    }

    fn last_emission(&self, key: &DedupKey) -> Option<DateTime<Utc>> {
        self.state.lock().entries.get(key).map(|&(last, _)| last)
    }
}
