//! Iteration context table
//!
//! Every rendered entry of an iteration block stores its local context here
//! under a fresh identifier, which the renderer stamps onto the entry's
//! leading element. Identifiers increase monotonically and are never reused,
//! even after eviction or `clear()`.

use crate::value::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Identifier of a stored local context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContextId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ContextId)
    }
}

pub struct ContextTable {
    next: u64,
    entries: BTreeMap<ContextId, Value>,
}

impl Default for ContextTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTable {
    pub fn new() -> Self {
        Self {
            next: 1,
            entries: BTreeMap::new(),
        }
    }

    /// Store `local` under a never-before-issued identifier
    pub fn allocate(&mut self, local: Value) -> ContextId {
        let id = ContextId(self.next);
        self.next += 1;
        self.entries.insert(id, local);
        id
    }

    pub fn get(&self, id: ContextId) -> Option<Value> {
        self.entries.get(&id).cloned()
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Drop entries in `owned` that are not in `live`
    ///
    /// Each mount passes the identifiers its own renders allocated so that two
    /// instances sharing a table never evict each other's entries. Returns the
    /// number of evicted entries.
    pub fn evict_unused(&mut self, owned: &HashSet<ContextId>, live: &HashSet<ContextId>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|id, _| !owned.contains(id) || live.contains(id));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest identifier issued so far, if any
    pub fn last_issued(&self) -> Option<ContextId> {
        (self.next > 1).then(|| ContextId(self.next - 1))
    }

    /// Drop every entry; the identifier counter keeps counting
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_are_monotonic_and_never_reused() {
        let mut table = ContextTable::new();
        let a = table.allocate(Value::from(1));
        let b = table.allocate(Value::from(2));
        assert!(b > a);

        table.clear();
        let c = table.allocate(Value::from(3));
        assert!(c > b);
        assert_eq!(table.len(), 1);
        assert_eq!(table.last_issued(), Some(c));
    }

    #[test]
    fn test_evicts_only_owned_dead_entries() {
        let mut table = ContextTable::new();
        let mine_live = table.allocate(Value::from("a"));
        let mine_dead = table.allocate(Value::from("b"));
        let foreign = table.allocate(Value::from("c"));

        let owned: HashSet<_> = [mine_live, mine_dead].into_iter().collect();
        let live: HashSet<_> = [mine_live].into_iter().collect();

        assert_eq!(table.evict_unused(&owned, &live), 1);
        assert!(table.contains(mine_live));
        assert!(!table.contains(mine_dead));
        assert!(table.contains(foreign));
    }

    #[test]
    fn test_parse_round_trip() {
        let id: ContextId = " 42 ".parse().unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
        assert!("x".parse::<ContextId>().is_err());
    }
}
