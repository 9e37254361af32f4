use std::collections::HashMap;
use std::hash::Hash;

/// Counts keys while remembering the order each key was first seen.
///
/// Ranking is a stable sort on count, so equal counts keep scan order.
#[derive(Debug, Clone)]
pub struct FirstSeenCounter<K> {
    index: HashMap<K, usize>,
    entries: Vec<(K, i64)>,
}

impl<K: Eq + Hash + Clone> FirstSeenCounter<K> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, key: K) {
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 += 1,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, 1));
            }
        }
    }

    /// All keys with counts, in first-seen order.
    pub fn into_entries(self) -> Vec<(K, i64)> {
        self.entries
    }

    /// The `limit` highest counts, descending; ties keep first-seen order.
    pub fn into_top(self, limit: usize) -> Vec<(K, i64)> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(limit);
        entries
    }
}

impl<K: Eq + Hash + Clone> Default for FirstSeenCounter<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Groups values by key, keeping groups in first-seen key order.
#[derive(Debug, Clone)]
pub struct OrderedGroups<K, V> {
    index: HashMap<K, usize>,
    groups: Vec<(K, Vec<V>)>,
}

impl<K: Eq + Hash + Clone, V> OrderedGroups<K, V> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    pub fn push(&mut self, key: K, value: V) {
        match self.index.get(&key) {
            Some(&pos) => self.groups[pos].1.push(value),
            None => {
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push((key, vec![value]));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn into_groups(self) -> Vec<(K, Vec<V>)> {
        self.groups
    }
}

impl<K: Eq + Hash + Clone, V> Default for OrderedGroups<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
