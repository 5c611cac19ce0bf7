//! Immutable, insertion-ordered map.
//!
//! `FrozenOrderedMap` is the named view of multi-state data. It is filled
//! once from an iterator and offers no way to insert, remove or reorder
//! entries afterwards.

use crate::error::{MultiStateError, Result};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Read-only map that remembers insertion order.
///
/// The structural hash over all entries is computed on first use and cached.
#[derive(Clone)]
pub struct FrozenOrderedMap<K, V> {
    entries: Vec<(K, V)>,
    index: HashMap<K, usize>,
    hash: OnceLock<u64>,
}

impl<K, V> FrozenOrderedMap<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value by key.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Insertion position of `key`.
    pub fn position(&self, key: &K) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Entry at insertion position `i`.
    pub fn get_index(&self, i: usize) -> Option<(&K, &V)> {
        self.entries.get(i).map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl ExactSizeIterator<Item = &K> + '_ {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> + '_ {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Iterate `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&K, &V)> + '_ {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl<K, V> FrozenOrderedMap<K, V>
where
    K: Clone + Eq + Hash + fmt::Debug,
{
    /// Look up a value by key, failing with [`MultiStateError::KeyNotFound`].
    pub fn try_get(&self, key: &K) -> Result<&V> {
        self.get(key)
            .ok_or_else(|| MultiStateError::KeyNotFound(format!("{:?}", key)))
    }
}

impl<K, V> FrozenOrderedMap<K, V>
where
    K: Clone + Eq + Hash,
    V: Hash,
{
    /// Hash over every `(key, value)` pair in insertion order.
    ///
    /// Computed once; later calls return the cached value.
    pub fn structural_hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            self.entries.len().hash(&mut hasher);
            for (k, v) in &self.entries {
                k.hash(&mut hasher);
                v.hash(&mut hasher);
            }
            hasher.finish()
        })
    }
}

/// Later duplicates replace the earlier value but keep the first position.
impl<K, V> FromIterator<(K, V)> for FrozenOrderedMap<K, V>
where
    K: Clone + Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut entries: Vec<(K, V)> = Vec::new();
        let mut index: HashMap<K, usize> = HashMap::new();
        for (key, value) in iter {
            match index.get(&key) {
                Some(&i) => entries[i].1 = value,
                None => {
                    index.insert(key.clone(), entries.len());
                    entries.push((key, value));
                }
            }
        }
        Self {
            entries,
            index,
            hash: OnceLock::new(),
        }
    }
}

impl<'a, K, V> IntoIterator for &'a FrozenOrderedMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter =
        std::iter::Map<std::slice::Iter<'a, (K, V)>, fn(&'a (K, V)) -> (&'a K, &'a V)>;

    fn into_iter(self) -> Self::IntoIter {
        fn split<K, V>(entry: &(K, V)) -> (&K, &V) {
            (&entry.0, &entry.1)
        }
        self.entries
            .iter()
            .map(split as fn(&'a (K, V)) -> (&'a K, &'a V))
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for FrozenOrderedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: Eq, V: Eq> Eq for FrozenOrderedMap<K, V> {}

impl<K, V> Hash for FrozenOrderedMap<K, V>
where
    K: Clone + Eq + Hash,
    V: Hash,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for FrozenOrderedMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}
