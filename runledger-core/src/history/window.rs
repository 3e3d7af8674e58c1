// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use runledger_metadata::{HistoryEntry, RunKey};
use std::{
    collections::{BTreeMap, BTreeSet, btree_map},
    num::NonZero,
};

/// The retained runs of a history store, as a window.
pub type HistoryWindow = RetentionWindow<HistoryEntry>;

/// A key-ordered collection holding at most `capacity` values.
///
/// Inserting beyond capacity evicts the values with the smallest keys, so the
/// window always holds the newest runs. Iteration is oldest first.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetentionWindow<T> {
    capacity: NonZero<usize>,
    entries: BTreeMap<RunKey, T>,
}

/// The result of [`RetentionWindow::insert`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WindowInsert<T> {
    /// The value previously stored under the same key, if any.
    pub replaced: Option<T>,

    /// Values evicted to bring the window back within capacity, oldest first.
    ///
    /// This may include the value that was just inserted, if its key is older
    /// than every retained key.
    pub evicted: Vec<(RunKey, T)>,
}

impl<T> WindowInsert<T> {
    /// Returns true if `key` was evicted by this insert.
    pub fn was_evicted(&self, key: RunKey) -> bool {
        self.evicted.iter().any(|(evicted, _)| *evicted == key)
    }
}

impl<T> RetentionWindow<T> {
    /// Creates an empty window.
    pub fn new(capacity: NonZero<usize>) -> Self {
        Self {
            capacity,
            entries: BTreeMap::new(),
        }
    }

    /// Returns the maximum number of values retained.
    pub fn capacity(&self) -> NonZero<usize> {
        self.capacity
    }

    /// Returns the number of values retained.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: RunKey) -> Option<&T> {
        self.entries.get(&key)
    }

    /// Returns true if a value is stored under `key`.
    pub fn contains_key(&self, key: RunKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Iterates over retained keys, oldest first.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = RunKey> + ExactSizeIterator + '_ {
        self.entries.keys().copied()
    }

    /// Iterates over retained values, oldest first.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.values()
    }

    /// Iterates over retained keys and values, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (RunKey, &T)> + ExactSizeIterator {
        self.entries.iter().map(|(key, value)| (*key, value))
    }

    /// Returns the newest retained value.
    pub fn newest(&self) -> Option<(RunKey, &T)> {
        self.entries.last_key_value().map(|(key, value)| (*key, value))
    }

    /// Inserts `value` under `key`, replacing any value with the same key,
    /// then evicts the oldest values until the window is within capacity.
    pub fn insert(&mut self, key: RunKey, value: T) -> WindowInsert<T> {
        let replaced = self.entries.insert(key, value);
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity.get()
            && let Some(oldest) = self.entries.pop_first()
        {
            evicted.push(oldest);
        }
        WindowInsert { replaced, evicted }
    }
}

impl<T> IntoIterator for RetentionWindow<T> {
    type Item = (RunKey, T);
    type IntoIter = btree_map::IntoIter<RunKey, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a RetentionWindow<T> {
    type Item = (&'a RunKey, &'a T);
    type IntoIter = btree_map::Iter<'a, RunKey, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Computes which keys to evict so that at most `capacity` remain.
///
/// Duplicate keys are collapsed. Returns the oldest keys in ascending order,
/// or an empty list if the distinct keys already fit.
pub fn keys_to_evict<I>(keys: I, capacity: NonZero<usize>) -> Vec<RunKey>
where
    I: IntoIterator<Item = RunKey>,
{
    let distinct: BTreeSet<RunKey> = keys.into_iter().collect();
    let excess = distinct.len().saturating_sub(capacity.get());
    distinct.into_iter().take(excess).collect()
}
