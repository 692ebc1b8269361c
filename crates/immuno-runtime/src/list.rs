//! Insertion-ordered container with stable keys.
//!
//! Keys grow monotonically and are never reused, so an entry can be addressed by key after
//! earlier entries were removed. Entries stay sorted by key, which keeps lookups logarithmic.

use std::collections::TryReserveError;

#[derive(Debug)]
pub struct OrderedList<T> {
    entries: Vec<(u32, T)>,
    next_key: u32,
}

impl<T> Default for OrderedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedList<T> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_key: 0,
        }
    }

    /// Appends at the tail and returns the new entry's key.
    pub fn append(&mut self, value: T) -> Result<u32, TryReserveError> {
        self.entries.try_reserve(1)?;
        let key = self.next_key;
        self.next_key += 1;
        self.entries.push((key, value));
        Ok(key)
    }

    pub fn remove(&mut self, key: u32) -> Option<T> {
        let pos = self.position(key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn get(&self, key: u32) -> Option<&T> {
        self.position(key).map(|pos| &self.entries[pos].1)
    }

    pub fn get_mut(&mut self, key: u32) -> Option<&mut T> {
        self.position(key).map(|pos| &mut self.entries[pos].1)
    }

    pub fn contains(&self, key: u32) -> bool {
        self.position(key).is_some()
    }

    /// Entry at `pos` in iteration order.
    pub fn nth(&self, pos: usize) -> Option<(u32, &T)> {
        self.entries.get(pos).map(|(key, value)| (*key, value))
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = u32> + '_ {
        self.entries.iter().map(|(key, _)| *key)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (u32, &T)> + '_ {
        self.entries.iter().map(|(key, value)| (*key, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keeps the first `len` entries.
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    /// Removes every entry. Keys already issued stay retired.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Removes and returns every entry in insertion order.
    pub fn drain(&mut self) -> impl Iterator<Item = (u32, T)> + '_ {
        self.entries.drain(..)
    }

    fn position(&self, key: u32) -> Option<usize> {
        self.entries
            .binary_search_by_key(&key, |(entry_key, _)| *entry_key)
            .ok()
    }
}

/// Forward-only, restartable position over an [`OrderedList`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    position: usize,
}

impl Cursor {
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Key at the cursor, advancing past it. `None` once the list is exhausted.
    pub fn read<T>(&mut self, list: &OrderedList<T>) -> Option<u32> {
        let (key, _) = list.nth(self.position)?;
        self.position += 1;
        Some(key)
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

#[cfg(test)]
#[path = "tests/list_tests.rs"]
mod tests;
