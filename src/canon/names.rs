//! Member name storage.
//!
//! `NameList` holds one bounded-length name per archive member together
//! with the index of the central directory record it came from, so the
//! list can be re-sorted freely and still lead back to the member's data.

use std::collections::TryReserveError;
use std::fmt;
use std::ops::Index;

use thiserror::Error;

use super::ordering::{self, SortMode};

/// Names must be strictly shorter than this.
pub const MAX_PATH: usize = 1024;

/// Smallest capacity the list grows to, and the slack used to decide
/// between exact and geometric growth.
pub const BASE_INCREMENT: usize = 256;

/// Largest element count the list will ever ask for.
const MAX_ELEMENTS: usize = i32::MAX as usize;

#[derive(Debug, Error)]
pub enum NameListError {
    #[error("member {index} has an empty name")]
    Empty { index: usize },
    #[error("name of member {index} is {len} bytes long (limit {limit})", limit = MAX_PATH - 1)]
    TooLong { index: usize, len: usize },
    #[error("out of memory growing the name list: {0}")]
    Alloc(#[from] TryReserveError),
}

/// One member name and the central directory record it belongs to.
#[derive(Clone, PartialEq, Eq)]
pub struct NameBuf {
    bytes: Vec<u8>,
    entry: usize,
}

impl NameBuf {
    pub fn entry(&self) -> usize {
        self.entry
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for NameBuf {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for NameBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

impl fmt::Debug for NameBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{}", String::from_utf8_lossy(&self.bytes), self.entry)
    }
}

/// Growable list of member names with an explicit growth policy.
#[derive(Debug, Default)]
pub struct NameList {
    names: Vec<NameBuf>,
    capacity: usize,
}

/// Capacity to grow to when `min` elements are needed and `current` fit.
///
/// Requests that jump well past the current size are honoured exactly;
/// small steps double the capacity so repeated growth stays amortized.
pub fn grown_capacity(current: usize, min: usize) -> usize {
    if current >= min {
        return current;
    }
    let target = if min - current >= (current + BASE_INCREMENT) / 4 {
        min
    } else if current < 2 {
        BASE_INCREMENT
    } else if current < MAX_ELEMENTS / 2 {
        current * 2
    } else {
        MAX_ELEMENTS
    };
    target.max(min)
}

impl NameList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Capacity granted by the growth policy so far.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Make room for at least `min` names.
    pub fn ensure_capacity(&mut self, min: usize) -> Result<(), NameListError> {
        let target = grown_capacity(self.capacity, min);
        if target > self.capacity {
            self.names.try_reserve_exact(target - self.names.len())?;
            self.capacity = target;
        }
        Ok(())
    }

    /// Drop every name and give the storage back.
    pub fn release(&mut self) {
        self.names = Vec::new();
        self.capacity = 0;
    }

    /// Append the name of central directory record `entry`.
    pub fn push(&mut self, name: &[u8], entry: usize) -> Result<(), NameListError> {
        if name.is_empty() {
            return Err(NameListError::Empty { index: entry });
        }
        if name.len() >= MAX_PATH {
            return Err(NameListError::TooLong {
                index: entry,
                len: name.len(),
            });
        }
        self.ensure_capacity(self.names.len() + 1)?;

        let mut bytes = Vec::new();
        bytes.try_reserve_exact(name.len())?;
        bytes.extend_from_slice(name);
        self.names.push(NameBuf { bytes, entry });
        Ok(())
    }

    pub fn sort(&mut self, mode: SortMode) {
        ordering::sort(&mut self.names, mode);
    }

    pub fn is_sorted(&self, mode: SortMode) -> bool {
        ordering::is_canonical(&self.names, mode)
    }

    pub fn as_slice(&self) -> &[NameBuf] {
        &self.names
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NameBuf> {
        self.names.iter()
    }
}

impl Index<usize> for NameList {
    type Output = NameBuf;

    fn index(&self, index: usize) -> &NameBuf {
        &self.names[index]
    }
}

impl<'a> IntoIterator for &'a NameList {
    type Item = &'a NameBuf;
    type IntoIter = std::slice::Iter<'a, NameBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.names.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_small_request_grows_to_base() {
        assert_eq!(grown_capacity(0, 1), BASE_INCREMENT);
        assert_eq!(grown_capacity(1, 2), BASE_INCREMENT);
    }

    #[test]
    fn large_requests_are_exact() {
        assert_eq!(grown_capacity(0, 5000), 5000);
        assert_eq!(grown_capacity(256, 1000), 1000);
    }

    #[test]
    fn small_steps_double() {
        assert_eq!(grown_capacity(256, 257), 512);
        assert_eq!(grown_capacity(1000, 1100), 2000);
    }

    #[test]
    fn enough_capacity_is_left_alone() {
        assert_eq!(grown_capacity(512, 300), 512);
        assert_eq!(grown_capacity(512, 512), 512);
    }

    #[test]
    fn growth_is_capped() {
        assert_eq!(grown_capacity(MAX_ELEMENTS - 1, MAX_ELEMENTS), MAX_ELEMENTS);
    }

    #[test]
    fn push_grows_and_keeps_entry_index() {
        let mut list = NameList::new();
        for i in 0..300 {
            list.push(format!("file{i:03}").as_bytes(), i).unwrap();
        }
        assert_eq!(list.len(), 300);
        assert_eq!(list.capacity(), 512);
        assert_eq!(list[299].as_bytes(), b"file299");
        assert_eq!(list[299].entry(), 299);
    }

    #[test]
    fn rejects_empty_and_overlong_names() {
        let mut list = NameList::new();
        assert!(matches!(list.push(b"", 0), Err(NameListError::Empty { index: 0 })));
        let long = vec![b'x'; MAX_PATH];
        assert!(matches!(
            list.push(&long, 3),
            Err(NameListError::TooLong { index: 3, len: MAX_PATH })
        ));
        list.push(&long[..MAX_PATH - 1], 4).unwrap();
    }

    #[test]
    fn sorting_carries_entry_indices() {
        let mut list = NameList::new();
        list.push(b"b", 0).unwrap();
        list.push(b"A", 1).unwrap();
        list.push(b"a", 2).unwrap();
        assert!(!list.is_sorted(SortMode::FullPath));
        list.sort(SortMode::FullPath);
        let order: Vec<usize> = list.iter().map(NameBuf::entry).collect();
        assert_eq!(order, [1, 2, 0]);
        assert!(list.is_sorted(SortMode::FullPath));
    }

    #[test]
    fn release_frees_everything() {
        let mut list = NameList::new();
        list.ensure_capacity(10).unwrap();
        list.push(b"x", 0).unwrap();
        list.release();
        assert!(list.is_empty());
        assert_eq!(list.capacity(), 0);
    }
}
