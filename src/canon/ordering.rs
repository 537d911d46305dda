//! Canonical member order.
//!
//! Names are ordered case-insensitively (ASCII folding, byte-wise), with a
//! case-sensitive byte comparison breaking ties. Byte-identical names are
//! the only ones that compare equal.

use std::cmp::Ordering;

/// Path separator used inside ZIP archives.
pub const SEPARATOR: u8 = b'/';

/// Which part of a member name takes part in the comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortMode {
    /// Compare complete paths
    #[default]
    FullPath,
    /// Compare the part after the last `/`, falling back to the full path
    Basename,
}

/// Case-insensitive comparison with a case-sensitive tie-break.
pub fn canonical_cmp(a: &[u8], b: &[u8]) -> Ordering {
    let folded = a
        .iter()
        .map(u8::to_ascii_lowercase)
        .cmp(b.iter().map(u8::to_ascii_lowercase));
    folded.then_with(|| a.cmp(b))
}

/// Everything after the last separator, or the whole name.
///
/// A directory entry (`"dir/"`) has an empty basename.
pub fn basename(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == SEPARATOR) {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

pub fn compare(a: &[u8], b: &[u8], mode: SortMode) -> Ordering {
    match mode {
        SortMode::FullPath => canonical_cmp(a, b),
        SortMode::Basename => {
            canonical_cmp(basename(a), basename(b)).then_with(|| canonical_cmp(a, b))
        }
    }
}

/// True when every name sorts strictly after its predecessor.
///
/// Duplicates count as out of order.
pub fn is_canonical<T: AsRef<[u8]>>(names: &[T], mode: SortMode) -> bool {
    names
        .windows(2)
        .all(|pair| compare(pair[0].as_ref(), pair[1].as_ref(), mode) == Ordering::Less)
}

pub fn sort<T: AsRef<[u8]>>(names: &mut [T], mode: SortMode) {
    names.sort_unstable_by(|a, b| compare(a.as_ref(), b.as_ref(), mode));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sorted(names: &[&str], mode: SortMode) -> Vec<String> {
        let mut names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        sort(&mut names, mode);
        names
    }

    #[test]
    fn case_insensitive_with_case_sensitive_tie_break() {
        assert_eq!(
            sorted(&["b", "a", "B", "A", "ab"], SortMode::FullPath),
            ["A", "a", "ab", "B", "b"]
        );
    }

    #[test]
    fn shorter_prefix_sorts_first() {
        assert_eq!(canonical_cmp(b"dir/", b"dir/file"), Ordering::Less);
        assert_eq!(canonical_cmp(b"DIR/", b"dir/"), Ordering::Less);
        assert_eq!(canonical_cmp(b"same", b"same"), Ordering::Equal);
    }

    #[test]
    fn separator_sorts_before_letters() {
        // '/' (0x2F) < 'a' after folding, so "a/x" precedes "aa"
        assert_eq!(
            sorted(&["aa", "a/x", "A/"], SortMode::FullPath),
            ["A/", "a/x", "aa"]
        );
    }

    #[test]
    fn non_letters_are_not_folded() {
        // '_' (0x5F) sits between the upper and lower case ranges
        assert_eq!(canonical_cmp(b"_", b"a"), Ordering::Less);
        assert_eq!(canonical_cmp(b"_", b"A"), Ordering::Less);
    }

    #[test]
    fn basename_extraction() {
        assert_eq!(basename(b"a/b/c.txt"), b"c.txt");
        assert_eq!(basename(b"plain"), b"plain");
        assert_eq!(basename(b"dir/"), b"");
    }

    #[test]
    fn basename_mode_orders_by_file_name_then_path() {
        assert_eq!(
            sorted(&["z/b.txt", "a.txt", "y/a.txt", "x/a.txt"], SortMode::Basename),
            ["a.txt", "x/a.txt", "y/a.txt", "z/b.txt"]
        );
    }

    #[test]
    fn canonical_check_rejects_duplicates_and_disorder() {
        assert!(is_canonical(&["a", "B", "c"], SortMode::FullPath));
        assert!(!is_canonical(&["a", "a"], SortMode::FullPath));
        assert!(!is_canonical(&["b", "a"], SortMode::FullPath));
        assert!(is_canonical::<&str>(&[], SortMode::FullPath));
        assert!(!is_canonical(&["a/b", "b/a"], SortMode::Basename));
    }

    fn name() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(
            prop_oneof![
                Just(b'a'),
                Just(b'A'),
                Just(b'b'),
                Just(b'B'),
                Just(b'/'),
                Just(b'_'),
                any::<u8>(),
            ],
            0..8,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn sorting_is_idempotent(mut names in prop::collection::vec(name(), 0..24)) {
            sort(&mut names, SortMode::FullPath);
            let once = names.clone();
            sort(&mut names, SortMode::FullPath);
            prop_assert_eq!(once, names);
        }

        #[test]
        fn equal_only_when_identical(a in name(), b in name()) {
            for mode in [SortMode::FullPath, SortMode::Basename] {
                let forward = compare(&a, &b, mode);
                prop_assert_eq!(forward, compare(&b, &a, mode).reverse());
                prop_assert_eq!(forward == Ordering::Equal, a == b);
            }
        }

        #[test]
        fn ordering_is_transitive(a in name(), b in name(), c in name()) {
            for mode in [SortMode::FullPath, SortMode::Basename] {
                let mut v = [a.clone(), b.clone(), c.clone()];
                sort(&mut v, mode);
                prop_assert!(compare(&v[0], &v[1], mode) != Ordering::Greater);
                prop_assert!(compare(&v[1], &v[2], mode) != Ordering::Greater);
                prop_assert!(compare(&v[0], &v[2], mode) != Ordering::Greater);
            }
        }

        #[test]
        fn any_input_order_gives_one_result(mut names in prop::collection::vec(name(), 0..16)) {
            let mut reversed: Vec<Vec<u8>> = names.iter().rev().cloned().collect();
            sort(&mut names, SortMode::Basename);
            sort(&mut reversed, SortMode::Basename);
            prop_assert_eq!(names, reversed);
        }
    }
}
