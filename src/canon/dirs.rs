//! Redundant directory entry detection.
//!
//! A directory entry (`"dir/"`) is redundant when another member lives
//! below it, because extracting that member recreates the directory. An
//! entry for an otherwise empty directory is kept.

use super::ordering::SEPARATOR;

pub fn is_directory(name: &[u8]) -> bool {
    name.last() == Some(&SEPARATOR)
}

fn starts_with_ignore_ascii_case(name: &[u8], prefix: &[u8]) -> bool {
    name.len() >= prefix.len() && name[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Whether the directory entry at `index` of a canonically sorted list can
/// be dropped.
///
/// Members below the directory follow it in canonical order, but names that
/// differ from it only in case may sit in between (`A/`, `a/`, `A/x`, `a/y`).
/// The scan therefore skips names sharing the prefix case-insensitively and
/// only gives up once that no longer holds. A match must be exact.
pub fn is_redundant<T: AsRef<[u8]>>(index: usize, sorted: &[T]) -> bool {
    let Some(entry) = sorted.get(index).map(AsRef::as_ref) else {
        return false;
    };
    if !is_directory(entry) {
        return false;
    }

    for next in sorted[index + 1..].iter().map(AsRef::as_ref) {
        if next.starts_with(entry) {
            return true;
        }
        if !starts_with_ignore_ascii_case(next, entry) {
            return false;
        }
    }
    false
}

pub fn has_any_redundant<T: AsRef<[u8]>>(sorted: &[T]) -> bool {
    (0..sorted.len()).any(|index| is_redundant(index, sorted))
}

pub fn has_any_subdirectory<T: AsRef<[u8]>>(names: &[T]) -> bool {
    names.iter().any(|name| name.as_ref().contains(&SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::ordering::{SortMode, sort};

    fn canonical(names: &[&str]) -> Vec<String> {
        let mut names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        sort(&mut names, SortMode::FullPath);
        names
    }

    fn redundant(names: &[&str]) -> Vec<String> {
        let sorted = canonical(names);
        (0..sorted.len())
            .filter(|&i| is_redundant(i, &sorted))
            .map(|i| sorted[i].clone())
            .collect()
    }

    #[test]
    fn directory_with_children_is_redundant() {
        assert_eq!(redundant(&["a/", "a/x", "A/y"]), ["a/"]);
    }

    #[test]
    fn empty_directory_is_kept() {
        assert!(redundant(&["dir/"]).is_empty());
        assert!(redundant(&["dir/", "dirt", "other/file"]).is_empty());
    }

    #[test]
    fn files_are_never_redundant() {
        assert!(redundant(&["file", "file/inside"]).is_empty());
    }

    #[test]
    fn nested_directories() {
        assert_eq!(redundant(&["a/", "a/b/", "a/b/c"]), ["a/", "a/b/"]);
        assert_eq!(redundant(&["a/", "a/b/"]), ["a/"]);
    }

    #[test]
    fn scan_skips_case_variants_between_directory_and_children() {
        // Sorted: A/, a/, A/x, a/y
        assert_eq!(canonical(&["a/y", "A/x", "a/", "A/"]), ["A/", "a/", "A/x", "a/y"]);
        assert_eq!(redundant(&["a/y", "A/x", "a/", "A/"]), ["A/", "a/"]);
    }

    #[test]
    fn children_of_a_case_variant_do_not_count() {
        assert!(redundant(&["A/", "a/x"]).is_empty());
    }

    #[test]
    fn three_way_case_collision() {
        // Sorted: A/, a/, Aa/ -- nothing lives below any of them
        assert!(redundant(&["Aa/", "a/", "A/"]).is_empty());
        // Sorted: A/, a/, a/x, Aa/ -- only a/ has a child
        assert_eq!(redundant(&["Aa/", "a/x", "a/", "A/"]), ["a/"]);
        // Sorted: A/, a/, Aa/, Aa/x
        assert_eq!(redundant(&["Aa/x", "Aa/", "a/", "A/"]), ["Aa/"]);
    }

    #[test]
    fn subdirectory_detection() {
        assert!(has_any_subdirectory(&["a", "b/c"]));
        assert!(has_any_subdirectory(&["dir/"]));
        assert!(!has_any_subdirectory(&["a", "b"]));
        assert!(has_any_redundant(&canonical(&["x/", "x/y"])));
        assert!(!has_any_redundant(&canonical(&["x/", "y"])));
    }
}
