//! # Path Splitting
//!
//! Tree paths are `/`-separated name sequences descending through OBJECT
//! children. `/` is the only reserved character; components are otherwise
//! opaque UTF-8. Leading, trailing and doubled separators are tolerated:
//! empty components are ignored.

use smallvec::SmallVec;

/// Splits a path into its non-empty components without allocating for
/// typical depths.
pub(crate) fn components(path: &str) -> SmallVec<[&str; 8]> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// Joins a parent path and a child name for error text.
pub(crate) fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}/{child}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_components_are_ignored() {
        assert_eq!(components("a/b/c").as_slice(), ["a", "b", "c"]);
        assert_eq!(components("/a/b/").as_slice(), ["a", "b"]);
        assert_eq!(components("a//b").as_slice(), ["a", "b"]);
        assert!(components("").is_empty());
        assert!(components("/").is_empty());
    }

    #[test]
    fn join_skips_empty_parent() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a/b", "c"), "a/b/c");
    }
}
