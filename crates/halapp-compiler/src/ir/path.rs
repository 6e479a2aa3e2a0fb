//! Hierarchical aggregate addresses.
//!
//! An aggregate is identified by a slash-separated path such as
//! `/Order/Lines`. The first segment names the root aggregate; every further
//! segment is the relation name under which a nested aggregate hangs off its
//! parent.

use std::fmt;

use serde::{Serialize, Serializer};

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// Unique address of an aggregate within a schema.
///
/// Equality and hashing go through the normalized segment list, which is
/// equivalent to comparing the full path strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregatePath {
    segments: Vec<String>,
}

impl AggregatePath {
    /// Builds a path from its segments, root first.
    pub fn try_create<I, S>(names: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = names.into_iter().map(Into::into).collect();

        if segments.is_empty() {
            return Err("Aggregate path must have at least one segment.".to_string());
        }
        if let Some(bad) = segments.iter().find(|s| s.contains(SEPARATOR)) {
            return Err(format!(
                "Aggregate path segment '{bad}' must not contain '{SEPARATOR}'."
            ));
        }
        if let Some(empty) = segments.iter().position(|s| s.trim().is_empty()) {
            return Err(format!(
                "Aggregate path segment #{} of '{}' is empty.",
                empty + 1,
                join(&segments)
            ));
        }
        Ok(Self { segments })
    }

    /// Parses a full path such as `/Order/Lines`.
    pub fn try_parse(full_path: &str) -> Result<Self, String> {
        let Some(rest) = full_path.strip_prefix(SEPARATOR) else {
            return Err(format!(
                "Aggregate path '{full_path}' must start with '{SEPARATOR}'."
            ));
        };
        if rest.trim().is_empty() || rest.ends_with(SEPARATOR) {
            return Err(format!("Aggregate path '{full_path}' has an empty last segment."));
        }
        Self::try_create(rest.split(SEPARATOR)).map_err(|e| format!("'{full_path}': {e}"))
    }

    /// Panicking form of [`Self::try_create`] for literal paths.
    pub fn create<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match Self::try_create(names) {
            Ok(path) => path,
            Err(e) => panic!("invalid aggregate path: {e}"),
        }
    }

    /// Panicking form of [`Self::try_parse`] for literal paths.
    pub fn parse(full_path: &str) -> Self {
        match Self::try_parse(full_path) {
            Ok(path) => path,
            Err(e) => panic!("invalid aggregate path: {e}"),
        }
    }

    /// The parent path, or `None` for a root aggregate.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Appends one segment.
    pub fn child(&self, name: &str) -> Result<Self, String> {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self::try_create(segments)
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// Number of ancestors; zero for a root aggregate.
    pub fn depth(&self) -> usize {
        self.segments.len() - 1
    }

    /// The last segment.
    pub fn base_name(&self) -> &str {
        // segments is never empty by construction
        &self.segments[self.segments.len() - 1]
    }

    pub fn root_name(&self) -> &str {
        &self.segments[0]
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True if `self` lies strictly below `other`.
    pub fn is_descendant_of(&self, other: &AggregatePath) -> bool {
        self.segments.len() > other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }
}

fn join(segments: &[String]) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push(SEPARATOR);
        out.push_str(segment);
    }
    out
}

impl fmt::Display for AggregatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join(&self.segments))
    }
}

impl Serialize for AggregatePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_and_display() {
        let path = AggregatePath::try_parse("/Order/Lines").unwrap();
        assert_eq!(path.to_string(), "/Order/Lines");
        assert_eq!(path.base_name(), "Lines");
        assert_eq!(path.root_name(), "Order");
        assert_eq!(path.depth(), 1);
    }

    #[test]
    fn test_parse_rejects_missing_leading_separator() {
        let err = AggregatePath::try_parse("Order/Lines").unwrap_err();
        assert!(err.contains("must start with"));
    }

    #[test]
    fn test_parse_rejects_empty_last_segment() {
        assert!(AggregatePath::try_parse("/Order/").is_err());
        assert!(AggregatePath::try_parse("/Order/  ").is_err());
        assert!(AggregatePath::try_parse("/").is_err());
    }

    #[test]
    fn test_create_rejects_separator_in_segment() {
        assert!(AggregatePath::try_create(["Order", "Li/nes"]).is_err());
        assert!(AggregatePath::try_create(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_parent_and_child() {
        let root = AggregatePath::create(["Order"]);
        assert!(root.is_root());
        assert_eq!(root.parent(), None);

        let lines = root.child("Lines").unwrap();
        assert_eq!(lines.parent(), Some(root.clone()));
        assert!(lines.is_descendant_of(&root));
        assert!(!root.is_descendant_of(&lines));
        assert!(!root.is_descendant_of(&root));
        assert!(root.child("a/b").is_err());
    }

    #[test]
    fn test_equality_by_full_path() {
        assert_eq!(
            AggregatePath::parse("/A/B"),
            AggregatePath::create(["A".to_string(), "B".to_string()])
        );
        assert_ne!(AggregatePath::parse("/A/B"), AggregatePath::parse("/A"));
    }

    proptest! {
        #[test]
        fn prop_create_parse_round_trip(segments in prop::collection::vec("[A-Za-z0-9_][A-Za-z0-9_ ]{0,8}", 1..5)) {
            let created = AggregatePath::try_create(segments.clone()).unwrap();
            let parsed = AggregatePath::try_parse(&created.to_string()).unwrap();
            prop_assert_eq!(parsed, created);
        }
    }
}
