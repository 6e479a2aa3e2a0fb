//! Accumulated validation messages.
//!
//! Every `try_*` step of schema resolution reports problems as an [`ErrorList`]
//! instead of stopping at the first failure. Callers that stack several steps
//! merge the lists so a single run reports the complete set of problems.

use std::fmt;

use serde::Serialize;

/// An ordered, de-duplicated collection of human-readable error messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorList {
    messages: Vec<String>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message. Duplicates are dropped, first occurrence wins the position.
    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.messages.contains(&message) {
            self.messages.push(message);
        }
    }

    /// Moves every message of `other` into this list.
    pub fn merge(&mut self, other: ErrorList) {
        for message in other.messages {
            self.push(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(String::as_str)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.contains(needle))
    }

    /// `Ok(value)` when nothing was recorded, the list itself otherwise.
    pub fn into_result<T>(self, value: T) -> Result<T, ErrorList> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        self.messages
    }
}

impl From<String> for ErrorList {
    fn from(message: String) -> Self {
        let mut list = Self::new();
        list.push(message);
        list
    }
}

impl Extend<String> for ErrorList {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        for message in iter {
            self.push(message);
        }
    }
}

impl IntoIterator for ErrorList {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, message) in self.messages.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "- {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}
