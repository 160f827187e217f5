//! Subject naming and validation
//!
//! A subject is an opaque routing key for publish/subscribe delivery, e.g.
//! `order.process`. The core imposes no structure beyond what a broker wire
//! format can carry: subjects must be non-empty and free of whitespace and
//! control characters. Any hierarchy or wildcard semantics belong to the
//! transport, not to this type.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubjectError {
    #[error("subject cannot be empty")]
    Empty,

    #[error("invalid character {0:?} in subject")]
    InvalidChar(char),
}

/// A validated routing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject(String);

impl Subject {
    /// Parse and validate a subject name.
    pub fn parse(name: &str) -> Result<Self, SubjectError> {
        if name.is_empty() {
            return Err(SubjectError::Empty);
        }

        for c in name.chars() {
            if c.is_whitespace() || c.is_control() {
                return Err(SubjectError::InvalidChar(c));
            }
        }

        Ok(Self(name.to_string()))
    }

    /// Construct a subject from a string already known to be valid.
    ///
    /// Used for generated inbox names whose components are validated up
    /// front; bypasses per-character checks.
    pub(crate) fn new_unchecked(name: String) -> Self {
        debug_assert!(Subject::parse(&name).is_ok());
        Self(name)
    }

    /// The subject as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Subject {
    type Err = SubjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Subject::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_subjects() {
        assert!(Subject::parse("order.process").is_ok());
        assert!(Subject::parse("a").is_ok());
        assert!(Subject::parse("_INBOX.c0ffee").is_ok());
        assert!(Subject::parse("user-42.validate").is_ok());
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Subject::parse(""), Err(SubjectError::Empty));
    }

    #[test]
    fn test_parse_rejects_whitespace() {
        assert_eq!(
            Subject::parse("order process"),
            Err(SubjectError::InvalidChar(' '))
        );
        assert_eq!(
            Subject::parse("order\tprocess"),
            Err(SubjectError::InvalidChar('\t'))
        );
        assert_eq!(
            Subject::parse("order\nprocess"),
            Err(SubjectError::InvalidChar('\n'))
        );
    }

    #[test]
    fn test_parse_rejects_control_chars() {
        assert_eq!(
            Subject::parse("order\u{0}process"),
            Err(SubjectError::InvalidChar('\u{0}'))
        );
    }

    #[test]
    fn test_display_round_trips() {
        let subject = Subject::parse("payment.authorize").unwrap();
        assert_eq!(subject.to_string(), "payment.authorize");
        assert_eq!(subject.as_str(), "payment.authorize");
        assert_eq!(subject.as_ref(), "payment.authorize");
    }

    #[test]
    fn test_from_str() {
        let subject: Subject = "inventory.check".parse().unwrap();
        assert_eq!(subject.as_str(), "inventory.check");

        let err: Result<Subject, _> = "".parse();
        assert!(err.is_err());
    }

    #[test]
    fn test_equality_and_hash() {
        use std::collections::HashSet;

        let a = Subject::parse("foo.bar").unwrap();
        let b = Subject::parse("foo.bar").unwrap();
        let c = Subject::parse("foo.baz").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(SubjectError::Empty.to_string(), "subject cannot be empty");
        assert_eq!(
            SubjectError::InvalidChar(' ').to_string(),
            "invalid character ' ' in subject"
        );
    }
}
