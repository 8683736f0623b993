use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a document, derived from its resource locator.
///
/// The key is the locator string itself (`file:///home/me/notes.md`), so it
/// can be used verbatim as the entry name in the shared text map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The locator scheme (`file`, `untitled`, ...), if the key has one.
    pub fn scheme(&self) -> Option<&str> {
        let (scheme, _) = self.0.split_once(':')?;
        let mut chars = scheme.chars();
        let first = chars.next()?;
        if !first.is_ascii_alphabetic() {
            return None;
        }
        chars
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
            .then_some(scheme)
    }

    /// Whether the key's scheme matches `scheme`, ignoring ASCII case.
    pub fn has_scheme(&self, scheme: &str) -> bool {
        self.scheme()
            .is_some_and(|s| s.eq_ignore_ascii_case(scheme))
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocumentKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for DocumentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_scheme() {
        let key = DocumentKey::from("file://home/situ2001/114514/1919810");
        assert_eq!(key.scheme(), Some("file"));
        assert!(key.has_scheme("file"));
        assert!(key.has_scheme("FILE"));
    }

    #[test]
    fn test_other_schemes() {
        assert_eq!(DocumentKey::from("untitled:Untitled-1").scheme(), Some("untitled"));
        assert!(!DocumentKey::from("git+ssh://host/repo").has_scheme("file"));
        assert_eq!(DocumentKey::from("git+ssh://host/repo").scheme(), Some("git+ssh"));
    }

    #[test]
    fn test_no_scheme() {
        assert_eq!(DocumentKey::from("/tmp/plain/path").scheme(), None);
        assert_eq!(DocumentKey::from("1abc:rest").scheme(), None);
        assert_eq!(DocumentKey::from("").scheme(), None);
    }

    #[test]
    fn test_display_roundtrip() {
        let key = DocumentKey::new("file:///a/b.rs");
        assert_eq!(key.to_string(), "file:///a/b.rs");
        assert_eq!(key.as_str(), "file:///a/b.rs");
    }
}
