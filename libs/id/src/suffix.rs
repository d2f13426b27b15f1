//! Random suffixes for collision-free cloud names.

use ulid::Ulid;

/// A random suffix appended to harness-chosen names.
///
/// One suffix is generated per packaging call and shared by every version
/// registered in that call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RandomSuffix(String);

impl RandomSuffix {
    /// Generates a fresh suffix from a new ULID, lowercased.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string().to_ascii_lowercase())
    }

    /// Returns the suffix text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends the suffix to `base` as `{base}-{suffix}`.
    #[must_use]
    pub fn apply(&self, base: &str) -> String {
        format!("{base}-{}", self.0)
    }
}

impl std::fmt::Display for RandomSuffix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_suffix_is_lowercase_ulid() {
        let suffix = RandomSuffix::generate();
        assert_eq!(suffix.as_str().len(), 26);
        assert!(suffix
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_apply_keeps_base_as_prefix() {
        let suffix = RandomSuffix::generate();
        let name = suffix.apply("HelloWorld");
        assert!(name.starts_with("HelloWorld-"));
        assert!(name.ends_with(suffix.as_str()));
    }

    proptest! {
        #[test]
        fn prop_two_suffixes_never_collide(base in "[A-Za-z][A-Za-z0-9_.]{0,40}") {
            let a = RandomSuffix::generate().apply(&base);
            let b = RandomSuffix::generate().apply(&base);
            prop_assert_ne!(a, b);
        }
    }
}
