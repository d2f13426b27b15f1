//! Macros for defining typed name types.

/// Macro to define a typed, string-backed resource name.
///
/// This generates a newtype wrapper around `String` with:
/// - A `KIND` constant used in error messages
/// - `new()` which rejects empty and whitespace-bearing input
/// - `as_str()` and `into_inner()` accessors
/// - `Display` and `FromStr` implementations
/// - `Serialize` and `Deserialize` implementations (validated on the way in)
/// - `Ord`, `Hash`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_name!(DeploymentId, "deployment id");
///
/// let id = DeploymentId::new("4f1c0a0e-6ac6-4c6b-9d4a-1e0f3b0c2d11")?;
/// let parsed: DeploymentId = "4f1c0a0e-6ac6-4c6b-9d4a-1e0f3b0c2d11".parse()?;
/// ```
#[macro_export]
macro_rules! define_name {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Human-readable kind used in error messages.
            pub const KIND: &'static str = $kind;

            /// Creates a name, rejecting empty or whitespace-bearing input.
            pub fn new(value: impl Into<String>) -> Result<Self, $crate::IdError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err($crate::IdError::Empty { kind: Self::KIND });
                }
                if value.chars().any(char::is_whitespace) {
                    return Err($crate::IdError::Whitespace {
                        kind: Self::KIND,
                        actual: value,
                    });
                }
                Ok(Self(value))
            }

            /// Returns the name as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the wrapper and returns the owned string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::new(s).map_err(serde::de::Error::custom)
            }
        }
    };
}
