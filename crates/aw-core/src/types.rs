//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A duration was negative or not a finite number of seconds.
    #[error("{field} must be a finite, non-negative number of seconds, got {value}")]
    InvalidSeconds { field: &'static str, value: f64 },

    /// A duration did not fit the supported time range.
    #[error("{field} is out of range")]
    OutOfRange { field: &'static str },

    /// An instant fell outside the years 0000 through 9999.
    #[error("{field} must fall within the years 0000 to 9999")]
    YearOutOfRange { field: &'static str },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated bucket identifier.
    ///
    /// Bucket IDs must be non-empty strings. They are unique within one
    /// datastore and conventionally look like `aw-watcher-window_myhost`.
    BucketId, "bucket ID"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_id_rejects_empty() {
        assert!(BucketId::new("").is_err());
        assert!(BucketId::new("aw-watcher-afk_host").is_ok());
    }

    #[test]
    fn bucket_id_serde_roundtrip() {
        let id = BucketId::new("aw-watcher-window_host").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"aw-watcher-window_host\"");
        let parsed: BucketId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn bucket_id_serde_rejects_empty() {
        let result: Result<BucketId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn bucket_id_as_ref() {
        let id = BucketId::new("bucket-1").unwrap();
        let s: &str = id.as_ref();
        assert_eq!(s, "bucket-1");
    }

    #[test]
    fn invalid_seconds_message_names_field() {
        let err = ValidationError::InvalidSeconds {
            field: "pulsetime",
            value: -1.0,
        };
        assert_eq!(
            err.to_string(),
            "pulsetime must be a finite, non-negative number of seconds, got -1"
        );
    }
}
