//! Opaque references to records owned by the surrounding system
//!
//! Customers, catalog items and locations live outside the rental engine. The
//! engine only carries their identifiers, which must be:
//! - between 1 and 64 characters long
//! - made of ASCII alphanumerics, `-`, `_`, `.` or `:`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_REFERENCE_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },
    #[error("{kind} too long (max 64 characters)")]
    TooLong { kind: &'static str },
    #[error("{kind} contains invalid characters: {value}")]
    InvalidCharacters { kind: &'static str, value: String },
}

fn validate_reference(kind: &'static str, value: &str) -> Result<(), ReferenceError> {
    if value.is_empty() {
        return Err(ReferenceError::Empty { kind });
    }

    if value.len() > MAX_REFERENCE_LEN {
        return Err(ReferenceError::TooLong { kind });
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(ReferenceError::InvalidCharacters {
            kind,
            value: value.to_string(),
        });
    }

    Ok(())
}

macro_rules! reference_type {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, ReferenceError> {
                let value = value.into();
                validate_reference($kind, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ReferenceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ReferenceError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

reference_type!(
    /// Customer record reference
    CustomerId,
    "customer id"
);

reference_type!(
    /// Catalog item reference
    ItemId,
    "item id"
);

reference_type!(
    /// Stock location reference
    LocationId,
    "location id"
);
