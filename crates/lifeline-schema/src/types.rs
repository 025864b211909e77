//! Newtype wrappers for cluster identifiers, providing compile-time type safety.
//!
//! All name newtypes serialize/deserialize as plain strings so persisted
//! records stay readable.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Name of a service deployed in a cluster (e.g. `HDFS`).
    ServiceName
);

string_newtype!(
    /// Name of a component of a service (e.g. `NAMENODE`, `HDFS_CLIENT`).
    ComponentName
);

string_newtype!(
    /// Fully qualified name of a cluster host.
    HostName
);

/// Validate a cluster, service, component or host name.
///
/// Names must be 1-255 characters of `[a-zA-Z0-9_.-]`.
pub fn validate_name(kind: &str, name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.len() > 255 {
        return Err(SchemaError::InvalidName(format!(
            "{kind} name must be 1-255 characters"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(SchemaError::InvalidName(format!(
            "{kind} name '{name}' must match [a-zA-Z0-9_.-]"
        )));
    }
    Ok(())
}

/// Stack identifier of the form `<name>-<version>`, e.g. `HDP-1.3.0`.
///
/// The default value is the "unset" stack, which renders as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackId {
    pub stack_name: String,
    pub stack_version: String,
}

impl StackId {
    pub fn new(stack_name: impl Into<String>, stack_version: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            stack_version: stack_version.into(),
        }
    }

    pub fn is_unset(&self) -> bool {
        self.stack_name.is_empty() && self.stack_version.is_empty()
    }

    /// The `<name>-<version>` form, or an empty string when unset.
    pub fn stack_id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            Ok(())
        } else {
            write!(f, "{}-{}", self.stack_name, self.stack_version)
        }
    }
}

impl FromStr for StackId {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        match s.split_once('-') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => {
                Ok(Self::new(name, version))
            }
            _ => Err(SchemaError::InvalidStackId(s.to_owned())),
        }
    }
}
