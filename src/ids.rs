//! Identifier types for projects and file nodes.
//!
//! Identifiers arrive as strings from the controller layer. They are parsed
//! once into these newtypes and never re-interpreted further down.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::WorkbenchError;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an identifier supplied by a caller.
            pub fn parse(s: &str) -> Result<Self, WorkbenchError> {
                Uuid::parse_str(s.trim()).map(Self).map_err(|_| {
                    WorkbenchError::Validation(format!("invalid {} id: {s:?}", $label))
                })
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl FromStr for $name {
            type Err = WorkbenchError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id!(
    /// Identifier of a project.
    ProjectId,
    "project"
);

define_id!(
    /// Identifier of a file or folder node.
    NodeId,
    "node"
);
