//! Typed identifiers for Hashfleet entities.
//!
//! Every row the orchestrator creates is keyed by a v4 UUID. The wrappers
//! exist so a task id cannot be passed where a job id belongs; they are
//! `Copy`, hold the parsed [`Uuid`] rather than its string form, and
//! serialize as the canonical hyphenated text that lands in TEXT columns
//! and on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A string that is not a UUID of the expected kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidId {
    kind: &'static str,
    value: String,
}

impl InvalidId {
    /// Which id family rejected the input.
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl fmt::Display for InvalidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a valid {} id", self.value, self.kind)
    }
}

impl std::error::Error for InvalidId {}

macro_rules! fleet_id {
    ($(#[$doc:meta])* $name:ident as $kind:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Accept a stored or wire-supplied id, rejecting anything that
            /// is not a UUID.
            pub fn parse(value: &str) -> Result<Self, InvalidId> {
                Uuid::parse_str(value.trim()).map(Self).map_err(|_| InvalidId {
                    kind: $kind,
                    value: value.to_string(),
                })
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
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

        impl std::str::FromStr for $name {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

fleet_id! {
    /// A hashlist and its on-disk file.
    HashlistId as "hashlist"
}
fleet_id! {
    /// A reusable preset job definition.
    PresetJobId as "preset job"
}
fleet_id! {
    /// A runtime job execution.
    JobId as "job"
}
fleet_id! {
    /// One length-slice of an increment-mode job.
    LayerId as "increment layer"
}
fleet_id! {
    /// A chunk of work handed to an agent.
    TaskId as "task"
}
fleet_id! {
    /// A remote compute agent.
    AgentId as "agent"
}
fleet_id! {
    /// A registered cracking-binary version.
    BinaryId as "binary version"
}
fleet_id! {
    /// A wordlist or rule file record.
    FileResourceId as "file resource"
}
fleet_id! {
    /// The client a hashlist belongs to.
    ClientId as "client"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn new_ids_are_valid_uuids() {
        let id = JobId::new();
        assert_eq!(Uuid::parse_str(&id.to_string()).unwrap(), id.as_uuid());
    }

    #[test]
    fn parse_rejects_garbage_and_names_the_kind() {
        let err = TaskId::parse("not-a-uuid").unwrap_err();
        assert_eq!(err.kind(), "task");
        assert!(err.to_string().contains("not-a-uuid"));
    }

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let id = AgentId::new();
        let padded = format!("  {}\n", id);
        assert_eq!(AgentId::from_str(&padded).unwrap(), id);
    }

    #[test]
    fn serde_is_the_hyphenated_string() {
        let id = HashlistId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: HashlistId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
