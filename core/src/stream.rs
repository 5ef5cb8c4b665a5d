//! Aggregate identification and versioning types.
//!
//! Every domain event belongs to exactly one aggregate, addressed by an
//! [`AggregateType`] and an [`AggregateId`]. Events within one aggregate are
//! numbered by [`Version`], starting at 1 and increasing without gaps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for aggregate identifier parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseAggregateError {
    /// Aggregate ids must not be empty.
    #[error("Invalid aggregate ID: aggregate ID cannot be empty")]
    EmptyId,

    /// The aggregate type is not part of the vocabulary.
    #[error("Unknown aggregate type: {0}")]
    UnknownType(String),
}

/// The kind of entity an event stream belongs to.
///
/// Only `Event` and `Ticket` aggregates are driven by the workflow state machines;
/// the remaining kinds appear in the event log as the subjects of downstream facts
/// (payments, escrow) or of flows that live outside the lifecycle core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateType {
    /// An event (gathering) that guests register for.
    Event,
    /// A guest registration.
    Ticket,
    /// A payment or escrow record.
    Payment,
    /// A calendar that groups events.
    Calendar,
    /// A platform user.
    User,
}

impl AggregateType {
    /// All aggregate kinds, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Event,
        Self::Ticket,
        Self::Payment,
        Self::Calendar,
        Self::User,
    ];

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Ticket => "ticket",
            Self::Payment => "payment",
            Self::Calendar => "calendar",
            Self::User => "user",
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateType {
    type Err = ParseAggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseAggregateError::UnknownType(s.to_string()))
    }
}

/// Identifier of a single aggregate instance.
///
/// # Validation
///
/// - `FromStr::from_str()`: rejects empty strings
/// - `From::from()` and `new()`: no validation (trusted, application-controlled input)
///
/// # Examples
///
/// ```
/// use ticketflow_core::stream::AggregateId;
///
/// let id = AggregateId::new("guest-42");
/// assert_eq!(id.as_str(), "guest-42");
///
/// let parsed: AggregateId = "evt-7".parse().unwrap();
/// assert_eq!(parsed, AggregateId::new("evt-7"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(String);

impl AggregateId {
    /// Create a new `AggregateId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AggregateId {
    type Err = ParseAggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseAggregateError::EmptyId);
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for AggregateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AggregateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for AggregateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fully qualified address of an event stream: `(aggregate_type, aggregate_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRef {
    /// Kind of aggregate.
    pub aggregate_type: AggregateType,
    /// Instance identifier.
    pub aggregate_id: AggregateId,
}

impl AggregateRef {
    /// Create a reference from its parts.
    #[must_use]
    pub fn new(aggregate_type: AggregateType, aggregate_id: impl Into<AggregateId>) -> Self {
        Self {
            aggregate_type,
            aggregate_id: aggregate_id.into(),
        }
    }

    /// Reference to an Event aggregate.
    #[must_use]
    pub fn event(id: impl Into<AggregateId>) -> Self {
        Self::new(AggregateType::Event, id)
    }

    /// Reference to a Ticket aggregate.
    #[must_use]
    pub fn ticket(id: impl Into<AggregateId>) -> Self {
        Self::new(AggregateType::Ticket, id)
    }

    /// Reference to a Payment aggregate.
    #[must_use]
    pub fn payment(id: impl Into<AggregateId>) -> Self {
        Self::new(AggregateType::Payment, id)
    }
}

impl fmt::Display for AggregateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.aggregate_type, self.aggregate_id)
    }
}

/// Per-aggregate event version.
///
/// `Version::INITIAL` (0) describes a stream with no events. The first appended
/// event carries version 1, and every following event increments by exactly one.
///
/// # Examples
///
/// ```
/// use ticketflow_core::stream::Version;
///
/// let v0 = Version::INITIAL;
/// let v1 = v0.next();
/// assert_eq!(v1, Version::new(1));
/// assert_eq!(v1.value(), 1);
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The version of a stream that has no events.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Check if this is the initial version (0).
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod aggregate_tests {
        use super::*;

        #[test]
        fn aggregate_type_round_trips_through_str() {
            for kind in AggregateType::ALL {
                assert_eq!(kind.as_str().parse::<AggregateType>(), Ok(kind));
            }
        }

        #[test]
        fn unknown_aggregate_type_is_rejected() {
            let result = "invoice".parse::<AggregateType>();
            assert_eq!(
                result,
                Err(ParseAggregateError::UnknownType("invoice".to_string()))
            );
        }

        #[test]
        #[allow(clippy::expect_used)] // Panics: Test will fail if parse fails
        fn parse_aggregate_id() {
            let id: AggregateId = "guest-1".parse().expect("parse should succeed");
            assert_eq!(id, AggregateId::new("guest-1"));
        }

        #[test]
        fn parse_empty_aggregate_id_fails() {
            assert_eq!("".parse::<AggregateId>(), Err(ParseAggregateError::EmptyId));
        }

        #[test]
        fn aggregate_ref_display() {
            let aggregate = AggregateRef::ticket("guest-1");
            assert_eq!(aggregate.to_string(), "ticket:guest-1");
        }

        #[test]
        fn aggregate_id_serializes_as_plain_string() {
            let json = serde_json::to_string(&AggregateId::new("evt-1")).unwrap_or_default();
            assert_eq!(json, "\"evt-1\"");
        }
    }

    mod version_tests {
        use super::*;

        #[test]
        fn initial_version() {
            assert_eq!(Version::INITIAL, Version::new(0));
            assert!(Version::INITIAL.is_initial());
            assert_eq!(Version::default(), Version::INITIAL);
        }

        #[test]
        fn next_version() {
            let v1 = Version::INITIAL.next();
            let v2 = v1.next();

            assert_eq!(v1, Version::new(1));
            assert_eq!(v2, Version::new(2));
        }

        #[test]
        fn version_ordering() {
            assert!(Version::new(1) < Version::new(2));
            assert!(Version::new(3) > Version::new(1));
        }

        #[test]
        fn version_from_u64() {
            let version = Version::from(42_u64);
            assert_eq!(version.value(), 42);

            let num: u64 = version.into();
            assert_eq!(num, 42);
        }
    }
}
