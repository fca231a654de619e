//! Index range queries and the integrity-failure policy.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::queue_type::QueueType;

/// Sort direction on `event_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// Oldest (most in the past) first.
    #[default]
    Asc,
    /// Newest (most in the future) first.
    Desc,
}

impl FromStr for Order {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(QueueError::Validation(format!(
                "bad order '{other}': expected 'asc' or 'desc'"
            ))),
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => f.write_str("asc"),
            Self::Desc => f.write_str("desc"),
        }
    }
}

/// How `index_events` treats an index row whose payload is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityFailurePolicy {
    /// Return the row with an absent payload; the caller cleans up.
    #[default]
    Include,
    /// Delete the row, commit, and leave it out of the results.
    DeleteAndCommit,
}

impl FromStr for IntegrityFailurePolicy {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "include" => Ok(Self::Include),
            "delete_and_commit" | "deleteAndCommit" => Ok(Self::DeleteAndCommit),
            other => Err(QueueError::Validation(format!(
                "bad integrity failure technique: {other}"
            ))),
        }
    }
}

impl fmt::Display for IntegrityFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Include => f.write_str("include"),
            Self::DeleteAndCommit => f.write_str("delete_and_commit"),
        }
    }
}

/// A range query over one queue type of the event index.
///
/// Bounds are exclusive: rows match when `after < event_at < before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexQuery {
    /// Queue type to read from.
    pub queue_type: QueueType,
    /// Maximum number of rows.
    pub limit: u32,
    /// Only rows strictly earlier than this time.
    pub before: Option<DateTime<Utc>>,
    /// Only rows strictly later than this time.
    pub after: Option<DateTime<Utc>>,
    /// Sort direction on `event_at`.
    pub order: Order,
}

impl IndexQuery {
    /// Unbounded ascending query for up to `limit` rows.
    #[must_use]
    pub fn new(queue_type: QueueType, limit: u32) -> Self {
        Self {
            queue_type,
            limit,
            before: None,
            after: None,
            order: Order::Asc,
        }
    }

    /// Restricts the query to rows due strictly before `time`.
    #[must_use]
    pub fn before(mut self, time: DateTime<Utc>) -> Self {
        self.before = Some(time);
        self
    }

    /// Restricts the query to rows due strictly after `time`.
    #[must_use]
    pub fn after(mut self, time: DateTime<Utc>) -> Self {
        self.after = Some(time);
        self
    }

    /// Sets the sort direction.
    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Returns true if a row due at `event_at` falls inside the bounds.
    #[must_use]
    pub fn matches(&self, event_at: DateTime<Utc>) -> bool {
        self.before.is_none_or(|before| event_at < before)
            && self.after.is_none_or(|after| event_at > after)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn test_order_parses_known_values() {
        assert_eq!("asc".parse::<Order>().unwrap(), Order::Asc);
        assert_eq!("desc".parse::<Order>().unwrap(), Order::Desc);
        assert!("sideways".parse::<Order>().is_err());
    }

    #[test]
    fn test_policy_parses_known_values() {
        assert_eq!(
            "include".parse::<IntegrityFailurePolicy>().unwrap(),
            IntegrityFailurePolicy::Include
        );
        assert_eq!(
            "delete_and_commit".parse::<IntegrityFailurePolicy>().unwrap(),
            IntegrityFailurePolicy::DeleteAndCommit
        );
        assert_eq!(
            "deleteAndCommit".parse::<IntegrityFailurePolicy>().unwrap(),
            IntegrityFailurePolicy::DeleteAndCommit
        );
    }

    #[test]
    fn test_unknown_policy_is_a_validation_error() {
        match "ignore".parse::<IntegrityFailurePolicy>() {
            Err(QueueError::Validation(msg)) => assert!(msg.contains("ignore")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_bounds_are_exclusive() {
        let t = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let query = IndexQuery::new(QueueType::new(0), 10)
            .after(t)
            .before(t + Duration::seconds(10));

        assert!(!query.matches(t));
        assert!(query.matches(t + Duration::seconds(1)));
        assert!(!query.matches(t + Duration::seconds(10)));
    }

    #[test]
    fn test_unbounded_query_matches_everything() {
        let query = IndexQuery::new(QueueType::new(0), 10);
        assert!(query.matches(Utc::now()));
        assert_eq!(query.order, Order::Asc);
    }
}
