//! Item lifecycle status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LoopyError;

/// Execution status of a single item.
///
/// A FAILED item is one whose command exited non-zero. A timeout would also
/// land here, but no timeout is enforced today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemStatus {
    /// Not attempted yet, or explicitly reset
    #[default]
    Pending,
    /// Command exited with status 0
    Success,
    /// Command exited with a non-zero status
    Failed,
}

impl ItemStatus {
    /// Name as persisted in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "PENDING",
            ItemStatus::Success => "SUCCESS",
            ItemStatus::Failed => "FAILED",
        }
    }

    /// Check if this item has finished (successfully or not).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Success | ItemStatus::Failed)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = LoopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ItemStatus::Pending),
            "SUCCESS" => Ok(ItemStatus::Success),
            "FAILED" => Ok(ItemStatus::Failed),
            other => Err(LoopyError::CorruptStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_pending() {
        assert_eq!(ItemStatus::default(), ItemStatus::Pending);
    }

    #[test]
    fn test_parse_known_values() {
        for status in [ItemStatus::Pending, ItemStatus::Success, ItemStatus::Failed] {
            assert_eq!(status.as_str().parse::<ItemStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_parse_unknown_value_fails() {
        let err = "RUNNING".parse::<ItemStatus>().unwrap_err();
        assert!(matches!(err, LoopyError::CorruptStatus(ref v) if v == "RUNNING"));
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert!("pending".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn test_is_terminal() {
        assert!(!ItemStatus::Pending.is_terminal());
        assert!(ItemStatus::Success.is_terminal());
        assert!(ItemStatus::Failed.is_terminal());
    }
}
