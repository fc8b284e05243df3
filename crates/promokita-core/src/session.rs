//! Scrape-session audit records.
//!
//! One session is created per platform per cycle, transitions
//! `running -> {completed | failed | cancelled}` exactly once, and is never
//! mutated afterwards. Sessions exist for observability and audit, not for
//! control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coupon::InvalidValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states admit no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(InvalidValue {
                what: "session status",
                value: other.to_string(),
            }),
        }
    }
}

/// Data for creating a session in `running` status.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub public_id: Uuid,
    pub platform_id: i64,
    pub started_at: DateTime<Utc>,
}

/// Terminal update applied exactly once when a platform run ends.
#[derive(Debug, Clone)]
pub struct SessionPatch {
    pub status: SessionStatus,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub items_found: i32,
    pub items_saved: i32,
    pub items_updated: i32,
    pub items_failed: i32,
    pub error_details: Option<serde_json::Value>,
}
