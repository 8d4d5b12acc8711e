use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of an uploaded file.
///
/// Moves forward only: `pending -> processing -> {completed | failed}`. A record may
/// also fail straight from `pending` when the first chain step never succeeds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "upload_status", rename_all = "lowercase")
)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }

    /// Whether `self -> next` is allowed. `processing -> processing` is accepted so a
    /// retried ingest step can re-announce itself.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        match self {
            UploadStatus::Pending => {
                matches!(next, UploadStatus::Processing | UploadStatus::Failed)
            }
            UploadStatus::Processing => matches!(
                next,
                UploadStatus::Processing | UploadStatus::Completed | UploadStatus::Failed
            ),
            UploadStatus::Completed | UploadStatus::Failed => false,
        }
    }

    /// States from which `next` may be entered.
    pub fn predecessors_of(next: UploadStatus) -> &'static [UploadStatus] {
        match next {
            UploadStatus::Pending => &[],
            UploadStatus::Processing => &[UploadStatus::Pending, UploadStatus::Processing],
            UploadStatus::Completed => &[UploadStatus::Processing],
            UploadStatus::Failed => &[UploadStatus::Pending, UploadStatus::Processing],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Processing => "processing",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UploadStatus::Pending),
            "processing" => Ok(UploadStatus::Processing),
            "completed" => Ok(UploadStatus::Completed),
            "failed" => Ok(UploadStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid upload status: {}", s)),
        }
    }
}

/// Persistent lifecycle record for one uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UploadRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Name the file is stored under (`{unix_ts}_{slug}.{ext}`).
    pub filename: String,
    /// Name the client uploaded the file as.
    pub original_name: String,
    /// Storage key of the raw bytes, e.g. `uploads/1700000000_prices.csv`.
    pub file_path: String,
    /// SHA-256 of the raw bytes, hex encoded. Advisory only.
    pub file_hash: Option<String>,
    pub status: UploadStatus,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by intake when the record is first created.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub user_id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub file_path: String,
}

/// Minimal owner information carried in broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UploadOwner {
    pub id: Uuid,
    pub name: String,
}

/// Upload row joined with the number of catalog records it last wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSummary {
    #[serde(flatten)]
    pub upload: UploadRecord,
    pub products_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(UploadStatus::Pending.can_transition_to(UploadStatus::Processing));
        assert!(UploadStatus::Processing.can_transition_to(UploadStatus::Processing));
        assert!(UploadStatus::Processing.can_transition_to(UploadStatus::Completed));
        assert!(UploadStatus::Processing.can_transition_to(UploadStatus::Failed));
        assert!(UploadStatus::Pending.can_transition_to(UploadStatus::Failed));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [UploadStatus::Completed, UploadStatus::Failed] {
            assert!(terminal.is_terminal());
            for next in [
                UploadStatus::Pending,
                UploadStatus::Processing,
                UploadStatus::Completed,
                UploadStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn pending_cannot_complete_directly() {
        assert!(!UploadStatus::Pending.can_transition_to(UploadStatus::Completed));
        assert!(!UploadStatus::Processing.can_transition_to(UploadStatus::Pending));
    }

    #[test]
    fn predecessors_agree_with_transition_table() {
        let all = [
            UploadStatus::Pending,
            UploadStatus::Processing,
            UploadStatus::Completed,
            UploadStatus::Failed,
        ];
        for next in all {
            for from in all {
                assert_eq!(
                    UploadStatus::predecessors_of(next).contains(&from),
                    from.can_transition_to(next),
                    "{from} -> {next}"
                );
            }
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        assert_eq!(
            "processing".parse::<UploadStatus>().unwrap(),
            UploadStatus::Processing
        );
        assert!("running".parse::<UploadStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&UploadStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
