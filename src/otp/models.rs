use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

/// A single password-reset code scoped to one email address.
///
/// `consumed_at` is set exactly once, by the winning verification;
/// `completed_at` closes the record once the new password is in place.
/// Neither field ever reverts to `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpRecord {
    pub id: Uuid,
    pub email: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl OtpRecord {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }
}

impl<'r> FromRow<'r, PgRow> for OtpRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            code: row.try_get("code")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            consumed_at: row.try_get("consumed_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

/// Outcome of checking a submitted code against the stored record.
///
/// Only infrastructure faults travel the error path; these are ordinary
/// results a caller is expected to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeValidation {
    /// Code matched inside its window and was consumed; at most one caller
    /// ever observes this for a given record.
    Valid,
    /// A pending code exists but the submitted value did not match. The
    /// record stays consumable within its window.
    Invalid,
    /// The code existed but its window elapsed; no retry can succeed.
    Expired,
    /// No pending code for this address: never issued, already consumed, or
    /// superseded by a newer issuance.
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expires_in: Duration) -> OtpRecord {
        let now = Utc::now();
        OtpRecord {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            code: "042017".to_string(),
            created_at: now,
            expires_at: now + expires_in,
            consumed_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn expiry_is_strictly_after_the_deadline() {
        let record = record(Duration::minutes(10));
        assert!(!record.is_expired(record.created_at));
        assert!(!record.is_expired(record.expires_at));
        assert!(record.is_expired(record.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn consumption_reads_from_the_marker() {
        let mut record = record(Duration::minutes(10));
        assert!(!record.is_consumed());
        record.consumed_at = Some(Utc::now());
        assert!(record.is_consumed());
    }

    #[test]
    fn validation_outcome_debug_names() {
        assert_eq!(format!("{:?}", CodeValidation::Valid), "Valid");
        assert_eq!(format!("{:?}", CodeValidation::Invalid), "Invalid");
        assert_eq!(format!("{:?}", CodeValidation::Expired), "Expired");
        assert_eq!(format!("{:?}", CodeValidation::NotFound), "NotFound");
    }
}
