//! In-memory store for local development and tests.

use crate::otp::code::generate_code;
use crate::otp::models::{CodeValidation, OtpRecord};
use crate::otp::store::OtpStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Keeps the newest record per address behind a single mutex. Holding the
/// lock across the whole check-and-flip serializes racing submissions, so
/// the single-use guarantee holds without a database underneath.
#[derive(Default)]
pub struct MemoryOtpStore {
    records: Mutex<HashMap<String, OtpRecord>>,
}

impl MemoryOtpStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current code for an address, pending or consumed. Lets local dev and
    /// tests read what would otherwise only leave through the mailer.
    pub async fn current_code(&self, email: &str) -> Option<String> {
        let records = self.records.lock().await;
        records.get(email).map(|record| record.code.clone())
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn issue(&self, email: &str, ttl: Duration) -> Result<OtpRecord> {
        let code = generate_code()?;
        let ttl = ChronoDuration::from_std(ttl).context("reset code ttl out of range")?;
        let now = Utc::now();
        let record = OtpRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            code,
            created_at: now,
            expires_at: now + ttl,
            consumed_at: None,
            completed_at: None,
        };

        let mut records = self.records.lock().await;
        // Inserting over the previous entry supersedes it: an in-flight
        // validate of the old code lands here afterwards and misses.
        records.insert(email.to_string(), record.clone());

        Ok(record)
    }

    async fn validate(&self, email: &str, code: &str) -> Result<CodeValidation> {
        let now = Utc::now();
        let mut records = self.records.lock().await;

        let Some(record) = records.get_mut(email) else {
            return Ok(CodeValidation::NotFound);
        };
        if record.is_consumed() {
            return Ok(CodeValidation::NotFound);
        }
        if record.is_expired(now) {
            return Ok(CodeValidation::Expired);
        }
        if record.code != code {
            return Ok(CodeValidation::Invalid);
        }

        record.consumed_at = Some(now);
        Ok(CodeValidation::Valid)
    }

    async fn confirm_verified(&self, email: &str, code: &str) -> Result<bool> {
        let now = Utc::now();
        let records = self.records.lock().await;
        Ok(records.get(email).is_some_and(|record| {
            record.code == code
                && record.is_consumed()
                && record.completed_at.is_none()
                && !record.is_expired(now)
        }))
    }

    async fn mark_completed(&self, email: &str, code: &str) -> Result<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(email) {
            if record.code == code && record.completed_at.is_none() {
                record.completed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));
        Ok(before.saturating_sub(records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Arc;
    use tokio::time::sleep;

    const ADDRESS: &str = "alice@example.com";
    const WINDOW: Duration = Duration::from_secs(600);

    /// A 6-digit string guaranteed to differ from `code`.
    fn mismatching(code: &str) -> String {
        if code == "000000" {
            "000001".to_string()
        } else {
            "000000".to_string()
        }
    }

    #[tokio::test]
    async fn correct_code_validates_once() -> Result<()> {
        let store = MemoryOtpStore::new();
        let record = store.issue(ADDRESS, WINDOW).await?;

        assert_eq!(
            store.validate(ADDRESS, &record.code).await?,
            CodeValidation::Valid
        );
        // Replay of the same code is rejected.
        assert_eq!(
            store.validate(ADDRESS, &record.code).await?,
            CodeValidation::NotFound
        );
        Ok(())
    }

    #[tokio::test]
    async fn wrong_code_leaves_the_record_consumable() -> Result<()> {
        let store = MemoryOtpStore::new();
        let record = store.issue(ADDRESS, WINDOW).await?;

        let wrong = mismatching(&record.code);
        assert_eq!(store.validate(ADDRESS, &wrong).await?, CodeValidation::Invalid);
        assert_eq!(
            store.validate(ADDRESS, &record.code).await?,
            CodeValidation::Valid
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_address_is_not_found() -> Result<()> {
        let store = MemoryOtpStore::new();
        assert_eq!(
            store.validate("nobody@example.com", "123456").await?,
            CodeValidation::NotFound
        );
        Ok(())
    }

    #[tokio::test]
    async fn expired_code_is_dead_even_when_correct() -> Result<()> {
        let store = MemoryOtpStore::new();
        let record = store.issue(ADDRESS, Duration::from_millis(20)).await?;

        sleep(Duration::from_millis(60)).await;
        assert_eq!(
            store.validate(ADDRESS, &record.code).await?,
            CodeValidation::Expired
        );
        // Still dead on retry.
        assert_eq!(
            store.validate(ADDRESS, &record.code).await?,
            CodeValidation::Expired
        );
        Ok(())
    }

    #[tokio::test]
    async fn new_issue_supersedes_the_previous_code() -> Result<()> {
        let store = MemoryOtpStore::new();
        let first = store.issue(ADDRESS, WINDOW).await?;
        let mut second = store.issue(ADDRESS, WINDOW).await?;
        while second.code == first.code {
            second = store.issue(ADDRESS, WINDOW).await?;
        }

        assert_eq!(
            store.validate(ADDRESS, &first.code).await?,
            CodeValidation::Invalid
        );
        assert_eq!(
            store.validate(ADDRESS, &second.code).await?,
            CodeValidation::Valid
        );
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_validations_yield_exactly_one_valid() -> Result<()> {
        let store = Arc::new(MemoryOtpStore::new());
        let record = store.issue(ADDRESS, WINDOW).await?;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let code = record.code.clone();
            handles.push(tokio::spawn(async move {
                store.validate(ADDRESS, &code).await
            }));
        }

        let mut valid = 0;
        for handle in handles {
            match handle.await?? {
                CodeValidation::Valid => valid += 1,
                CodeValidation::NotFound => {}
                other => panic!("unexpected outcome for a racing replay: {other:?}"),
            }
        }
        assert_eq!(valid, 1);
        Ok(())
    }

    #[tokio::test]
    async fn completion_confirms_only_consumed_codes() -> Result<()> {
        let store = MemoryOtpStore::new();
        let record = store.issue(ADDRESS, WINDOW).await?;

        // Not verified yet.
        assert!(!store.confirm_verified(ADDRESS, &record.code).await?);

        assert_eq!(
            store.validate(ADDRESS, &record.code).await?,
            CodeValidation::Valid
        );
        assert!(store.confirm_verified(ADDRESS, &record.code).await?);
        // Wrong code never confirms.
        assert!(
            !store
                .confirm_verified(ADDRESS, &mismatching(&record.code))
                .await?
        );

        store.mark_completed(ADDRESS, &record.code).await?;
        // Closed records cannot complete twice.
        assert!(!store.confirm_verified(ADDRESS, &record.code).await?);
        Ok(())
    }

    #[tokio::test]
    async fn purge_drops_expired_records() -> Result<()> {
        let store = MemoryOtpStore::new();
        store.issue(ADDRESS, Duration::from_millis(10)).await?;
        store.issue("bob@example.com", WINDOW).await?;

        sleep(Duration::from_millis(50)).await;
        assert_eq!(store.purge_expired().await?, 1);
        assert!(store.current_code(ADDRESS).await.is_none());
        assert!(store.current_code("bob@example.com").await.is_some());
        Ok(())
    }
}
