//! Storage abstraction for reset codes.

use crate::otp::models::{CodeValidation, OtpRecord};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

/// Keyed storage with expiry and single-use enforcement.
///
/// Implementations own all record mutation. Callers only read and request
/// transitions through these operations, so concurrent verify attempts for
/// the same record cannot race past each other.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Issue a fresh code for `email`, superseding any pending one. After
    /// this returns there is exactly one pending record for the address.
    async fn issue(&self, email: &str, ttl: Duration) -> Result<OtpRecord>;

    /// Check a submitted code against the newest pending record and consume
    /// it on a match. The check-and-consume step is atomic: with racing
    /// submissions of the correct code, exactly one caller observes
    /// [`CodeValidation::Valid`].
    async fn validate(&self, email: &str, code: &str) -> Result<CodeValidation>;

    /// Whether `code` is the consumed, not yet completed, unexpired code for
    /// `email`. Used by the password-set step to re-confirm the pairing
    /// without producing a second `Valid`.
    async fn confirm_verified(&self, email: &str, code: &str) -> Result<bool>;

    /// Close the record once the new credential is in place.
    async fn mark_completed(&self, email: &str, code: &str) -> Result<()>;

    /// Drop records past their expiry window. Returns how many were removed.
    /// Expiry is also checked inline by `validate`, so purge timing only
    /// affects table size, never outcomes.
    async fn purge_expired(&self) -> Result<u64>;
}

/// Spawn a background task that reclaims expired codes on a fixed cadence.
pub fn spawn_purge_worker(
    store: Arc<dyn OtpStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(count) => info!(count, "reclaimed expired reset codes"),
                Err(err) => error!("reset code purge failed: {err}"),
            }

            sleep(interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::memory::MemoryOtpStore;
    use anyhow::Result;

    #[tokio::test]
    async fn purge_worker_reclaims_expired_codes() -> Result<()> {
        let store = Arc::new(MemoryOtpStore::new());
        store
            .issue("stale@example.com", Duration::from_millis(10))
            .await?;

        let worker = spawn_purge_worker(store.clone(), Duration::from_millis(20));
        sleep(Duration::from_millis(120)).await;
        worker.abort();

        assert!(store.current_code("stale@example.com").await.is_none());
        Ok(())
    }
}
