//! Reset lifecycle orchestration: issue, notify, verify, complete.

use crate::api::email::{CodeEmail, CodeSender};
use crate::credentials::CredentialStore;
use crate::otp::models::CodeValidation;
use crate::otp::store::OtpStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

const DEFAULT_CODE_TTL_SECONDS: u64 = 10 * 60;
const DEFAULT_SEND_TIMEOUT_SECONDS: u64 = 10;

/// Tunables for the reset flow.
#[derive(Clone, Copy, Debug)]
pub struct ResetConfig {
    code_ttl: Duration,
    send_timeout: Duration,
}

impl ResetConfig {
    /// Defaults: 10 minute code window, 10 second delivery deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            code_ttl: Duration::from_secs(DEFAULT_CODE_TTL_SECONDS),
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    #[must_use]
    pub fn code_ttl(&self) -> Duration {
        self.code_ttl
    }

    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a request-code call. Issuance succeeded in both cases; the
/// variants only report what happened to delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeIssued {
    Sent,
    DeliveryFailed,
}

/// Outcome of the final password-set step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Completed,
    /// The address+code pairing was never verified, expired, or was already
    /// used to complete a reset.
    NotVerified,
    /// Verification stands but the credential write failed; the caller may
    /// retry completion without re-verifying.
    CredentialUpdateFailed,
}

#[derive(Clone)]
pub struct ResetService {
    store: Arc<dyn OtpStore>,
    sender: Arc<dyn CodeSender>,
    credentials: Arc<dyn CredentialStore>,
    config: ResetConfig,
}

impl ResetService {
    #[must_use]
    pub fn new(
        store: Arc<dyn OtpStore>,
        sender: Arc<dyn CodeSender>,
        credentials: Arc<dyn CredentialStore>,
        config: ResetConfig,
    ) -> Self {
        Self {
            store,
            sender,
            credentials,
            config,
        }
    }

    /// Issue a fresh code for `email` and hand it to the delivery gateway.
    ///
    /// The record commits before delivery starts, so an unconfirmed or
    /// failed send still leaves a usable code behind.
    ///
    /// # Errors
    /// Returns an error only when the store itself is unavailable.
    pub async fn request_code(&self, email: &str) -> Result<CodeIssued> {
        let record = self.store.issue(email, self.config.code_ttl()).await?;

        let message = CodeEmail {
            to_email: email.to_string(),
            code: record.code,
        };
        match tokio::time::timeout(self.config.send_timeout(), self.sender.send(&message)).await {
            Ok(Ok(())) => Ok(CodeIssued::Sent),
            Ok(Err(err)) => {
                error!(to_email = %message.to_email, "failed to deliver reset code: {err}");
                Ok(CodeIssued::DeliveryFailed)
            }
            Err(_) => {
                error!(to_email = %message.to_email, "reset code delivery timed out");
                Ok(CodeIssued::DeliveryFailed)
            }
        }
    }

    /// Check a submitted code, consuming it on the first match.
    ///
    /// # Errors
    /// Returns an error only when the store itself is unavailable.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<CodeValidation> {
        self.store.validate(email, code).await
    }

    /// Re-confirm the verified address+code pairing, persist the new
    /// password, and close the record.
    ///
    /// # Errors
    /// Returns an error only when the store itself is unavailable.
    pub async fn complete_reset(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<ResetOutcome> {
        if !self.store.confirm_verified(email, code).await? {
            return Ok(ResetOutcome::NotVerified);
        }

        if let Err(err) = self.credentials.set_password(email, new_password).await {
            // The record stays open so the caller can retry completion
            // without going through verification again.
            error!("failed to store new credential: {err}");
            return Ok(ResetOutcome::CredentialUpdateFailed);
        }

        self.store.mark_completed(email, code).await?;
        Ok(ResetOutcome::Completed)
    }
}
