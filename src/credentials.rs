//! Credential collaborator: persists the new password once a reset is
//! confirmed. The reset flow only ever calls this after the code check; how
//! accounts are stored and hashed stays on this side of the trait.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHasher,
};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{info_span, Instrument};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Replace the stored credential for `email`.
    ///
    /// # Errors
    /// Returns an error if hashing fails, the backend is unreachable, or no
    /// account exists for the address.
    async fn set_password(&self, email: &str, new_password: &str) -> Result<()>;
}

fn hash_password(new_password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(new_password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn set_password(&self, email: &str, new_password: &str) -> Result<()> {
        let hash = hash_password(new_password)?;

        let query = r"
            UPDATE users
            SET password_hash = $2,
                updated_at = NOW()
            WHERE email = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(email)
            .bind(hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password")?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("no account for address"));
        }

        Ok(())
    }
}

/// In-memory credential store for local development and tests. Passwords are
/// hashed the same way as the Postgres store before they are kept.
#[derive(Default)]
pub struct MemoryCredentialStore {
    hashes: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has_credential(&self, email: &str) -> bool {
        let hashes = self.hashes.lock().await;
        hashes.contains_key(email)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn set_password(&self, email: &str, new_password: &str) -> Result<()> {
        let hash = hash_password(new_password)?;
        let mut hashes = self.hashes.lock().await;
        hashes.insert(email.to_string(), hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn hashes_are_salted() -> Result<()> {
        let first = hash_password("hunter22")?;
        let second = hash_password("hunter22")?;
        assert_ne!(first, second);
        assert!(first.starts_with("$argon2"));
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_records_the_credential() -> Result<()> {
        let store = MemoryCredentialStore::new();
        assert!(!store.has_credential("alice@example.com").await);

        store.set_password("alice@example.com", "hunter22").await?;
        assert!(store.has_credential("alice@example.com").await);
        Ok(())
    }
}
