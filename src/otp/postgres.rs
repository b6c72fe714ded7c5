//! Postgres-backed store.
//!
//! Single-use consumption relies on one conditional `UPDATE`: the row flips
//! to consumed only while it is still pending and unexpired, so exactly one
//! racing submission can win regardless of how many handlers run.

use crate::otp::code::generate_code;
use crate::otp::models::{CodeValidation, OtpRecord};
use crate::otp::store::OtpStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{info_span, Instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgOtpStore {
    pool: PgPool,
}

impl PgOtpStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    async fn issue(&self, email: &str, ttl: Duration) -> Result<OtpRecord> {
        let code = generate_code()?;
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        // Delete-then-insert in one transaction keeps at most one pending
        // code per address; an in-flight validate of the superseded code
        // misses once this commits.
        let mut tx = self.pool.begin().await.context("begin issue transaction")?;

        let query = "DELETE FROM reset_codes WHERE email = $1 AND consumed_at IS NULL";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to supersede pending reset codes")?;

        let query = r"
            INSERT INTO reset_codes (id, email, code, expires_at)
            VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 millisecond'))
            RETURNING id, email, code, created_at, expires_at, consumed_at, completed_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let record = sqlx::query_as::<_, OtpRecord>(query)
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(&code)
            .bind(ttl_ms)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert reset code")?;

        tx.commit().await.context("commit issue transaction")?;

        Ok(record)
    }

    async fn validate(&self, email: &str, code: &str) -> Result<CodeValidation> {
        // Consume first; the conditional update succeeds for exactly one
        // caller per record.
        let query = r"
            UPDATE reset_codes
            SET consumed_at = NOW()
            WHERE email = $1
              AND code = $2
              AND consumed_at IS NULL
              AND expires_at > NOW()
            RETURNING id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume reset code")?;

        if row.is_some() {
            return Ok(CodeValidation::Valid);
        }

        // Losing callers only need to know why; the database clock stays the
        // single authority for expiry.
        let query = r"
            SELECT code, (expires_at <= NOW()) AS expired
            FROM reset_codes
            WHERE email = $1
              AND consumed_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to classify reset code submission")?;

        let Some(row) = row else {
            return Ok(CodeValidation::NotFound);
        };
        if row.get::<bool, _>("expired") {
            return Ok(CodeValidation::Expired);
        }
        Ok(CodeValidation::Invalid)
    }

    async fn confirm_verified(&self, email: &str, code: &str) -> Result<bool> {
        let query = r"
            SELECT 1
            FROM reset_codes
            WHERE email = $1
              AND code = $2
              AND consumed_at IS NOT NULL
              AND completed_at IS NULL
              AND expires_at > NOW()
            LIMIT 1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to confirm verified reset code")?;

        Ok(row.is_some())
    }

    async fn mark_completed(&self, email: &str, code: &str) -> Result<()> {
        let query = r"
            UPDATE reset_codes
            SET completed_at = NOW()
            WHERE email = $1
              AND code = $2
              AND completed_at IS NULL
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .bind(code)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to close completed reset code")?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let query = "DELETE FROM reset_codes WHERE expires_at <= NOW()";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to purge expired reset codes")?;

        Ok(result.rows_affected())
    }
}
