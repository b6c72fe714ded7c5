//! # Recupero (password reset service)
//!
//! `recupero` issues one-time numeric codes for password resets, delivers
//! them by email, and enforces single-use semantics before letting a caller
//! set a new password.
//!
//! ## Flow
//!
//! 1. `POST /v1/reset/request` issues a 6-digit code for an address and
//!    hands it to the delivery gateway. Issuing again supersedes the
//!    previous code, so at most one code is ever pending per address.
//! 2. `POST /v1/reset/verify` checks a submitted code. A matching,
//!    unexpired code is consumed atomically; racing submissions cannot both
//!    win and a consumed code never verifies again.
//! 3. `POST /v1/reset/complete` re-submits the address and code together
//!    with the new password. The pairing is re-checked against the consumed
//!    record before the credential store is updated, and the record is then
//!    closed so it cannot complete a second reset.
//!
//! Codes expire ten minutes after issuance. Mismatched, expired, and missing
//! codes are all reported to callers with one generic message; only
//! infrastructure failures (store, delivery, credential backend) surface
//! distinctly.
//!
//! Codes live in Postgres when a `--dsn` is configured, or in memory for
//! local development. Delivery goes through SMTP, an HTTP mail provider, or
//! the log, depending on configuration.

pub mod api;
pub mod cli;
pub mod credentials;
pub mod otp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
