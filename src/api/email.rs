//! Reset-code delivery abstractions.
//!
//! `request_code` hands every issued code to a [`CodeSender`]. The sender
//! decides how to deliver (SMTP, HTTP mail API) and returns `Ok`/`Err`; a
//! delivery failure is reported to the caller distinctly but never rolls
//! back issuance, so a resend is simply a fresh request.
//!
//! The default sender for local dev is [`LogCodeSender`], which logs the
//! code and returns `Ok(())`. Senders are constructed from CLI configuration
//! and injected; nothing reads transport settings from ambient process
//! state, which is also what lets tests substitute a failing gateway.

use crate::APP_USER_AGENT;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;
use tracing::info;
use url::Url;

const SUBJECT: &str = "Password reset code";

// Transport-level ceiling; the service applies its own deadline on top.
const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct CodeEmail {
    pub to_email: String,
    pub code: String,
}

/// Delivery abstraction for reset codes.
#[async_trait]
pub trait CodeSender: Send + Sync {
    /// Deliver the code or return an error so the caller can report the
    /// failure without unwinding the issuance.
    async fn send(&self, message: &CodeEmail) -> Result<()>;
}

/// Local dev sender that logs the code instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogCodeSender;

#[async_trait]
impl CodeSender for LogCodeSender {
    async fn send(&self, message: &CodeEmail) -> Result<()> {
        info!(
            to_email = %message.to_email,
            code = %message.code,
            "reset code send stub"
        );
        Ok(())
    }
}

/// SMTP sender over implicit TLS with a bounded transport timeout.
pub struct SmtpCodeSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpCodeSender {
    /// # Errors
    /// Returns an error if the relay host cannot be configured.
    pub fn new(
        host: &str,
        username: String,
        password: &SecretString,
        from: String,
    ) -> Result<Self> {
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .context("failed to configure smtp relay")?
            .credentials(Credentials::new(
                username,
                password.expose_secret().to_string(),
            ))
            .timeout(Some(TRANSPORT_TIMEOUT))
            .build();

        Ok(Self { mailer, from })
    }
}

#[async_trait]
impl CodeSender for SmtpCodeSender {
    async fn send(&self, message: &CodeEmail) -> Result<()> {
        let email = Message::builder()
            .from(self.from.parse().context("invalid sender address")?)
            .to(message
                .to_email
                .parse()
                .context("invalid recipient address")?)
            .subject(SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(format!(
                "Your password reset code is {}. It expires in 10 minutes.\n\
                 If you did not request a reset, ignore this message.\n",
                message.code
            ))
            .context("failed to build reset email")?;

        self.mailer
            .send(email)
            .await
            .context("failed to send reset email")?;

        Ok(())
    }
}

/// Sender for HTTP mail providers; posts the address and code as JSON and
/// treats any non-success status as a delivery failure.
pub struct HttpCodeSender {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpCodeSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(TRANSPORT_TIMEOUT)
            .build()
            .context("failed to build mail api client")?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl CodeSender for HttpCodeSender {
    async fn send(&self, message: &CodeEmail) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({
                "to": message.to_email,
                "code": message.code,
            }))
            .send()
            .await
            .context("mail api request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("mail api returned {}", response.status()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn message() -> CodeEmail {
        CodeEmail {
            to_email: "alice@example.com".to_string(),
            code: "042017".to_string(),
        }
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() -> Result<()> {
        LogCodeSender.send(&message()).await
    }

    #[tokio::test]
    async fn smtp_sender_rejects_a_bad_from_address() -> Result<()> {
        let sender = SmtpCodeSender::new(
            "smtp.example.com",
            "mailer".to_string(),
            &SecretString::from("secret".to_string()),
            "not an address".to_string(),
        )?;

        // Fails while building the message, before any network traffic.
        assert!(sender.send(&message()).await.is_err());
        Ok(())
    }

    #[test]
    fn http_sender_builds_from_an_endpoint() -> Result<()> {
        let endpoint = Url::parse("https://mail.example.com/v1/send")?;
        let _sender = HttpCodeSender::new(endpoint)?;
        Ok(())
    }
}
