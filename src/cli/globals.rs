use anyhow::{anyhow, Result};
use secrecy::SecretString;
use url::Url;

/// Delivery and frontend settings shared by every action.
#[derive(Clone)]
pub struct GlobalArgs {
    pub smtp: Option<SmtpArgs>,
    pub mail_api_url: Option<Url>,
    pub frontend_url: Option<String>,
}

#[derive(Clone)]
pub struct SmtpArgs {
    pub host: String,
    pub username: String,
    pub password: SecretString,
    pub from: String,
}

impl GlobalArgs {
    /// Collect delivery settings from parsed arguments.
    ///
    /// # Errors
    /// Returns an error when the SMTP settings are incomplete or the mail
    /// API URL does not parse.
    pub fn from_matches(matches: &clap::ArgMatches) -> Result<Self> {
        let smtp = match matches.get_one::<String>("smtp-host") {
            Some(host) => Some(SmtpArgs {
                host: host.to_string(),
                username: matches
                    .get_one::<String>("smtp-username")
                    .map(ToString::to_string)
                    .ok_or_else(|| anyhow!("missing required argument: --smtp-username"))?,
                password: matches
                    .get_one::<String>("smtp-password")
                    .map(|password| SecretString::from(password.to_string()))
                    .ok_or_else(|| anyhow!("missing required argument: --smtp-password"))?,
                from: matches
                    .get_one::<String>("smtp-from")
                    .map(ToString::to_string)
                    .ok_or_else(|| anyhow!("missing required argument: --smtp-from"))?,
            }),
            None => None,
        };

        let mail_api_url = matches
            .get_one::<String>("mail-api-url")
            .map(|raw| Url::parse(raw))
            .transpose()
            .map_err(|err| anyhow!("invalid mail API URL: {err}"))?;

        let frontend_url = matches
            .get_one::<String>("frontend-url")
            .map(ToString::to_string);

        Ok(Self {
            smtp,
            mail_api_url,
            frontend_url,
        })
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("smtp", &self.smtp)
            .field("mail_api_url", &self.mail_api_url)
            .field("frontend_url", &self.frontend_url)
            .finish()
    }
}

impl std::fmt::Debug for SmtpArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpArgs")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .field("from", &self.from)
            .finish()
    }
}
