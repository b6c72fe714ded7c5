use crate::api;
use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::{Context, Result};
use url::Url;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port, dsn } => {
            // Fail on a malformed connection string before touching the pool.
            if let Some(dsn) = &dsn {
                Url::parse(dsn).context("Invalid database connection string")?;
            }

            api::serve(port, dsn, globals).await?;
        }
    }

    Ok(())
}
