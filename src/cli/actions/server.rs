use crate::{
    api,
    session::{TokenCodec, TokenConfig},
};
use anyhow::{Context, Result, anyhow, bail};
use secrecy::SecretString;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub access_lifetime: Duration,
    pub refresh_lifetime: Duration,
    pub leeway: Duration,
    pub storage_timeout: Option<Duration>,
}

impl Args {
    fn token_config(&self) -> TokenConfig {
        TokenConfig::new(
            self.access_secret.clone(),
            self.refresh_secret.clone(),
            self.access_lifetime,
            self.refresh_lifetime,
        )
        .with_leeway(self.leeway)
    }
}

/// Validate the DSN and return it with the password masked, for logging.
fn redacted_dsn(dsn: &str) -> Result<String> {
    let mut url = Url::parse(dsn).context("Invalid DSN")?;
    if !matches!(url.scheme(), "postgres" | "postgresql") {
        bail!("DSN must use the postgres scheme, got {}", url.scheme());
    }
    if url.password().is_some() {
        url.set_password(Some("****"))
            .map_err(|()| anyhow!("Error masking DSN password"))?;
    }
    Ok(url.to_string())
}

/// Execute the server action.
/// # Errors
/// Returns an error if the token configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    info!(dsn = %redacted_dsn(&args.dsn)?, port = args.port, "starting server");

    let codec = TokenCodec::new(&args.token_config()).context("Invalid token configuration")?;

    debug!(?codec, storage_timeout = ?args.storage_timeout, "token codec ready");

    let server_config = api::ServerConfig::new(args.port, args.dsn, codec)
        .with_storage_timeout(args.storage_timeout);

    api::new(server_config).await
}
