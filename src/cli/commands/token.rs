use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_ACCESS_SECRET: &str = "access-secret";
pub const ARG_REFRESH_SECRET: &str = "refresh-secret";
pub const ARG_ACCESS_LIFETIME: &str = "access-lifetime-seconds";
pub const ARG_REFRESH_LIFETIME: &str = "refresh-lifetime-seconds";
pub const ARG_LEEWAY: &str = "leeway-seconds";
pub const ARG_STORAGE_TIMEOUT: &str = "storage-timeout-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_SECRET)
                .long(ARG_ACCESS_SECRET)
                .help("HMAC secret for access tokens")
                .env("TESSERA_ACCESS_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_SECRET)
                .long(ARG_REFRESH_SECRET)
                .help("HMAC secret for refresh tokens, must differ from the access secret")
                .env("TESSERA_REFRESH_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_LIFETIME)
                .long(ARG_ACCESS_LIFETIME)
                .help("Access token lifetime in seconds")
                .env("TESSERA_ACCESS_LIFETIME_SECONDS")
                .required(true)
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_LIFETIME)
                .long(ARG_REFRESH_LIFETIME)
                .help("Refresh token lifetime in seconds, must exceed the access lifetime")
                .env("TESSERA_REFRESH_LIFETIME_SECONDS")
                .required(true)
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_LEEWAY)
                .long(ARG_LEEWAY)
                .help("Clock skew tolerated when checking expiry, in seconds")
                .env("TESSERA_LEEWAY_SECONDS")
                .default_value("0")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_STORAGE_TIMEOUT)
                .long(ARG_STORAGE_TIMEOUT)
                .help("Timeout for each storage call in seconds, 0 disables it")
                .env("TESSERA_STORAGE_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub access_lifetime: Duration,
    pub refresh_lifetime: Duration,
    pub leeway: Duration,
    pub storage_timeout: Option<Duration>,
}

impl Options {
    /// Parse token arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let secret = |id: &str| match matches.get_one::<String>(id) {
            Some(value) if !value.trim().is_empty() => Ok(SecretString::from(value.clone())),
            _ => Err(anyhow::anyhow!("missing required argument: --{id}")),
        };
        let seconds = |id: &str| {
            matches
                .get_one::<u64>(id)
                .copied()
                .map(Duration::from_secs)
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let storage_timeout = seconds(ARG_STORAGE_TIMEOUT)?;

        Ok(Self {
            access_secret: secret(ARG_ACCESS_SECRET)?,
            refresh_secret: secret(ARG_REFRESH_SECRET)?,
            access_lifetime: seconds(ARG_ACCESS_LIFETIME)?,
            refresh_lifetime: seconds(ARG_REFRESH_LIFETIME)?,
            leeway: seconds(ARG_LEEWAY)?,
            storage_timeout: (!storage_timeout.is_zero()).then_some(storage_timeout),
        })
    }
}
