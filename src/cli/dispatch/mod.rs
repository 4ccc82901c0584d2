//! Map validated CLI arguments to an action.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::token;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let token_opts = token::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        access_secret: token_opts.access_secret,
        refresh_secret: token_opts.refresh_secret,
        access_lifetime: token_opts.access_lifetime,
        refresh_lifetime: token_opts.refresh_lifetime,
        leeway: token_opts.leeway,
        storage_timeout: token_opts.storage_timeout,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::time::Duration;

    #[test]
    fn server_action_from_env() {
        temp_env::with_vars(
            [
                ("TESSERA_PORT", Some("9000")),
                ("TESSERA_DSN", Some("postgres://user@localhost:5432/tessera")),
                ("TESSERA_ACCESS_SECRET", Some("access")),
                ("TESSERA_REFRESH_SECRET", Some("refresh")),
                ("TESSERA_ACCESS_LIFETIME_SECONDS", Some("900")),
                ("TESSERA_REFRESH_LIFETIME_SECONDS", Some("86400")),
                ("TESSERA_LEEWAY_SECONDS", None),
                ("TESSERA_STORAGE_TIMEOUT_SECONDS", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["tessera"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.port, 9000);
                    assert_eq!(args.dsn, "postgres://user@localhost:5432/tessera");
                    assert_eq!(args.access_secret.expose_secret(), "access");
                    assert_eq!(args.refresh_secret.expose_secret(), "refresh");
                    assert_eq!(args.refresh_lifetime, Duration::from_secs(86_400));
                    assert_eq!(args.storage_timeout, Some(Duration::from_secs(5)));
                }
            },
        );
    }

    #[test]
    fn blank_secret_from_env_is_rejected() {
        temp_env::with_vars(
            [
                ("TESSERA_DSN", Some("postgres://user@localhost:5432/tessera")),
                ("TESSERA_ACCESS_SECRET", Some("  ")),
                ("TESSERA_REFRESH_SECRET", Some("refresh")),
                ("TESSERA_ACCESS_LIFETIME_SECONDS", Some("900")),
                ("TESSERA_REFRESH_LIFETIME_SECONDS", Some("86400")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["tessera"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(
                        err.to_string()
                            .contains("missing required argument: --access-secret")
                    );
                }
            },
        );
    }
}
