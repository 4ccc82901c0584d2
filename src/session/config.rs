use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use super::{codec::TokenKind, error::ConfigError};

const DEFAULT_LEEWAY_SECONDS: u64 = 0;

/// Signing secrets and lifetimes for both token kinds.
#[derive(Clone, Debug)]
pub struct TokenConfig {
    access_secret: SecretString,
    refresh_secret: SecretString,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
    leeway: Duration,
}

impl TokenConfig {
    #[must_use]
    pub fn new(
        access_secret: SecretString,
        refresh_secret: SecretString,
        access_lifetime: Duration,
        refresh_lifetime: Duration,
    ) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_lifetime,
            refresh_lifetime,
            leeway: Duration::from_secs(DEFAULT_LEEWAY_SECONDS),
        }
    }

    /// Clock skew tolerated when checking `exp`.
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    #[must_use]
    pub fn lifetime(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_lifetime,
            TokenKind::Refresh => self.refresh_lifetime,
        }
    }

    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    pub(super) fn secret(&self, kind: TokenKind) -> &SecretString {
        match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
        }
    }

    /// Reject configurations that would make tokens forgeable or useless.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in [TokenKind::Access, TokenKind::Refresh] {
            if self.secret(kind).expose_secret().is_empty() {
                return Err(ConfigError::EmptySecret(kind));
            }
            if self.lifetime(kind).as_secs() == 0 {
                return Err(ConfigError::ZeroLifetime(kind));
            }
        }

        // Tokens carry whole seconds, so compare what will actually be issued.
        if self.refresh_lifetime.as_secs() <= self.access_lifetime.as_secs() {
            return Err(ConfigError::RefreshNotLongerThanAccess);
        }

        if self.access_secret.expose_secret() == self.refresh_secret.expose_secret() {
            return Err(ConfigError::SharedSecret);
        }

        Ok(())
    }
}
