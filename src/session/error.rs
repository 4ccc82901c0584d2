use thiserror::Error;

use super::codec::TokenKind;

/// Startup-time configuration problems. Any of these aborts the process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} signing secret is empty")]
    EmptySecret(TokenKind),
    #[error("{0} signing secret cannot be used as an HMAC key")]
    InvalidSecret(TokenKind),
    #[error("{0} token lifetime must be greater than zero")]
    ZeroLifetime(TokenKind),
    #[error("refresh token lifetime must be longer than the access token lifetime")]
    RefreshNotLongerThanAccess,
    #[error("access and refresh tokens must use different signing secrets")]
    SharedSecret,
}

/// Reasons a presented token string is rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unsuccessful sign in")]
    UnsuccessfulSignIn,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("refresh token does not match the stored session")]
    StaleRefreshToken,
    #[error("session storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl SessionError {
    /// True for every outcome that should be answered as "unauthorized".
    /// Storage failures are infrastructure problems and return false.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}
