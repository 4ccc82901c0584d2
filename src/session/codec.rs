//! Compact HS256 tokens carrying a [`ClaimSet`].
//!
//! Tokens are `base64url(header).base64url(payload).base64url(mac)`. Access and
//! refresh tokens are keyed with independent secrets, and the header `kid`
//! names the kind, so a token of one kind never verifies as the other.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;
use std::{fmt, time::Duration};
use ulid::Ulid;

use super::{
    claims::{ClaimSet, Role},
    config::TokenConfig,
    error::{ConfigError, TokenError},
};

type HmacSha256 = Hmac<Sha256>;

const ALG: &str = "HS256";
const TYP: &str = "JWT";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
struct TokenHeader {
    alg: String,
    kid: String,
}

#[derive(Deserialize)]
struct TokenPayload {
    sub: i64,
    #[serde(default)]
    grp: Option<i64>,
    role: Role,
    #[serde(default)]
    name: String,
    exp: i64,
}

/// Issues and verifies access/refresh tokens. Immutable once built.
#[derive(Clone)]
pub struct TokenCodec {
    access_key: HmacSha256,
    refresh_key: HmacSha256,
    access_ttl: Duration,
    refresh_ttl: Duration,
    leeway_seconds: i64,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from validated configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the configuration is unusable; callers
    /// should treat it as fatal at startup.
    pub fn new(config: &TokenConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let key = |kind: TokenKind| {
            HmacSha256::new_from_slice(config.secret(kind).expose_secret().as_bytes())
                .map_err(|_| ConfigError::InvalidSecret(kind))
        };

        Ok(Self {
            access_key: key(TokenKind::Access)?,
            refresh_key: key(TokenKind::Refresh)?,
            access_ttl: config.lifetime(TokenKind::Access),
            refresh_ttl: config.lifetime(TokenKind::Refresh),
            leeway_seconds: seconds(config.leeway()),
        })
    }

    #[must_use]
    pub fn lifetime(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Absolute expiry for a token of `kind` issued at `now`.
    #[must_use]
    pub fn expires_at(&self, kind: TokenKind, now_unix_seconds: i64) -> i64 {
        now_unix_seconds.saturating_add(seconds(self.lifetime(kind)))
    }

    /// Sign `claims` into a token of `kind` that expires `lifetime(kind)` after `now`.
    #[must_use]
    pub fn issue(&self, claims: &ClaimSet, kind: TokenKind, now_unix_seconds: i64) -> String {
        let header = json!({ "alg": ALG, "typ": TYP, "kid": kind.as_str() });
        let payload = json!({
            "sub": claims.identity_id,
            "name": claims.display_name,
            "grp": claims.group_id,
            "role": claims.role.id(),
            "exp": self.expires_at(kind, now_unix_seconds),
            "iat": now_unix_seconds,
            "jti": Ulid::new().to_string(),
        });
        self.sign(kind, &header, &payload)
    }

    /// Verify `token` as a token of `kind` and return its claims.
    ///
    /// # Errors
    /// - [`TokenError::Malformed`] for structural damage, unreadable JSON,
    ///   missing or mistyped `sub`/`role`/`exp`, or a header naming another kind.
    /// - [`TokenError::InvalidSignature`] when the MAC does not verify under
    ///   the secret for `kind`.
    /// - [`TokenError::Expired`] when `exp + leeway <= now`.
    pub fn decode(
        &self,
        token: &str,
        kind: TokenKind,
        now_unix_seconds: i64,
    ) -> Result<ClaimSet, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(mac_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let mac_bytes =
            Base64UrlUnpadded::decode_vec(mac_b64).map_err(|_| TokenError::Malformed)?;
        let mut mac = self.key(kind).clone();
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&mac_bytes)
            .map_err(|_| TokenError::InvalidSignature)?;

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALG || header.kid != kind.as_str() {
            return Err(TokenError::Malformed);
        }

        let payload: TokenPayload = b64d_json(payload_b64)?;
        if payload.exp.saturating_add(self.leeway_seconds) <= now_unix_seconds {
            return Err(TokenError::Expired);
        }

        Ok(ClaimSet::new(
            payload.sub,
            payload.grp,
            payload.role,
            payload.name,
        ))
    }

    fn key(&self, kind: TokenKind) -> &HmacSha256 {
        match kind {
            TokenKind::Access => &self.access_key,
            TokenKind::Refresh => &self.refresh_key,
        }
    }

    fn sign(&self, kind: TokenKind, header: &Value, payload: &Value) -> String {
        let header_b64 = Base64UrlUnpadded::encode_string(header.to_string().as_bytes());
        let payload_b64 = Base64UrlUnpadded::encode_string(payload.to_string().as_bytes());
        let signing_input = format!("{header_b64}.{payload_b64}");

        let mut mac = self.key(kind).clone();
        mac.update(signing_input.as_bytes());
        let mac_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        format!("{signing_input}.{mac_b64}")
    }
}

fn b64d_json<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(segment).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

fn seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
