//! Sign-in and refresh flows.
//!
//! Flow Overview:
//! - `sign_in`: resolve credentials, mint an access/refresh pair from the
//!   identity's claims, and overwrite the stored refresh token.
//! - `refresh`: decode the presented refresh token, require it to match the
//!   stored one, mint a new pair from the *decoded* claims, and swap the stored
//!   token with a compare-and-swap so only one racing refresh wins.
//!
//! Security boundaries: the stored token is the single active session per
//! identity. Any earlier refresh token stops working as soon as a newer one is
//! stored, even though it still decodes.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{Span, debug, info, instrument, warn};
use utoipa::ToSchema;

use super::{
    claims::ClaimSet,
    clock::{Clock, SystemClock},
    codec::{TokenCodec, TokenKind},
    error::SessionError,
    identity::{Credentials, IdentityLookup},
    store::RefreshTokenStore,
};

/// Access and refresh tokens minted together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct SessionService {
    codec: TokenCodec,
    store: Arc<dyn RefreshTokenStore>,
    identities: Arc<dyn IdentityLookup>,
    clock: Arc<dyn Clock>,
    storage_timeout: Option<Duration>,
}

impl SessionService {
    #[must_use]
    pub fn new(
        codec: TokenCodec,
        store: Arc<dyn RefreshTokenStore>,
        identities: Arc<dyn IdentityLookup>,
    ) -> Self {
        Self {
            codec,
            store,
            identities,
            clock: Arc::new(SystemClock),
            storage_timeout: None,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Upper bound for each collaborator round-trip. Elapsed calls fail with
    /// [`SessionError::Storage`].
    #[must_use]
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = Some(timeout);
        self
    }

    /// Lifetime of refresh tokens, for cookie expiry at the boundary.
    #[must_use]
    pub fn refresh_token_lifetime(&self) -> Duration {
        self.codec.lifetime(TokenKind::Refresh)
    }

    /// Exchange credentials for a new token pair.
    ///
    /// # Errors
    /// - [`SessionError::UnsuccessfulSignIn`] when no identity matches.
    /// - [`SessionError::Storage`] when the lookup or the token upsert fails.
    #[instrument(skip_all, fields(identity_id))]
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<TokenPair, SessionError> {
        let Some(identity) = self
            .bounded(self.identities.resolve_by_credentials(credentials))
            .await?
        else {
            debug!("no identity matches the presented credentials");
            return Err(SessionError::UnsuccessfulSignIn);
        };
        Span::current().record("identity_id", identity.id);

        let pair = self.issue_pair(&identity.claims(), self.clock.now_unix_seconds());

        self.bounded(self.store.set(identity.id, &pair.refresh_token))
            .await?;

        info!("session started");
        Ok(pair)
    }

    /// Rotate a refresh token into a new token pair carrying the same claims.
    ///
    /// # Errors
    /// - [`SessionError::Token`] when the token fails to decode as a refresh token.
    /// - [`SessionError::StaleRefreshToken`] when it no longer matches the stored
    ///   token, including when a concurrent refresh rotated it first.
    /// - [`SessionError::Storage`] when the store fails.
    #[instrument(skip_all, fields(identity_id))]
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, SessionError> {
        let now = self.clock.now_unix_seconds();
        let claims = self
            .codec
            .decode(presented, TokenKind::Refresh, now)
            .inspect_err(|err| debug!("refresh token rejected: {err}"))?;
        let identity_id = claims.identity_id;
        Span::current().record("identity_id", identity_id);

        if !self
            .bounded(self.store.verify(identity_id, presented))
            .await?
        {
            warn!("refresh token does not match the stored session");
            return Err(SessionError::StaleRefreshToken);
        }

        let pair = self.issue_pair(&claims, now);

        if !self
            .bounded(
                self.store
                    .rotate(identity_id, presented, &pair.refresh_token),
            )
            .await?
        {
            warn!("refresh token was rotated concurrently");
            return Err(SessionError::StaleRefreshToken);
        }

        info!("session refreshed");
        Ok(pair)
    }

    /// Verify an access token and return its claims.
    ///
    /// # Errors
    /// Returns [`SessionError::Token`] when the token does not verify.
    pub fn authenticate(&self, access_token: &str) -> Result<ClaimSet, SessionError> {
        Ok(self.codec.decode(
            access_token,
            TokenKind::Access,
            self.clock.now_unix_seconds(),
        )?)
    }

    fn issue_pair(&self, claims: &ClaimSet, now: i64) -> TokenPair {
        TokenPair {
            access_token: self.codec.issue(claims, TokenKind::Access, now),
            refresh_token: self.codec.issue(claims, TokenKind::Refresh, now),
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, SessionError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let result = match self.storage_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                SessionError::Storage(anyhow!("storage call timed out after {limit:?}"))
            })?,
            None => call.await,
        };
        result.map_err(SessionError::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{
        claims::Role,
        clock::ManualClock,
        config::TokenConfig,
        error::TokenError,
        identity::Identity,
        store::MemoryRefreshTokenStore,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use secrecy::{ExposeSecret, SecretString};
    use std::collections::HashMap;

    const T0: i64 = 1_700_000_000;
    const ACCESS_TTL: u64 = 15 * 60;
    const REFRESH_TTL: u64 = 7 * 24 * 60 * 60;

    struct StaticIdentities(HashMap<(String, String), Identity>);

    impl StaticIdentities {
        fn with_subject() -> Self {
            let mut users = HashMap::new();
            users.insert(
                ("jane@example.com".to_string(), "pw".to_string()),
                Identity {
                    id: 42,
                    group_id: Some(7),
                    role: Role::Subject,
                    display_name: "Doe Jane".to_string(),
                },
            );
            Self(users)
        }
    }

    #[async_trait]
    impl IdentityLookup for StaticIdentities {
        async fn resolve_by_credentials(
            &self,
            credentials: &Credentials,
        ) -> Result<Option<Identity>> {
            let key = (
                credentials.email.clone(),
                credentials.password.expose_secret().to_string(),
            );
            Ok(self.0.get(&key).cloned())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl RefreshTokenStore for FailingStore {
        async fn set(&self, _identity_id: i64, _token: &str) -> Result<()> {
            Err(anyhow!("connection refused"))
        }

        async fn verify(&self, _identity_id: i64, _token: &str) -> Result<bool> {
            Err(anyhow!("connection refused"))
        }

        async fn rotate(
            &self,
            _identity_id: i64,
            _current: &str,
            _replacement: &str,
        ) -> Result<bool> {
            Err(anyhow!("connection refused"))
        }
    }

    struct StalledStore;

    #[async_trait]
    impl RefreshTokenStore for StalledStore {
        async fn set(&self, _identity_id: i64, _token: &str) -> Result<()> {
            std::future::pending().await
        }

        async fn verify(&self, _identity_id: i64, _token: &str) -> Result<bool> {
            std::future::pending().await
        }

        async fn rotate(
            &self,
            _identity_id: i64,
            _current: &str,
            _replacement: &str,
        ) -> Result<bool> {
            std::future::pending().await
        }
    }

    fn codec() -> TokenCodec {
        let config = TokenConfig::new(
            SecretString::from("access-secret"),
            SecretString::from("refresh-secret"),
            Duration::from_secs(ACCESS_TTL),
            Duration::from_secs(REFRESH_TTL),
        );
        match TokenCodec::new(&config) {
            Ok(codec) => codec,
            Err(err) => panic!("test config rejected: {err}"),
        }
    }

    fn service_with(store: Arc<dyn RefreshTokenStore>, clock: Arc<ManualClock>) -> SessionService {
        SessionService::new(codec(), store, Arc::new(StaticIdentities::with_subject()))
            .with_clock(clock)
    }

    fn service(clock: Arc<ManualClock>) -> SessionService {
        service_with(Arc::new(MemoryRefreshTokenStore::new()), clock)
    }

    fn jane() -> Credentials {
        Credentials::new("jane@example.com", SecretString::from("pw"))
    }

    #[tokio::test]
    async fn sign_in_issues_pair_with_identity_claims() -> Result<()> {
        let clock = Arc::new(ManualClock::new(T0));
        let service = service(clock.clone());
        let codec = codec();

        let pair = service.sign_in(&jane()).await?;

        let access = codec.decode(&pair.access_token, TokenKind::Access, T0)?;
        let refresh = codec.decode(&pair.refresh_token, TokenKind::Refresh, T0)?;
        assert_eq!(access, refresh);
        assert_eq!(access.identity_id, 42);
        assert_eq!(access.group_id, Some(7));
        assert_eq!(access.role, Role::Subject);
        assert_eq!(access.display_name, "Doe Jane");

        let access_ttl = i64::try_from(ACCESS_TTL)?;
        let refresh_ttl = i64::try_from(REFRESH_TTL)?;
        assert!(codec.decode(&pair.access_token, TokenKind::Access, T0 + access_ttl - 1).is_ok());
        assert_eq!(
            codec.decode(&pair.access_token, TokenKind::Access, T0 + access_ttl),
            Err(TokenError::Expired)
        );
        assert!(
            codec
                .decode(&pair.refresh_token, TokenKind::Refresh, T0 + refresh_ttl - 1)
                .is_ok()
        );
        assert_eq!(
            codec.decode(&pair.refresh_token, TokenKind::Refresh, T0 + refresh_ttl),
            Err(TokenError::Expired)
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_credentials_are_unsuccessful() {
        let service = service(Arc::new(ManualClock::new(T0)));
        let wrong_password = Credentials::new("jane@example.com", SecretString::from("nope"));
        let unknown_user = Credentials::new("who@example.com", SecretString::from("pw"));

        assert!(matches!(
            service.sign_in(&wrong_password).await,
            Err(SessionError::UnsuccessfulSignIn)
        ));
        assert!(matches!(
            service.sign_in(&unknown_user).await,
            Err(SessionError::UnsuccessfulSignIn)
        ));
    }

    #[tokio::test]
    async fn refresh_reanchors_expiry_and_keeps_claims() -> Result<()> {
        let clock = Arc::new(ManualClock::new(T0));
        let service = service(clock.clone());
        let codec = codec();

        let first = service.sign_in(&jane()).await?;
        clock.set(T0 + 1);
        let second = service.refresh(&first.refresh_token).await?;

        let before = codec.decode(&first.refresh_token, TokenKind::Refresh, T0)?;
        let after = codec.decode(&second.refresh_token, TokenKind::Refresh, T0 + 1)?;
        assert_eq!(before, after);
        assert_eq!(codec.decode(&second.access_token, TokenKind::Access, T0 + 1)?, before);

        // Expiries are anchored at T0 + 1: valid one second past the first pair's expiry.
        let access_ttl = i64::try_from(ACCESS_TTL)?;
        assert_eq!(
            codec.decode(&first.access_token, TokenKind::Access, T0 + access_ttl),
            Err(TokenError::Expired)
        );
        assert!(codec.decode(&second.access_token, TokenKind::Access, T0 + access_ttl).is_ok());
        assert_eq!(
            codec.decode(&second.access_token, TokenKind::Access, T0 + 1 + access_ttl),
            Err(TokenError::Expired)
        );
        Ok(())
    }

    #[tokio::test]
    async fn refresh_keeps_claims_from_token_not_identity_store() -> Result<()> {
        let clock = Arc::new(ManualClock::new(T0));
        let store: Arc<dyn RefreshTokenStore> = Arc::new(MemoryRefreshTokenStore::new());
        let codec = codec();

        // A token minted before the identity changed role still refreshes into the old role.
        let stale_claims = ClaimSet::new(42, None, Role::Supervisor, "Doe Jane".to_string());
        let refresh_token = codec.issue(&stale_claims, TokenKind::Refresh, T0);
        store.set(42, &refresh_token).await?;

        let service = service_with(store, clock);
        let pair = service.refresh(&refresh_token).await?;
        assert_eq!(
            codec.decode(&pair.access_token, TokenKind::Access, T0)?,
            stale_claims
        );
        Ok(())
    }

    #[tokio::test]
    async fn superseded_refresh_token_is_stale() -> Result<()> {
        let service = service(Arc::new(ManualClock::new(T0)));

        let r1 = service.sign_in(&jane()).await?.refresh_token;
        let r2 = service.refresh(&r1).await?.refresh_token;

        assert!(matches!(
            service.refresh(&r1).await,
            Err(SessionError::StaleRefreshToken)
        ));
        assert!(service.refresh(&r2).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn second_sign_in_ends_first_session() -> Result<()> {
        let service = service(Arc::new(ManualClock::new(T0)));

        let ra = service.sign_in(&jane()).await?.refresh_token;
        let rb = service.sign_in(&jane()).await?.refresh_token;
        assert_ne!(ra, rb);

        assert!(matches!(
            service.refresh(&ra).await,
            Err(SessionError::StaleRefreshToken)
        ));
        assert!(service.refresh(&rb).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn never_stored_refresh_token_is_stale() -> Result<()> {
        let service = service(Arc::new(ManualClock::new(T0)));
        let claims = ClaimSet::new(42, Some(7), Role::Subject, String::new());
        let forged_by_insider = codec().issue(&claims, TokenKind::Refresh, T0);

        assert!(matches!(
            service.refresh(&forged_by_insider).await,
            Err(SessionError::StaleRefreshToken)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_propagates_decode_failures() -> Result<()> {
        let clock = Arc::new(ManualClock::new(T0));
        let service = service(clock.clone());
        let pair = service.sign_in(&jane()).await?;

        assert!(matches!(
            service.refresh(&pair.access_token).await,
            Err(SessionError::Token(TokenError::InvalidSignature))
        ));
        assert!(matches!(
            service.refresh("not-a-token").await,
            Err(SessionError::Token(TokenError::Malformed))
        ));

        clock.set(T0 + i64::try_from(REFRESH_TTL)?);
        assert!(matches!(
            service.refresh(&pair.refresh_token).await,
            Err(SessionError::Token(TokenError::Expired))
        ));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_refreshes_have_exactly_one_winner() -> Result<()> {
        let service = service(Arc::new(ManualClock::new(T0)));
        let r1 = service.sign_in(&jane()).await?.refresh_token;

        let (left, right) = tokio::join!(
            tokio::spawn({
                let service = service.clone();
                let r1 = r1.clone();
                async move { service.refresh(&r1).await }
            }),
            tokio::spawn({
                let service = service.clone();
                let r1 = r1.clone();
                async move { service.refresh(&r1).await }
            }),
        );
        let outcomes = [left?, right?];

        let successes = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        let stale = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Err(SessionError::StaleRefreshToken)))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(stale, 1);
        Ok(())
    }

    #[tokio::test]
    async fn storage_failures_are_not_auth_failures() {
        let service = service_with(Arc::new(FailingStore), Arc::new(ManualClock::new(T0)));

        let result = service.sign_in(&jane()).await;
        assert!(matches!(result, Err(SessionError::Storage(_))));

        let claims = ClaimSet::new(42, Some(7), Role::Subject, String::new());
        let token = codec().issue(&claims, TokenKind::Refresh, T0);
        let result = service.refresh(&token).await;
        assert!(matches!(result, Err(SessionError::Storage(_))));
    }

    #[tokio::test]
    async fn storage_timeout_bounds_the_call() {
        let service = service_with(Arc::new(StalledStore), Arc::new(ManualClock::new(T0)))
            .with_storage_timeout(Duration::from_millis(50));

        let result = service.sign_in(&jane()).await;
        assert!(matches!(result, Err(SessionError::Storage(_))));
    }

    #[tokio::test]
    async fn authenticate_accepts_only_access_tokens() -> Result<()> {
        let service = service(Arc::new(ManualClock::new(T0)));
        let pair = service.sign_in(&jane()).await?;

        let claims = service.authenticate(&pair.access_token)?;
        assert_eq!(claims.identity_id, 42);
        assert!(matches!(
            service.authenticate(&pair.refresh_token),
            Err(SessionError::Token(TokenError::InvalidSignature))
        ));
        Ok(())
    }

    #[test]
    fn exposes_refresh_lifetime() {
        let service = service(Arc::new(ManualClock::new(T0)));
        assert_eq!(
            service.refresh_token_lifetime(),
            Duration::from_secs(REFRESH_TTL)
        );
    }
}
