use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

use super::claims::{ClaimSet, Role};

/// Sign-in credentials as presented by the client.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            email: email.into(),
            password,
        }
    }
}

/// Attributes of a resolved identity that end up in the token claims.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub group_id: Option<i64>,
    pub role: Role,
    pub display_name: String,
}

impl Identity {
    #[must_use]
    pub fn claims(&self) -> ClaimSet {
        ClaimSet::new(self.id, self.group_id, self.role, self.display_name.clone())
    }
}

/// Resolves credentials to an identity.
///
/// `Ok(None)` means "no identity matches"; it must not reveal whether the
/// login or the password was wrong. `Err` is reserved for infrastructure failures.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn resolve_by_credentials(&self, credentials: &Credentials) -> Result<Option<Identity>>;
}

/// Display name as `last first [middle]`.
#[must_use]
pub fn display_name(first_name: &str, last_name: &str, middle_name: Option<&str>) -> String {
    [Some(last_name), Some(first_name), middle_name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
