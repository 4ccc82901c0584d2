//! Postgres adapters for the session collaborators.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{
    claims::Role,
    identity::{Credentials, Identity, IdentityLookup, display_name},
    store::{RefreshTokenStore, hash_refresh_token},
};

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

/// Refresh-token records in the `user_token` table, keyed by `user_id`.
///
/// Every operation is a single statement, so a cancelled call leaves either
/// the previous record or the complete new one.
#[derive(Clone, Debug)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn set(&self, identity_id: i64, token: &str) -> Result<()> {
        let query = r"
            INSERT INTO user_token (user_id, refresh_hash, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET refresh_hash = EXCLUDED.refresh_hash, updated_at = NOW()
        ";
        sqlx::query(query)
            .bind(identity_id)
            .bind(hash_refresh_token(token))
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to store refresh token")?;

        Ok(())
    }

    async fn verify(&self, identity_id: i64, token: &str) -> Result<bool> {
        let query = "SELECT 1 FROM user_token WHERE user_id = $1 AND refresh_hash = $2";
        let row = sqlx::query(query)
            .bind(identity_id)
            .bind(hash_refresh_token(token))
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to verify refresh token")?;

        Ok(row.is_some())
    }

    async fn rotate(&self, identity_id: i64, current: &str, replacement: &str) -> Result<bool> {
        // The row lock taken by UPDATE serializes racing rotations; the loser
        // re-evaluates the WHERE clause against the winner's hash and matches nothing.
        let query = r"
            UPDATE user_token
            SET refresh_hash = $3, updated_at = NOW()
            WHERE user_id = $1 AND refresh_hash = $2
        ";
        let result = sqlx::query(query)
            .bind(identity_id)
            .bind(hash_refresh_token(current))
            .bind(hash_refresh_token(replacement))
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to rotate refresh token")?;

        Ok(result.rows_affected() == 1)
    }
}

/// Identity lookup against the `"user"` table.
///
/// Passwords are compared as stored by the user service; credential policy
/// lives there, not here.
#[derive(Clone, Debug)]
pub struct PgIdentityLookup {
    pool: PgPool,
}

impl PgIdentityLookup {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityLookup for PgIdentityLookup {
    async fn resolve_by_credentials(&self, credentials: &Credentials) -> Result<Option<Identity>> {
        let query = r#"
            SELECT id, group_id, role_id, first_name, last_name, middle_name
            FROM "user"
            WHERE email = $1 AND password = $2
        "#;
        let row = sqlx::query(query)
            .bind(&credentials.email)
            .bind(credentials.password.expose_secret())
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user by credentials")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row.try_get("id")?;
        let role_id: i64 = row.try_get("role_id")?;
        let role = Role::from_id(role_id)
            .ok_or_else(|| anyhow!("user {id} has unknown role id {role_id}"))?;
        let first_name: String = row.try_get("first_name")?;
        let last_name: String = row.try_get("last_name")?;
        let middle_name: Option<String> = row.try_get("middle_name")?;

        Ok(Some(Identity {
            id,
            group_id: row.try_get("group_id")?,
            role,
            display_name: display_name(&first_name, &last_name, middle_name.as_deref()),
        }))
    }
}
