//! Session tokens: issuance, verification, and refresh-token rotation.
//!
//! [`SessionService`] is the entry point. It owns a [`TokenCodec`] and two
//! collaborators, a [`RefreshTokenStore`] and an [`IdentityLookup`], both
//! behind `Arc<dyn _>` so Postgres adapters and in-memory fakes are
//! interchangeable.

mod claims;
mod clock;
mod codec;
mod config;
mod error;
mod identity;
mod service;
mod storage;
mod store;

pub use claims::{ClaimSet, Role};
pub use clock::{Clock, SystemClock};
pub use codec::{TokenCodec, TokenKind};
pub use config::TokenConfig;
pub use error::{ConfigError, SessionError, TokenError};
pub use identity::{Credentials, Identity, IdentityLookup, display_name};
pub use service::{SessionService, TokenPair};
pub use storage::{PgIdentityLookup, PgRefreshTokenStore};
pub use store::{MemoryRefreshTokenStore, RefreshTokenStore};

#[cfg(test)]
pub(crate) use clock::ManualClock;
