//! # Tessera (session tokens)
//!
//! `tessera` issues short-lived access tokens and long-lived refresh tokens for
//! authenticated identities, and enforces a single active session per identity.
//!
//! ## Tokens
//!
//! Both kinds are compact HS256 tokens carrying the same claims: identity id,
//! optional group id, role, display name, and expiry. Access and refresh tokens
//! are signed with independent secrets, so one kind never verifies as the other.
//!
//! ## Sessions
//!
//! Every sign-in and every refresh stores the newly minted refresh token for the
//! identity, replacing the previous one. A refresh token is honoured only while
//! it is the stored one; presenting it a second time fails. Only a digest of the
//! refresh token is persisted.

pub mod api;
pub mod cli;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
