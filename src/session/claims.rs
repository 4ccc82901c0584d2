//! Identity attributes carried inside access and refresh tokens.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Role of an authenticated identity, encoded on the wire as a small integer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Role {
    Administrator,
    Supervisor,
    Subject,
}

impl Role {
    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Administrator => 1,
            Self::Supervisor => 2,
            Self::Subject => 3,
        }
    }

    #[must_use]
    pub const fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::Administrator),
            2 => Some(Self::Supervisor),
            3 => Some(Self::Subject),
            _ => None,
        }
    }
}

impl TryFrom<i64> for Role {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_id(value).ok_or_else(|| format!("unknown role id: {value}"))
    }
}

impl From<Role> for i64 {
    fn from(role: Role) -> Self {
        role.id()
    }
}

/// Claims shared by both token kinds.
///
/// Field names follow the compact wire names so the struct serializes directly
/// into the token payload.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClaimSet {
    #[serde(rename = "sub")]
    pub identity_id: i64,
    #[serde(rename = "grp")]
    pub group_id: Option<i64>,
    #[schema(value_type = i64)]
    pub role: Role,
    #[serde(rename = "name", default)]
    pub display_name: String,
}

impl ClaimSet {
    #[must_use]
    pub fn new(identity_id: i64, group_id: Option<i64>, role: Role, display_name: String) -> Self {
        Self {
            identity_id,
            group_id,
            role,
            display_name,
        }
    }
}
