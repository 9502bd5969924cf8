//! Caller identity as asserted by the upstream authentication proxy.
//!
//! Session handling lives with the identity provider. By the time a request reaches this
//! service the proxy has stripped any client-supplied identity headers and replaced them with
//! `x-user-id` and `x-user-role`.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Identifier wrapper for platform users.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// Authenticated principal making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role: Role::User,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners act on their own records; admins act on anyone's.
    pub fn may_act_for(&self, owner: &UserId) -> bool {
        self.is_admin() || &self.user_id == owner
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, IdentityError> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(IdentityError::MissingIdentity)?;

        let role = match headers
            .get(USER_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_ascii_lowercase())
        {
            None => Role::User,
            Some(role) if role == "user" => Role::User,
            Some(role) if role == "admin" => Role::Admin,
            Some(_) => return Err(IdentityError::UnknownRole),
        };

        Ok(Self {
            user_id: UserId::new(user_id),
            role,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("missing caller identity")]
    MissingIdentity,
    #[error("unrecognized caller role")]
    UnknownRole,
}
