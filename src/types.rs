use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Server-assigned user identifier (JWT `sub` claim).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl UserId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Token identifier (JWT `jti` claim). Used by the server for revocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct TokenId(pub String);

/// Opaque bearer credential issued by the server.
///
/// Never mutated by the client. `Debug` is redacted so tokens do not end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct BearerToken(String);

impl BearerToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BearerToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// User record as returned by `GET /user/get/{id}`.
///
/// Cached client-side as the session profile for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UserRecord {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    /// Calendar date, `YYYY-MM-DD`.
    pub birthdate: String,
    #[serde(default)]
    pub biography: String,
    pub city: String,
    pub username: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<time::OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<time::OffsetDateTime>,
}

impl UserRecord {
    /// Create a record with the required fields; timestamps and biography start empty.
    #[must_use]
    pub fn new(
        id: impl Into<UserId>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        birthdate: impl Into<String>,
        city: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            birthdate: birthdate.into(),
            biography: String::new(),
            city: city.into(),
            username: username.into(),
            created_at: None,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn with_biography(mut self, biography: impl Into<String>) -> Self {
        self.biography = biography.into();
        self
    }

    #[must_use]
    pub fn with_created_at(mut self, at: time::OffsetDateTime) -> Self {
        self.created_at = Some(at);
        self
    }
}

/// Body of `POST /user/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterUser {
    pub first_name: String,
    pub last_name: String,
    pub birthdate: String,
    pub biography: String,
    pub city: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct RegisterResponse {
    #[serde(alias = "id")]
    pub user_id: UserId,
}

/// Body of `POST /login`.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct LoginResponse {
    #[serde(alias = "id")]
    pub user_id: UserId,
    pub token: BearerToken,
}
