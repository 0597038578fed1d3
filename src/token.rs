use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{TokenId, UserId};

/// Claims carried by a session token.
///
/// Persisted alongside the token so that a restored session does not need to
/// decode it again. Field names on disk follow the shape the web client has
/// always written (`userId`, `tokenId`, `permissions`, `exp`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct DecodedClaims {
    #[serde(rename = "userId")]
    pub subject_id: UserId,
    #[serde(rename = "tokenId", default)]
    pub token_id: Option<TokenId>,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Expiry in seconds since the Unix epoch.
    #[serde(rename = "exp", default)]
    pub expires_at: Option<i64>,
}

impl DecodedClaims {
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Whether `exp` lies at or before `now` (seconds since epoch).
    ///
    /// A token without `exp` never expires from the client's point of view.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(time::OffsetDateTime::now_utc().unix_timestamp())
    }
}

#[derive(Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    jti: Option<ClaimId>,
    #[serde(default)]
    permissions: serde_json::Value,
    #[serde(default)]
    exp: Option<serde_json::Number>,
}

/// `jti` is a string in most issuers, an integer serial in ours.
#[derive(Deserialize)]
#[serde(untagged)]
enum ClaimId {
    Text(String),
    Number(serde_json::Number),
}

impl From<ClaimId> for TokenId {
    fn from(id: ClaimId) -> Self {
        match id {
            ClaimId::Text(s) => Self(s),
            ClaimId::Number(n) => Self(n.to_string()),
        }
    }
}

/// Decodes the claims of a JWT without verifying its signature.
///
/// The server is the only party that checks authenticity; the client reads
/// the payload purely to learn who it is logged in as.
///
/// # Errors
///
/// Returns [`Error::MalformedToken`] if the token is not a three-segment JWS,
/// the payload is not base64url JSON, or the `sub` claim is missing.
pub fn decode_claims(token: &str) -> Result<DecodedClaims, Error> {
    let payload = extract_payload(token)?;

    let raw: RawClaims = serde_json::from_slice(&payload)
        .map_err(|e| Error::MalformedToken(format!("invalid payload: {e}")))?;

    let subject_id = raw
        .sub
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::MalformedToken("missing claim: sub".into()))?;

    let expires_at = raw
        .exp
        .map(|n| {
            n.as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| Error::MalformedToken("invalid claim: exp".into()))
        })
        .transpose()?;

    Ok(DecodedClaims {
        subject_id: UserId(subject_id),
        token_id: raw.jti.map(Into::into),
        permissions: permissions_from(raw.permissions),
        expires_at,
    })
}

/// Reads the optional `permissions` claim. Anything other than an array
/// yields no permissions; non-string entries are skipped.
fn permissions_from(value: serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        serde_json::Value::Null => Vec::new(),
        other => {
            tracing::debug!(claim = %other, "Ignoring unusable permissions claim");
            Vec::new()
        }
    }
}

/// Extracts the payload bytes (second segment) from a compact JWS string.
pub(crate) fn extract_payload(token: &str) -> Result<Vec<u8>, Error> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::MalformedToken(format!(
            "expected 3 segments, got {}",
            parts.len()
        )));
    }

    let payload_b64 = parts[1].trim_end_matches('=');
    if payload_b64.is_empty() {
        return Err(Error::MalformedToken("empty payload".into()));
    }

    URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| Error::MalformedToken("payload is not base64url".into()))
}
