use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hrdesk_core::ExternalId;

use crate::Role;

/// Which of the two token kinds a token is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// The identity a token speaks for. Both token kinds carry the same subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSubject {
    pub external_id: ExternalId,
    pub email: String,
    pub role: Role,
}

/// JWT claims as they travel on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's external id.
    pub sub: ExternalId,

    pub email: String,

    pub role: Role,

    pub kind: TokenKind,

    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,

    /// Expiration, seconds since the Unix epoch.
    pub exp: i64,

    /// Unique token id; two tokens minted in the same second still differ.
    pub jti: Uuid,
}

impl Claims {
    pub fn subject(&self) -> TokenSubject {
        TokenSubject {
            external_id: self.sub,
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// An access/refresh token pair handed to a client.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl core::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}
