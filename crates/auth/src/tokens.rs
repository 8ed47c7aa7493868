//! Stateless signer/verifier for access and refresh tokens (HS256 JWTs).
//!
//! The two kinds are signed with separate keys and also carry a `kind` claim,
//! so an access token is never accepted where a refresh token is expected even
//! if both secrets were configured identically.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use crate::claims::{Claims, TokenKind, TokenPair, TokenSubject};

pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Bad signature, expired, malformed, or wrong kind. Deliberately opaque.
    #[error("invalid token")]
    Invalid,

    #[error("token signing failed: {0}")]
    Signing(String),
}

struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

pub struct TokenService {
    access: SigningKey,
    refresh: SigningKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl core::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self::with_ttls(
            access_secret,
            refresh_secret,
            Duration::minutes(ACCESS_TOKEN_TTL_MINUTES),
            Duration::days(REFRESH_TOKEN_TTL_DAYS),
        )
    }

    pub fn with_ttls(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            access: SigningKey::from_secret(access_secret),
            refresh: SigningKey::from_secret(refresh_secret),
            access_ttl,
            refresh_ttl,
            validation,
        }
    }

    /// Expiry of a refresh token issued at `now`, as the `exp` claim encodes it.
    ///
    /// Sessions store this same instant so the session and its token lapse
    /// together.
    pub fn refresh_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        (now + self.refresh_ttl).trunc_subsecs(0)
    }

    pub fn issue_access_token(&self, subject: &TokenSubject) -> Result<String, TokenError> {
        self.issue(subject, TokenKind::Access, Utc::now())
    }

    pub fn issue_refresh_token(&self, subject: &TokenSubject) -> Result<String, TokenError> {
        self.issue(subject, TokenKind::Refresh, Utc::now())
    }

    pub fn issue_pair(&self, subject: &TokenSubject) -> Result<TokenPair, TokenError> {
        self.issue_pair_at(subject, Utc::now())
    }

    pub fn issue_pair_at(
        &self,
        subject: &TokenSubject,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue(subject, TokenKind::Access, now)?,
            refresh_token: self.issue(subject, TokenKind::Refresh, now)?,
        })
    }

    /// Verify signature, expiry, and kind. Returns the decoded claims.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let key = self.key(kind);
        let data = jsonwebtoken::decode::<Claims>(token, &key.decoding, &self.validation)
            .map_err(|_| TokenError::Invalid)?;

        if data.claims.kind != kind {
            return Err(TokenError::Invalid);
        }
        // `exp` is exclusive; the library still accepts the second it names.
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }

    fn issue(
        &self,
        subject: &TokenSubject,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: subject.external_id,
            email: subject.email.clone(),
            role: subject.role,
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key(kind).encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn key(&self, kind: TokenKind) -> &SigningKey {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use hrdesk_core::ExternalId;
    use proptest::prelude::*;

    fn service() -> TokenService {
        TokenService::new(b"access-secret", b"refresh-secret")
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            external_id: ExternalId::new(),
            email: "a@x.com".to_string(),
            role: Role::Admin,
        }
    }

    #[test]
    fn access_token_round_trips_subject() {
        let svc = service();
        let subject = subject();

        let token = svc.issue_access_token(&subject).unwrap();
        let claims = svc.verify(&token, TokenKind::Access).unwrap();

        assert_eq!(claims.subject(), subject);
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_TTL_MINUTES * 60);
    }

    #[test]
    fn refresh_token_lives_seven_days() {
        let svc = service();
        let token = svc.issue_refresh_token(&subject()).unwrap();
        let claims = svc.verify(&token, TokenKind::Refresh).unwrap();
        assert_eq!(claims.exp - claims.iat, REFRESH_TOKEN_TTL_DAYS * 24 * 3600);
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let svc = service();
        let token = svc.issue_access_token(&subject()).unwrap();
        assert_eq!(svc.verify(&token, TokenKind::Refresh), Err(TokenError::Invalid));
    }

    #[test]
    fn kind_claim_is_checked_even_with_shared_secret() {
        let svc = TokenService::new(b"same", b"same");
        let token = svc.issue_access_token(&subject()).unwrap();
        assert_eq!(svc.verify(&token, TokenKind::Refresh), Err(TokenError::Invalid));
    }

    #[test]
    fn tokens_minted_back_to_back_differ() {
        let svc = service();
        let subject = subject();
        let a = svc.issue_refresh_token(&subject).unwrap();
        let b = svc.issue_refresh_token(&subject).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = TokenService::with_ttls(
            b"access-secret",
            b"refresh-secret",
            Duration::minutes(-1),
            Duration::days(REFRESH_TOKEN_TTL_DAYS),
        );
        let token = svc.issue_access_token(&subject()).unwrap();
        assert_eq!(svc.verify(&token, TokenKind::Access), Err(TokenError::Invalid));
    }

    #[test]
    fn token_is_dead_from_its_exp_second_on() {
        let svc = TokenService::with_ttls(
            b"access-secret",
            b"refresh-secret",
            Duration::zero(),
            Duration::zero(),
        );
        let pair = svc.issue_pair(&subject()).unwrap();
        assert_eq!(svc.verify(&pair.access_token, TokenKind::Access), Err(TokenError::Invalid));
        assert_eq!(svc.verify(&pair.refresh_token, TokenKind::Refresh), Err(TokenError::Invalid));
    }

    #[test]
    fn refresh_expiry_matches_the_exp_claim() {
        let svc = service();
        let now = Utc::now();
        let pair = svc.issue_pair_at(&subject(), now).unwrap();
        let claims = svc.verify(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(svc.refresh_expiry(now).timestamp(), claims.exp);
        assert_eq!(svc.refresh_expiry(now).timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn token_signed_with_other_key_is_rejected() {
        let other = TokenService::new(b"attacker", b"attacker-refresh");
        let token = other.issue_access_token(&subject()).unwrap();
        assert_eq!(service().verify(&token, TokenKind::Access), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(service().verify("not.a.jwt", TokenKind::Access), Err(TokenError::Invalid));
        assert_eq!(service().verify("", TokenKind::Refresh), Err(TokenError::Invalid));
    }

    proptest! {
        #[test]
        fn flipping_any_byte_breaks_verification(index in any::<prop::sample::Index>(), flip in 1u8..=255) {
            let svc = service();
            let token = svc.issue_access_token(&subject()).unwrap();
            let mut bytes = token.into_bytes();
            let i = index.index(bytes.len());
            bytes[i] ^= flip;

            // A flipped byte may leave invalid UTF-8; such a token cannot even be presented.
            if let Ok(tampered) = String::from_utf8(bytes) {
                prop_assert!(svc.verify(&tampered, TokenKind::Access).is_err());
            }
        }
    }
}
