//! Authentication service: registration, login, refresh rotation, logout, and
//! password reset.
//!
//! ## Refresh state machine
//!
//! ```text
//! presented ──verify──► claims ──list_active──► sessions ──scan──► match?
//!    │ fail                                                   │ no      │ yes
//!    ▼                                                        ▼         ▼
//! invalid refresh token                   revoke all ◄── reuse    rotate(consumed, new)
//!                                         (then fail)    detected      │ AlreadyConsumed ─► reuse detected
//!                                                                      ▼ Rotated
//!                                                                  new token pair
//! ```
//!
//! A refresh token that verifies but matches no live session was either already
//! rotated away or never backed a session. Either way it is treated as leaked:
//! every session of the owner is revoked before the error is returned, which
//! caps a leaked token at one successful use.
//!
//! A session expires at the same instant as its refresh token's `exp`, so an
//! expired session is never looked up: verification rejects the token first,
//! and `list_active` leaves expired rows out.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tracing::{Span, field, info, instrument, warn};

use hrdesk_core::{DomainError, DomainResult, ExternalId};

use crate::claims::{TokenKind, TokenPair, TokenSubject};
use crate::fingerprint::Fingerprinter;
use crate::password::{CredentialHasher, HashingError};
use crate::session::{DeviceMetadata, NewSession, RotateOutcome, Session};
use crate::store::{CredentialStore, SessionStore};
use crate::tokens::{TokenError, TokenService};
use crate::user::{NewUser, normalize_email};
use crate::Role;

pub const RESET_TOKEN_TTL_MINUTES: i64 = 15;

/// Raw reset-token entropy, before hex encoding.
const RESET_TOKEN_BYTES: usize = 32;

const INVALID_CREDENTIALS: &str = "invalid credentials";
const INVALID_REFRESH_TOKEN: &str = "invalid refresh token";
const REUSE_DETECTED: &str = "refresh token reuse detected";
const INVALID_TOKEN: &str = "invalid token";
const INVALID_RESET_TOKEN: &str = "invalid or expired token";

/// A freshly issued password-reset token.
#[derive(Clone)]
pub struct ResetTicket {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl core::fmt::Debug for ResetTicket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResetTicket")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    tokens: Arc<TokenService>,
    hasher: CredentialHasher,
    fingerprints: Fingerprinter,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        tokens: Arc<TokenService>,
        hasher: CredentialHasher,
    ) -> Self {
        let fingerprints = Fingerprinter::new(hasher.clone());
        Self {
            credentials,
            sessions,
            tokens,
            hasher,
            fingerprints,
        }
    }

    /// Create an account for someone on the employee roster.
    #[instrument(skip_all, fields(role = role))]
    pub async fn register(&self, email: &str, password: &str, role: &str) -> DomainResult<ExternalId> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() || role.trim().is_empty() {
            return Err(DomainError::validation("email, password and role are required"));
        }
        if !email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }
        let role: Role = role
            .parse()
            .map_err(|_| DomainError::validation("role must be one of: user, admin, superadmin"))?;

        if !self.credentials.employee_exists(&email).await? {
            return Err(DomainError::validation("no employee record for this email"));
        }
        if self.credentials.find_by_email(&email).await?.is_some() {
            return Err(DomainError::conflict("email already registered"));
        }

        let password_hash = self.hasher.hash_password(password).await.map_err(hashing_failed)?;
        let external_id = self
            .credentials
            .insert(NewUser {
                external_id: ExternalId::new(),
                email,
                role,
                password_hash,
            })
            .await?;

        info!(user = %external_id, "user registered");
        Ok(external_id)
    }

    #[instrument(skip_all, fields(user = field::Empty, user_agent = ?device.user_agent))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device: DeviceMetadata,
    ) -> DomainResult<TokenPair> {
        let email = normalize_email(email);
        let user = self.credentials.find_by_email(&email).await?;

        // Unknown email and missing hash are indistinguishable to the caller.
        let Some((user, stored_hash)) =
            user.and_then(|u| u.password_hash.clone().map(|h| (u, h)))
        else {
            return Err(DomainError::authentication(INVALID_CREDENTIALS));
        };
        Span::current().record("user", field::display(user.external_id));

        let valid = self
            .hasher
            .verify_password(password, &stored_hash)
            .await
            .map_err(hashing_failed)?;
        if !valid {
            return Err(DomainError::authentication(INVALID_CREDENTIALS));
        }

        let subject = TokenSubject {
            external_id: user.external_id,
            email: user.email,
            role: user.role,
        };
        let (pair, new_session) = self.mint_session(&subject, device, Utc::now()).await?;
        let session = self.sessions.replace_for_device(new_session).await?;

        info!(session = %session.id, "login succeeded");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair; the presented token dies.
    #[instrument(skip_all, fields(user = field::Empty, session = field::Empty))]
    pub async fn refresh(&self, presented: &str) -> DomainResult<TokenPair> {
        let claims = self
            .tokens
            .verify(presented, TokenKind::Refresh)
            .map_err(|_| DomainError::authentication(INVALID_REFRESH_TOKEN))?;
        let span = Span::current();
        span.record("user", field::display(claims.sub));

        let Some(session) = self.find_live_session(&claims.sub, presented).await? else {
            return Err(self.reuse_detected(&claims.sub).await);
        };
        span.record("session", field::display(session.id));

        let (pair, replacement) = self
            .mint_session(&claims.subject(), session.device(), Utc::now())
            .await?;

        match self.sessions.rotate(session.id, replacement).await? {
            RotateOutcome::Rotated(next) => {
                info!(next_session = %next.id, "refresh token rotated");
                Ok(pair)
            }
            // A concurrent request consumed the same session first.
            RotateOutcome::AlreadyConsumed => Err(self.reuse_detected(&claims.sub).await),
        }
    }

    /// End the session behind `presented`. Other devices stay signed in.
    #[instrument(skip_all, fields(user = field::Empty))]
    pub async fn logout(&self, presented: &str) -> DomainResult<()> {
        let claims = self
            .tokens
            .verify(presented, TokenKind::Refresh)
            .map_err(|_| DomainError::authentication(INVALID_TOKEN))?;
        Span::current().record("user", field::display(claims.sub));

        let Some(session) = self.find_live_session(&claims.sub, presented).await? else {
            return Err(DomainError::authentication(INVALID_TOKEN));
        };
        if !self.sessions.revoke_by_id(session.id).await? {
            return Err(DomainError::authentication(INVALID_TOKEN));
        }

        info!(session = %session.id, "logged out");
        Ok(())
    }

    /// Issue a reset token for `email`.
    ///
    /// The outcome does not depend on whether the email is known: a token is
    /// generated and returned either way, it just isn't stored for unknown
    /// addresses.
    #[instrument(skip_all)]
    pub async fn request_reset(&self, email: &str) -> DomainResult<ResetTicket> {
        let email = normalize_email(email);
        let ticket = ResetTicket {
            token: generate_reset_token(),
            expires_at: Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
        };

        if !email.is_empty() {
            let stored = self
                .credentials
                .set_reset_token(&email, &ticket.token, ticket.expires_at)
                .await?;
            tracing::debug!(stored, "password reset requested");
        }
        Ok(ticket)
    }

    /// Redeem a reset token. Succeeds at most once per token.
    #[instrument(skip_all, fields(user = field::Empty))]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> DomainResult<()> {
        if token.trim().is_empty() || new_password.is_empty() {
            return Err(DomainError::validation("token and newPassword are required"));
        }

        let now = Utc::now();
        let Some(user) = self.credentials.find_by_valid_reset_token(token, now).await? else {
            return Err(DomainError::validation(INVALID_RESET_TOKEN));
        };
        Span::current().record("user", field::display(user.external_id));

        let new_hash = self.hasher.hash_password(new_password).await.map_err(hashing_failed)?;
        let updated = self
            .credentials
            .update_password_and_clear_reset(user.id, &new_hash, token, now)
            .await?;
        if !updated {
            return Err(DomainError::validation(INVALID_RESET_TOKEN));
        }

        let revoked = self.sessions.revoke_all_for_user(&user.external_id).await?;
        info!(revoked_sessions = revoked, "password reset");
        Ok(())
    }

    /// Verify a bearer access token and return who it speaks for.
    pub fn authenticate(&self, access_token: &str) -> DomainResult<TokenSubject> {
        self.tokens
            .verify(access_token, TokenKind::Access)
            .map(|claims| claims.subject())
            .map_err(|_| DomainError::authentication(INVALID_TOKEN))
    }

    async fn find_live_session(
        &self,
        user: &ExternalId,
        presented: &str,
    ) -> DomainResult<Option<Session>> {
        let active = self.sessions.list_active(user).await?;
        self.fingerprints
            .find_session(presented, active)
            .await
            .map_err(hashing_failed)
    }

    async fn mint_session(
        &self,
        subject: &TokenSubject,
        device: DeviceMetadata,
        now: DateTime<Utc>,
    ) -> DomainResult<(TokenPair, NewSession)> {
        let pair = self.tokens.issue_pair_at(subject, now).map_err(signing_failed)?;
        let fingerprint = self
            .fingerprints
            .fingerprint(&pair.refresh_token)
            .await
            .map_err(hashing_failed)?;
        let session = NewSession::new(
            subject.external_id,
            fingerprint,
            device,
            self.tokens.refresh_expiry(now),
        );
        Ok((pair, session))
    }

    /// Revoke everything the user holds and build the error to return.
    async fn reuse_detected(&self, user: &ExternalId) -> DomainError {
        match self.sessions.revoke_all_for_user(user).await {
            Ok(revoked) => {
                warn!(user = %user, revoked_sessions = revoked, "refresh token reuse detected");
                DomainError::authentication(REUSE_DETECTED)
            }
            Err(e) => {
                tracing::error!(user = %user, error = %e, "revocation after refresh token reuse failed");
                e.into()
            }
        }
    }
}

fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hashing_failed(e: HashingError) -> DomainError {
    DomainError::store_unavailable(e.to_string())
}

fn signing_failed(e: TokenError) -> DomainError {
    DomainError::store_unavailable(e.to_string())
}
