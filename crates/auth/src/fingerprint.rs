//! Refresh-token fingerprints.
//!
//! A fingerprint is `argon2id(sha256_hex(token))` with a per-row random salt.
//! The raw token is never stored. Because every row has its own salt, finding
//! the session a token belongs to means testing it against each of the owner's
//! live sessions in turn; that set is bounded by the owner's device count.

use sha2::{Digest, Sha256};

use crate::password::{CredentialHasher, HashingError};
use crate::session::Session;

/// Fast pre-digest. Keeps the adaptive stage's input a fixed 64 bytes no
/// matter how long the JWT is.
fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct Fingerprinter {
    hasher: CredentialHasher,
}

impl Fingerprinter {
    pub fn new(hasher: CredentialHasher) -> Self {
        Self { hasher }
    }

    pub fn fingerprint_blocking(&self, token: &str) -> Result<String, HashingError> {
        self.hasher.hash_blocking(digest(token).as_bytes())
    }

    pub fn matches_blocking(&self, token: &str, fingerprint: &str) -> bool {
        self.hasher.verify_blocking(digest(token).as_bytes(), fingerprint)
    }

    /// Index of the first session whose fingerprint matches `token`. Blocking.
    pub fn position_blocking(&self, token: &str, sessions: &[Session]) -> Option<usize> {
        let digest = digest(token);
        sessions
            .iter()
            .position(|s| self.hasher.verify_blocking(digest.as_bytes(), &s.refresh_fingerprint))
    }

    pub async fn fingerprint(&self, token: &str) -> Result<String, HashingError> {
        let this = self.clone();
        let token = token.to_owned();
        tokio::task::spawn_blocking(move || this.fingerprint_blocking(&token))
            .await
            .map_err(|e| HashingError::Worker(e.to_string()))?
    }

    /// Scan `sessions` on the blocking pool and hand back the one `token` belongs to.
    pub async fn find_session(
        &self,
        token: &str,
        mut sessions: Vec<Session>,
    ) -> Result<Option<Session>, HashingError> {
        if sessions.is_empty() {
            return Ok(None);
        }
        let this = self.clone();
        let token = token.to_owned();
        tokio::task::spawn_blocking(move || {
            this.position_blocking(&token, &sessions)
                .map(|i| sessions.swap_remove(i))
        })
        .await
        .map_err(|e| HashingError::Worker(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use hrdesk_core::{ExternalId, SessionId};

    use super::*;
    use crate::password::HashingParams;

    fn fingerprinter() -> Fingerprinter {
        Fingerprinter::new(CredentialHasher::new(HashingParams::insecure_fast()).unwrap())
    }

    fn session(fp: &Fingerprinter, token: &str) -> Session {
        Session {
            id: SessionId::new(),
            user_external_id: ExternalId::new(),
            refresh_fingerprint: fp.fingerprint_blocking(token).unwrap(),
            user_agent: None,
            origin: None,
            expires_at: Utc::now() + Duration::days(7),
            revoked: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fingerprint_never_contains_the_token() {
        let fp = fingerprinter();
        let stored = fp.fingerprint_blocking("header.payload.signature").unwrap();
        assert!(!stored.contains("payload"));
        assert!(fp.matches_blocking("header.payload.signature", &stored));
        assert!(!fp.matches_blocking("header.payload.signaturf", &stored));
    }

    #[test]
    fn same_token_gets_different_fingerprints() {
        let fp = fingerprinter();
        assert_ne!(
            fp.fingerprint_blocking("t").unwrap(),
            fp.fingerprint_blocking("t").unwrap()
        );
    }

    #[tokio::test]
    async fn find_session_picks_the_matching_device() {
        let fp = fingerprinter();
        let phone = session(&fp, "token-phone");
        let laptop = session(&fp, "token-laptop");
        let laptop_id = laptop.id;

        let found = fp
            .find_session("token-laptop", vec![phone, laptop])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, laptop_id);
    }

    #[tokio::test]
    async fn find_session_returns_none_for_unknown_token() {
        let fp = fingerprinter();
        let phone = session(&fp, "token-phone");
        assert!(fp.find_session("stale", vec![phone]).await.unwrap().is_none());
        assert!(fp.find_session("stale", Vec::new()).await.unwrap().is_none());
    }
}
