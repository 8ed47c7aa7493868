use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use hrdesk_auth::{NewSession, RotateOutcome, Session, SessionStore, StoreError};
use hrdesk_core::{ExternalId, SessionId};

/// In-memory session store for tests/dev.
///
/// Every mutating operation runs under a single write guard, which is what
/// makes `replace_for_device` and `rotate` atomic here. Revoked sessions are
/// retained, mirroring the Postgres table; expired ones are dropped whenever
/// their owner logs in or rotates.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row for `user`, revoked or not.
    pub fn all_for_user(&self, user: &ExternalId) -> Result<Vec<Session>, StoreError> {
        let sessions = self.read()?;
        Ok(sessions
            .values()
            .filter(|s| &s.user_external_id == user)
            .cloned()
            .collect())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<SessionId, Session>>, StoreError> {
        self.sessions
            .read()
            .map_err(|_| StoreError::Unavailable("session store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<SessionId, Session>>, StoreError> {
        self.sessions
            .write()
            .map_err(|_| StoreError::Unavailable("session store lock poisoned".to_string()))
    }
}

fn replace_locked(sessions: &mut HashMap<SessionId, Session>, new: NewSession) -> Session {
    let now = Utc::now();
    let user = new.user_external_id;
    let user_agent = new.device.user_agent.clone();
    sessions.retain(|_, s| {
        if s.user_external_id != user {
            return true;
        }
        !s.is_expired(now) && (s.revoked || !s.same_device(&user, user_agent.as_deref()))
    });

    let session = new.into_session(now);
    sessions.insert(session.id, session.clone());
    session
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn replace_for_device(&self, session: NewSession) -> Result<Session, StoreError> {
        let mut sessions = self.write()?;
        Ok(replace_locked(&mut sessions, session))
    }

    async fn list_active(&self, user: &ExternalId) -> Result<Vec<Session>, StoreError> {
        let now = Utc::now();
        let sessions = self.read()?;
        let mut active: Vec<Session> = sessions
            .values()
            .filter(|s| &s.user_external_id == user && !s.revoked && !s.is_expired(now))
            .cloned()
            .collect();
        active.sort_by_key(|s| s.created_at);
        Ok(active)
    }

    async fn delete_by_id(&self, id: SessionId) -> Result<bool, StoreError> {
        Ok(self.write()?.remove(&id).is_some())
    }

    async fn revoke_all_for_user(&self, user: &ExternalId) -> Result<u64, StoreError> {
        let mut sessions = self.write()?;
        let mut revoked = 0;
        for session in sessions.values_mut() {
            if &session.user_external_id == user && !session.revoked {
                session.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_by_id(&self, id: SessionId) -> Result<bool, StoreError> {
        let mut sessions = self.write()?;
        match sessions.get_mut(&id) {
            Some(session) if !session.revoked => {
                session.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn rotate(
        &self,
        consumed: SessionId,
        replacement: NewSession,
    ) -> Result<RotateOutcome, StoreError> {
        let mut sessions = self.write()?;
        match sessions.get(&consumed) {
            Some(s) if !s.revoked => {}
            _ => return Ok(RotateOutcome::AlreadyConsumed),
        }
        sessions.remove(&consumed);
        Ok(RotateOutcome::Rotated(replace_locked(&mut sessions, replacement)))
    }
}
