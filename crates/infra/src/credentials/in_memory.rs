use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hrdesk_auth::{CredentialStore, EmployeeDirectory, NewUser, StoreError, User};
use hrdesk_core::{ExternalId, UserId};

#[derive(Debug, Default)]
struct Users {
    next_id: i64,
    by_email: HashMap<String, User>,
}

/// In-memory credential store for tests/dev.
pub struct InMemoryCredentialStore {
    inner: RwLock<Users>,
    employees: Arc<dyn EmployeeDirectory>,
}

impl InMemoryCredentialStore {
    pub fn new(employees: Arc<dyn EmployeeDirectory>) -> Self {
        Self {
            inner: RwLock::new(Users::default()),
            employees,
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Users>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("credential store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Users>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("credential store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.by_email.get(email).cloned())
    }

    async fn employee_exists(&self, email: &str) -> Result<bool, StoreError> {
        self.employees.employee_exists(email).await
    }

    async fn insert(&self, user: NewUser) -> Result<ExternalId, StoreError> {
        let mut users = self.write()?;
        if users.by_email.contains_key(&user.email) {
            return Err(StoreError::Duplicate(format!("users.email {}", user.email)));
        }
        if users.by_email.values().any(|u| u.external_id == user.external_id) {
            return Err(StoreError::Duplicate("users.external_id".to_string()));
        }

        users.next_id += 1;
        let id = UserId::new(users.next_id);
        let external_id = user.external_id;
        users.by_email.insert(
            user.email.clone(),
            User {
                id,
                external_id,
                email: user.email,
                role: user.role,
                password_hash: Some(user.password_hash),
                reset_token: None,
                reset_token_expiry: None,
            },
        );
        Ok(external_id)
    }

    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expiry: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut users = self.write()?;
        match users.by_email.get_mut(email) {
            Some(user) => {
                user.reset_token = Some(token.to_string());
                user.reset_token_expiry = Some(expiry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_valid_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let users = self.read()?;
        Ok(users
            .by_email
            .values()
            .find(|u| {
                u.reset_token.as_deref() == Some(token)
                    && u.reset_token_expiry.is_some_and(|exp| exp > now)
            })
            .cloned())
    }

    async fn update_password_and_clear_reset(
        &self,
        user_id: UserId,
        new_hash: &str,
        redeemed_token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut users = self.write()?;
        let Some(user) = users.by_email.values_mut().find(|u| u.id == user_id) else {
            return Ok(false);
        };
        let still_valid = user.reset_token.as_deref() == Some(redeemed_token)
            && user.reset_token_expiry.is_some_and(|exp| exp > now);
        if !still_valid {
            return Ok(false);
        }

        user.password_hash = Some(new_hash.to_string());
        user.reset_token = None;
        user.reset_token_expiry = None;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use hrdesk_auth::Role;

    use super::*;
    use crate::employees::InMemoryEmployeeDirectory;

    fn store() -> InMemoryCredentialStore {
        InMemoryCredentialStore::new(Arc::new(InMemoryEmployeeDirectory::with_emails(["a@x.com"])))
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            external_id: ExternalId::new(),
            email: email.to_string(),
            role: Role::User,
            password_hash: "$argon2id$stub".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = store();
        store.insert(new_user("a@x.com")).await.unwrap();
        let err = store.insert(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn reset_token_is_only_found_before_expiry() {
        let store = store();
        store.insert(new_user("a@x.com")).await.unwrap();
        let now = Utc::now();
        store
            .set_reset_token("a@x.com", "tok", now + Duration::minutes(15))
            .await
            .unwrap();

        assert!(store.find_by_valid_reset_token("tok", now).await.unwrap().is_some());
        assert!(
            store
                .find_by_valid_reset_token("tok", now + Duration::minutes(15))
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.find_by_valid_reset_token("other", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn password_update_clears_both_reset_fields_once() {
        let store = store();
        store.insert(new_user("a@x.com")).await.unwrap();
        let now = Utc::now();
        store
            .set_reset_token("a@x.com", "tok", now + Duration::minutes(15))
            .await
            .unwrap();
        let user = store.find_by_email("a@x.com").await.unwrap().unwrap();

        assert!(store.update_password_and_clear_reset(user.id, "h2", "tok", now).await.unwrap());
        assert!(!store.update_password_and_clear_reset(user.id, "h3", "tok", now).await.unwrap());

        let user = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(user.password_hash.as_deref(), Some("h2"));
        assert!(user.reset_token.is_none());
        assert!(user.reset_token_expiry.is_none());
    }

    #[tokio::test]
    async fn reset_for_unknown_email_touches_nothing() {
        let store = store();
        let stored = store
            .set_reset_token("ghost@x.com", "tok", Utc::now() + Duration::minutes(15))
            .await
            .unwrap();
        assert!(!stored);
    }
}
