use hrdesk_auth::{Role, TokenSubject};
use hrdesk_core::ExternalId;

/// Authenticated caller for a request, taken from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    external_id: ExternalId,
    email: String,
    role: Role,
}

impl PrincipalContext {
    pub fn new(subject: TokenSubject) -> Self {
        Self {
            external_id: subject.external_id,
            email: subject.email,
            role: subject.role,
        }
    }

    pub fn external_id(&self) -> ExternalId {
        self.external_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> Role {
        self.role
    }
}
