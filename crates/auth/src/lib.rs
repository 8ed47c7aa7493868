//! `hrdesk-auth`: authentication and session lifecycle.
//!
//! No HTTP and no database here: the crate defines the store seams it needs
//! and orchestrates them.

pub mod claims;
pub mod fingerprint;
pub mod password;
pub mod roles;
pub mod service;
pub mod session;
pub mod store;
pub mod tokens;
pub mod user;

pub use claims::{Claims, TokenKind, TokenPair, TokenSubject};
pub use fingerprint::Fingerprinter;
pub use password::{CredentialHasher, HashingError, HashingParams};
pub use roles::{Role, UnknownRole};
pub use service::{AuthService, ResetTicket, RESET_TOKEN_TTL_MINUTES};
pub use session::{DeviceMetadata, NewSession, RotateOutcome, Session};
pub use store::{CredentialStore, EmployeeDirectory, SessionStore, StoreError};
pub use tokens::{TokenError, TokenService};
pub use user::{NewUser, User, normalize_email};
