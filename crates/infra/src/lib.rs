//! Infrastructure layer: configuration, Postgres wiring and the store
//! implementations behind the `hrdesk-auth` seams.

pub mod config;
pub mod credentials;
pub mod db;
pub mod employees;
pub mod sessions;

pub use config::{AppConfig, ConfigError};
pub use credentials::{InMemoryCredentialStore, PostgresCredentialStore};
pub use db::DbError;
pub use employees::{InMemoryEmployeeDirectory, PostgresEmployeeDirectory};
pub use sessions::{InMemorySessionStore, PostgresSessionStore};
