//! Session store implementations.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemorySessionStore;
pub use postgres::PostgresSessionStore;
