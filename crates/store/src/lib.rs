//! Storage backends for Settlr.
//!
//! Both backends implement [`HistoryStore`](settlr_core::HistoryStore) and
//! [`GeoStore`](settlr_core::GeoStore):
//! - [`SqliteStore`] for persistent use (default feature `sqlite`)
//! - [`InMemoryStore`] for tests and throwaway sessions

pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
