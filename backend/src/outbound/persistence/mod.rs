//! Persistence adapters for the local mirror database.

mod postgres_store;
mod sql;

pub use postgres_store::PostgresMirrorStore;
