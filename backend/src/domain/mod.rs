//! Domain layer: entity registry, mapping, and the sync orchestrator.
//!
//! Everything here is transport and storage agnostic; adapters plug in
//! through the ports in [`ports`].

pub mod error;
pub mod mapper;
pub mod ports;
pub mod registry;
pub mod resource;
pub mod sync;

pub use error::{Error, ErrorCode};
