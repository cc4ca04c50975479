//! Outbound (driven) adapters: the upstream API client and the mirror store.

pub mod persistence;
pub mod upstream;
