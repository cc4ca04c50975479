//! Mirror-sync backend library.
//!
//! Pulls the upstream project-management API into a local relational mirror
//! and exposes a small JSON API to trigger and observe sync runs. Layout
//! follows a hexagonal split: `domain` holds the registry, mapper, and
//! orchestrator; `inbound` and `outbound` hold the adapters.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod outbound;
pub mod server;
#[cfg(feature = "test-support")]
pub mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
