//! Outbound adapter for the upstream JSON:API.

mod dto;
mod http_source;

pub use http_source::UpstreamHttpSource;
