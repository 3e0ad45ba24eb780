//! Runtime configuration consumed by the broker core.
//!
//! These types are already validated; loading and parsing is handled by the
//! server crate.

mod cluster;
mod request;

pub use cluster::ClusterConfig;
pub use request::RequestConfig;
