#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod cluster;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod gateway;
pub mod streams;
pub mod validator;

pub use context::CallContext;
pub use error::GatewayError;
pub use gateway::GatewayApi;
