#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! Shared wire types and clients for the rgate broker.
//!
//! - [`objects`]: request/response events, domain payloads and API bodies.
//! - [`sign`]: the wallet sign-challenge derivation.
//! - `client` (feature `client`): the public RPC client and the worker-side
//!   registration client.

pub mod objects;
pub mod sign;

#[cfg(feature = "client")]
pub mod client;

/// Header carrying the broadcast-prevention flag between brokers.
pub const NO_BROADCAST_HEADER: &str = "Rgate-No-Broadcast";
