//! Channel registration and request correlation.
//!
//! # Request Flow
//!
//! 1. A stream selects the channels registered for an identity
//!    ([`ChannelRegistry::select`]).
//! 2. The [`Correlator`] stores a pending entry and pushes a `RequestEvent`
//!    onto a channel's outbound queue.
//! 3. The transport drains the queue to the remote worker.
//! 4. The worker's `ResponseEvent` is handed to
//!    [`Correlator::resolve_response`], which wakes the waiting caller.
//!
//! Channels are never unregistered explicitly: cancelling the registering
//! context drives the channel through `Active → Removing → Removed`.

pub mod channel;
pub mod correlator;
pub mod registry;

pub use channel::{
    Channel, ChannelHandle, ChannelState, RequestEventReceiver, RequestEventSender,
    request_event_channel,
};
pub use correlator::Correlator;
pub use registry::ChannelRegistry;
