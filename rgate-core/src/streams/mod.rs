//! Domain event streams.
//!
//! Each stream composes a channel registry with its own [`Correlator`] and
//! exposes the RPC surface of one worker kind:
//!
//! - [`ProofEventStream`]: miners computing PoSt proofs
//! - [`WalletEventStream`]: wallets signing on behalf of support accounts
//! - [`MarketEventStream`]: market agents checking and unsealing pieces
//!
//! [`Correlator`]: crate::events::Correlator

pub mod market;
pub mod proof;
pub mod wallet;

pub use market::MarketEventStream;
pub use proof::ProofEventStream;
pub use wallet::WalletEventStream;

use crate::context::CallContext;
use crate::error::GatewayError;
use crate::validator::IdentityValidator;

async fn validate_identity(
    validator: &dyn IdentityValidator,
    cx: &CallContext,
    identity: &str,
) -> Result<(), GatewayError> {
    validator
        .validate(cx, identity)
        .await
        .map_err(|reason| GatewayError::ValidationFailed {
            identity: identity.to_owned(),
            reason,
        })
}
