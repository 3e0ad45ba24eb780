//! Registration validation seam.

use async_trait::async_trait;

use crate::context::CallContext;

/// Decides whether the caller may register a channel for `identity`.
///
/// Implementations return a human-readable reason on rejection; the streams
/// wrap it in [`GatewayError::ValidationFailed`](crate::GatewayError).
#[async_trait]
pub trait IdentityValidator: Send + Sync {
    async fn validate(&self, cx: &CallContext, identity: &str) -> Result<(), String>;
}

/// Accepts every identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl IdentityValidator for AllowAll {
    async fn validate(&self, _cx: &CallContext, _identity: &str) -> Result<(), String> {
        Ok(())
    }
}
