//! Per-call context: cancellation, ambient identity and the
//! broadcast-prevention flag.

use std::net::IpAddr;

use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;

/// Context every blocking broker operation is parameterized by.
///
/// Cancelling the token unblocks the waiter locally; it never retracts a
/// request that was already handed to a worker.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    account: Option<String>,
    ip: Option<IpAddr>,
    no_broadcast: bool,
}

impl CallContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Default::default()
        }
    }

    /// A context with a fresh token nobody else holds.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Copy of this context marked so receivers never re-broadcast.
    pub fn without_broadcast(&self) -> Self {
        Self {
            no_broadcast: true,
            ..self.clone()
        }
    }

    pub fn no_broadcast(&self) -> bool {
        self.no_broadcast
    }

    /// The authenticated account of the caller.
    pub fn account(&self) -> Result<&str, GatewayError> {
        self.account.as_deref().ok_or(GatewayError::IdentityNotPresent)
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    /// Remote IP for connection listings, `"unknown"` if absent.
    pub fn ip_string(&self) -> String {
        self.ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_owned())
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the context is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_absent() {
        let cx = CallContext::background();
        assert!(matches!(cx.account(), Err(GatewayError::IdentityNotPresent)));
        assert_eq!(cx.ip_string(), "unknown");
    }

    #[test]
    fn test_without_broadcast_shares_cancellation() {
        let cx = CallContext::background().with_account("alice");
        let marked = cx.without_broadcast();
        assert!(marked.no_broadcast());
        assert!(!cx.no_broadcast());
        assert_eq!(marked.account().unwrap(), "alice");

        cx.cancel_token().cancel();
        assert!(marked.is_cancelled());
    }
}
