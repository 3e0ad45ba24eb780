//! Miner binding check for proof and market registrations.

use std::sync::Arc;

use async_trait::async_trait;
use rgate_core::CallContext;
use rgate_core::validator::IdentityValidator;

use crate::config::tokens::TokenTable;

/// Accepts a registration when the caller's account is bound to the miner
/// in the token table.
pub struct MinerBindingValidator {
    tokens: Arc<TokenTable>,
}

impl MinerBindingValidator {
    pub fn new(tokens: Arc<TokenTable>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl IdentityValidator for MinerBindingValidator {
    async fn validate(&self, cx: &CallContext, identity: &str) -> Result<(), String> {
        let account = cx.account().map_err(|e| e.to_string())?;
        if self.tokens.is_bound(account, identity) {
            Ok(())
        } else {
            Err(format!("account {account} is not bound to miner {identity}"))
        }
    }
}
