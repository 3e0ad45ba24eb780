use std::sync::Arc;

use rgate_sdk::objects::{
    ComputeProofRequest, ConnectionStates, Method, PoStProof, ProofRegisterPolicy, ResponseEvent,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::validate_identity;
use crate::config::RequestConfig;
use crate::context::CallContext;
use crate::error::GatewayError;
use crate::events::{ChannelHandle, ChannelRegistry, Correlator};
use crate::validator::IdentityValidator;

const DOMAIN: &str = "proof";

/// Proof workers, keyed by miner address.
#[derive(Clone)]
pub struct ProofEventStream {
    registry: ChannelRegistry,
    correlator: Correlator,
    validator: Arc<dyn IdentityValidator>,
}

impl ProofEventStream {
    pub fn new(
        config: RequestConfig,
        validator: Arc<dyn IdentityValidator>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry: ChannelRegistry::new(DOMAIN, config.queue_size),
            correlator: Correlator::new(DOMAIN, config, shutdown),
            validator,
        }
    }

    /// Register a proof worker. The channel lives until `cx` is cancelled.
    #[instrument(skip_all, fields(miner = %policy.miner_address))]
    pub async fn listen_proof_event(
        &self,
        cx: &CallContext,
        policy: &ProofRegisterPolicy,
    ) -> Result<ChannelHandle, GatewayError> {
        validate_identity(self.validator.as_ref(), cx, &policy.miner_address).await?;
        Ok(self.registry.register(
            cx.cancel_token().clone(),
            &policy.miner_address,
            cx.ip_string(),
        ))
    }

    pub fn response_event(&self, response: ResponseEvent) {
        self.correlator.resolve_response(response);
    }

    pub fn reject_response(&self, id: Uuid, err: GatewayError) {
        self.correlator.reject_response(id, err);
    }

    pub async fn compute_proof(
        &self,
        cx: &CallContext,
        miner: &str,
        request: &ComputeProofRequest,
    ) -> Result<Vec<PoStProof>, GatewayError> {
        let channels = self.registry.select(miner)?;
        debug!(
            miner,
            channels = channels.len(),
            sectors = request.sector_infos.len(),
            height = request.height,
            "computing proof"
        );
        self.correlator
            .call(cx, &channels, Method::COMPUTE_PROOF, request)
            .await
    }

    pub fn has_miner(&self, miner: &str) -> bool {
        self.registry.contains(miner)
    }

    pub fn list_connected_miners(&self) -> Vec<String> {
        self.registry.identities()
    }

    pub fn list_miner_connection(&self, miner: &str) -> Result<ConnectionStates, GatewayError> {
        self.registry.list_one(miner)
    }
}
