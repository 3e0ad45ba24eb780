use std::sync::Arc;

use rgate_sdk::objects::{
    IsUnsealedRequest, MarketConnectionState, MarketRegisterPolicy, Method, ResponseEvent,
    UnsealRequest,
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

const DOMAIN: &str = "market";

/// Market agents, keyed by miner address.
#[derive(Clone)]
pub struct MarketEventStream {
    registry: ChannelRegistry,
    correlator: Correlator,
    validator: Arc<dyn IdentityValidator>,
}

impl MarketEventStream {
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

    #[instrument(skip_all, fields(miner = %policy.miner))]
    pub async fn listen_market_event(
        &self,
        cx: &CallContext,
        policy: &MarketRegisterPolicy,
    ) -> Result<ChannelHandle, GatewayError> {
        validate_identity(self.validator.as_ref(), cx, &policy.miner).await?;
        Ok(self
            .registry
            .register(cx.cancel_token().clone(), &policy.miner, cx.ip_string()))
    }

    pub fn response_event(&self, response: ResponseEvent) {
        self.correlator.resolve_response(response);
    }

    pub fn reject_response(&self, id: Uuid, err: GatewayError) {
        self.correlator.reject_response(id, err);
    }

    pub async fn is_unsealed(
        &self,
        cx: &CallContext,
        miner: &str,
        request: &IsUnsealedRequest,
    ) -> Result<bool, GatewayError> {
        let channels = self.registry.select(miner)?;
        self.correlator
            .call(cx, &channels, Method::IS_UNSEALED, request)
            .await
    }

    /// Ask the miner's agent to unseal a piece into `request.dest`.
    ///
    /// Only success or failure is reported; the response payload is ignored.
    pub async fn sectors_unseal_piece(
        &self,
        cx: &CallContext,
        miner: &str,
        request: &UnsealRequest,
    ) -> Result<(), GatewayError> {
        let channels = self.registry.select(miner)?;
        debug!(miner, piece_cid = %request.piece_cid, dest = %request.dest, "unsealing piece");
        let payload = serde_json::to_vec(request)?;
        self.correlator
            .send_request(cx, &channels, Method::SECTORS_UNSEAL_PIECE, payload)
            .await?;
        Ok(())
    }

    pub fn list_market_connections_state(&self) -> Vec<MarketConnectionState> {
        self.registry
            .list()
            .into_iter()
            .map(|(addr, conn)| MarketConnectionState { addr, conn })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::testing::{fast_config, spawn_worker};
    use crate::validator::AllowAll;
    use rgate_sdk::objects::{SectorId, SectorRef};

    fn sector() -> SectorRef {
        SectorRef {
            id: SectorId {
                miner: 1000,
                number: 7,
            },
            proof_type: 8,
        }
    }

    async fn registered(stream: &MarketEventStream, cx: &CallContext, unsealed: bool) {
        let handle = stream
            .listen_market_event(
                cx,
                &MarketRegisterPolicy {
                    miner: "f01000".to_owned(),
                },
            )
            .await
            .unwrap();
        let sink = stream.clone();
        spawn_worker(
            handle.events,
            move |req| match req.method.as_str() {
                Method::IS_UNSEALED => Some(ResponseEvent::success(
                    req.id,
                    serde_json::to_vec(&unsealed).unwrap(),
                )),
                Method::SECTORS_UNSEAL_PIECE => {
                    let got: UnsealRequest = serde_json::from_slice(&req.payload).unwrap();
                    if got.dest.is_empty() {
                        Some(ResponseEvent::failure(req.id, "missing dest"))
                    } else {
                        Some(ResponseEvent::success(req.id, vec![]))
                    }
                }
                _ => None,
            },
            move |resp| sink.response_event(resp),
        );
    }

    #[tokio::test]
    async fn test_is_unsealed() {
        let stream =
            MarketEventStream::new(fast_config(), Arc::new(AllowAll), CancellationToken::new());
        let cx = CallContext::background();
        registered(&stream, &cx, true).await;

        let request = IsUnsealedRequest {
            piece_cid: "baga6ea4sea".to_owned(),
            sector: sector(),
            offset: 0,
            size: 2048,
        };
        assert!(stream.is_unsealed(&cx, "f01000", &request).await.unwrap());
        let err = stream.is_unsealed(&cx, "f02000", &request).await.unwrap_err();
        assert!(err.is_no_connection());
    }

    #[tokio::test]
    async fn test_unseal_reports_remote_failure() {
        let stream =
            MarketEventStream::new(fast_config(), Arc::new(AllowAll), CancellationToken::new());
        let cx = CallContext::background();
        registered(&stream, &cx, false).await;

        let mut request = UnsealRequest {
            piece_cid: "baga6ea4sea".to_owned(),
            sector: sector(),
            offset: 0,
            size: 2048,
            dest: "/mnt/unsealed/piece".to_owned(),
        };
        stream
            .sectors_unseal_piece(&cx, "f01000", &request)
            .await
            .unwrap();

        request.dest.clear();
        let err = stream
            .sectors_unseal_piece(&cx, "f01000", &request)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Remote(msg) if msg == "missing dest"));

        let states = stream.list_market_connections_state();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].addr, "f01000");
        assert_eq!(states[0].conn.connection_count, 1);
    }
}
