use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use rgate_sdk::objects::{
    ComputeProofParams, MemberInfo, PoStProof, Signature, UnsealParams, WalletSignParams,
};
use tracing::{debug, info, warn};

use super::{ClusterView, PeerConnector, PeerRpc};
use crate::context::CallContext;
use crate::error::GatewayError;

/// Re-issues domain calls to every other cluster member.
///
/// Aggregation:
/// - the first answer that is not a no-connection error wins, success or not
/// - if every member answered no-connection, [`GatewayError::NoGatewayHasIdentity`]
/// - transport failures are skipped; if no member answered at all the last
///   transport error is returned
#[derive(Clone)]
pub struct ClusterBroadcaster {
    view: Arc<dyn ClusterView>,
    connector: Arc<dyn PeerConnector>,
}

/// Outcome of asking members until one holds the identity.
struct Tally {
    answered: bool,
    transport: Option<GatewayError>,
}

impl Tally {
    fn new() -> Self {
        Self {
            answered: false,
            transport: None,
        }
    }

    /// Record a non-winning result. Returns the error if it settles the call.
    fn record(&mut self, peer: &str, err: GatewayError) -> Option<GatewayError> {
        match err {
            e if e.is_no_connection() => {
                debug!(peer, "peer has no connection");
                self.answered = true;
                None
            }
            e @ GatewayError::Peer { .. } => {
                warn!(peer, error = %e, "peer unreachable");
                self.transport = Some(e);
                None
            }
            e => Some(e),
        }
    }

    fn finish(self, identity: &str) -> GatewayError {
        match self.transport {
            Some(e) if !self.answered => e,
            _ => GatewayError::NoGatewayHasIdentity(identity.to_owned()),
        }
    }
}

impl ClusterBroadcaster {
    pub fn new(view: Arc<dyn ClusterView>, connector: Arc<dyn PeerConnector>) -> Self {
        Self { view, connector }
    }

    /// The local member followed by its peers.
    pub fn member_infos(&self) -> Vec<MemberInfo> {
        let mut members = vec![self.view.local_member()];
        members.extend(self.view.peers());
        members
    }

    fn connected_peers(&self, tally: &mut Tally) -> Vec<(String, Arc<dyn PeerRpc>)> {
        self.view
            .peers()
            .into_iter()
            .filter_map(|member| match self.connector.connect(&member) {
                Ok(rpc) => Some((member.name, rpc)),
                Err(e) => {
                    tally.record(&member.name, e);
                    None
                }
            })
            .collect()
    }

    /// Run `call` against every peer concurrently; first non-no-connection
    /// result wins.
    async fn broadcast<T, F, Fut>(
        &self,
        cx: &CallContext,
        identity: &str,
        call: F,
    ) -> Result<T, GatewayError>
    where
        F: Fn(Arc<dyn PeerRpc>, CallContext) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let cx = cx.without_broadcast();
        let mut tally = Tally::new();
        let peers = self.connected_peers(&mut tally);
        debug!(identity, peers = peers.len(), "broadcasting to cluster");

        let call = &call;
        let mut calls: FuturesUnordered<_> = peers
            .into_iter()
            .map(|(name, rpc)| {
                let cx = cx.clone();
                async move { (name, call(rpc, cx).await) }
            })
            .collect();

        loop {
            let next = tokio::select! {
                biased;
                _ = cx.cancelled() => return Err(GatewayError::Cancelled),
                next = calls.next() => next,
            };
            let Some((peer, result)) = next else {
                break;
            };
            match result {
                Ok(value) => {
                    info!(identity, peer = %peer, "served by peer");
                    return Ok(value);
                }
                Err(e) => {
                    if let Some(e) = tally.record(&peer, e) {
                        return Err(e);
                    }
                }
            }
        }
        Err(tally.finish(identity))
    }

    pub async fn compute_proof(
        &self,
        cx: &CallContext,
        params: &ComputeProofParams,
    ) -> Result<Vec<PoStProof>, GatewayError> {
        self.broadcast(cx, &params.miner, |rpc, cx| async move {
            rpc.compute_proof(&cx, params).await
        })
        .await
    }

    pub async fn sectors_unseal_piece(
        &self,
        cx: &CallContext,
        params: &UnsealParams,
    ) -> Result<(), GatewayError> {
        self.broadcast(cx, &params.miner, |rpc, cx| async move {
            rpc.sectors_unseal_piece(&cx, params).await
        })
        .await
    }

    /// Whether any member holds a wallet for `addr`; members are asked in
    /// turn.
    pub async fn wallet_has(
        &self,
        cx: &CallContext,
        support_account: &str,
        addr: &str,
    ) -> Result<bool, GatewayError> {
        let cx = cx.without_broadcast();
        let mut tally = Tally::new();
        for (peer, rpc) in self.connected_peers(&mut tally) {
            match rpc.wallet_has(&cx, support_account, addr).await {
                Ok(true) => return Ok(true),
                Ok(false) => tally.answered = true,
                Err(e) => {
                    if let Some(e) = tally.record(&peer, e) {
                        return Err(e);
                    }
                }
            }
        }
        match tally.transport {
            Some(e) if !tally.answered => Err(e),
            _ => Ok(false),
        }
    }

    /// Sign with the first member that has the wallet.
    pub async fn wallet_sign(
        &self,
        cx: &CallContext,
        params: &WalletSignParams,
    ) -> Result<Signature, GatewayError> {
        let cx = cx.without_broadcast();
        let mut tally = Tally::new();
        for (peer, rpc) in self.connected_peers(&mut tally) {
            let result = match rpc.wallet_has(&cx, &params.support_account, &params.addr).await {
                Ok(false) => {
                    tally.answered = true;
                    continue;
                }
                Ok(true) => rpc.wallet_sign(&cx, params).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(signature) => {
                    info!(addr = %params.addr, peer = %peer, "signed by peer");
                    return Ok(signature);
                }
                Err(e) => {
                    if let Some(e) = tally.record(&peer, e) {
                        return Err(e);
                    }
                }
            }
        }
        Err(tally.finish(&params.addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rgate_sdk::objects::{ComputeProofRequest, MemberMeta, MsgMeta};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn member(name: &str) -> MemberInfo {
        MemberInfo {
            name: name.to_owned(),
            addr: format!("http://{name}:45132"),
            meta: MemberMeta {
                api_endpoint: format!("http://{name}:45132"),
            },
        }
    }

    fn proof_params(miner: &str) -> ComputeProofParams {
        ComputeProofParams {
            miner: miner.to_owned(),
            request: ComputeProofRequest {
                sector_infos: vec![],
                rand: vec![1, 23],
                height: 100,
                nw_version: 10,
            },
        }
    }

    struct StaticView {
        local: MemberInfo,
        peers: Vec<MemberInfo>,
    }

    impl ClusterView for StaticView {
        fn local_member(&self) -> MemberInfo {
            self.local.clone()
        }

        fn peers(&self) -> Vec<MemberInfo> {
            self.peers.clone()
        }
    }

    /// One in-process broker: its local miners and wallet addresses, plus
    /// how many forwarded calls it served.
    struct FakeNode {
        miners: Vec<String>,
        wallet_addrs: Vec<String>,
        unreachable: bool,
        calls: AtomicUsize,
        saw_broadcast_flag: Mutex<Vec<bool>>,
    }

    impl FakeNode {
        fn new(miners: &[&str], wallet_addrs: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                miners: miners.iter().map(|s| s.to_string()).collect(),
                wallet_addrs: wallet_addrs.iter().map(|s| s.to_string()).collect(),
                unreachable: false,
                calls: AtomicUsize::new(0),
                saw_broadcast_flag: Mutex::new(vec![]),
            })
        }

        fn unreachable() -> Arc<Self> {
            Arc::new(Self {
                miners: vec![],
                wallet_addrs: vec![],
                unreachable: true,
                calls: AtomicUsize::new(0),
                saw_broadcast_flag: Mutex::new(vec![]),
            })
        }

        fn enter(&self, cx: &CallContext) -> Result<(), GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.saw_broadcast_flag
                .lock()
                .unwrap()
                .push(cx.no_broadcast());
            if self.unreachable {
                return Err(GatewayError::Peer {
                    peer: "down".to_owned(),
                    reason: "connection refused".to_owned(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PeerRpc for FakeNode {
        async fn wallet_has(
            &self,
            cx: &CallContext,
            _support_account: &str,
            addr: &str,
        ) -> Result<bool, GatewayError> {
            self.enter(cx)?;
            Ok(self.wallet_addrs.iter().any(|a| a == addr))
        }

        async fn wallet_sign(
            &self,
            cx: &CallContext,
            params: &WalletSignParams,
        ) -> Result<Signature, GatewayError> {
            self.enter(cx)?;
            Ok(Signature {
                kind: 1,
                data: params.to_sign.clone(),
            })
        }

        async fn compute_proof(
            &self,
            cx: &CallContext,
            params: &ComputeProofParams,
        ) -> Result<Vec<PoStProof>, GatewayError> {
            self.enter(cx)?;
            if !self.miners.contains(&params.miner) {
                return Err(GatewayError::NoConnection(params.miner.clone()));
            }
            // let the other members answer first
            tokio::task::yield_now().await;
            Ok(vec![PoStProof {
                post_proof: 1,
                proof_bytes: vec![3, 4],
            }])
        }

        async fn sectors_unseal_piece(
            &self,
            cx: &CallContext,
            params: &UnsealParams,
        ) -> Result<(), GatewayError> {
            self.enter(cx)?;
            if !self.miners.contains(&params.miner) {
                return Err(GatewayError::NoConnection(params.miner.clone()));
            }
            Ok(())
        }
    }

    struct FakeConnector(HashMap<String, Arc<FakeNode>>);

    impl PeerConnector for FakeConnector {
        fn connect(&self, member: &MemberInfo) -> Result<Arc<dyn PeerRpc>, GatewayError> {
            self.0
                .get(&member.name)
                .map(|node| node.clone() as Arc<dyn PeerRpc>)
                .ok_or_else(|| GatewayError::Peer {
                    peer: member.name.clone(),
                    reason: "unknown member".to_owned(),
                })
        }
    }

    /// `local`'s broadcaster over a cluster of `nodes`.
    fn broadcaster(local: &str, nodes: &[(&str, Arc<FakeNode>)]) -> ClusterBroadcaster {
        let peers = nodes
            .iter()
            .filter(|(name, _)| *name != local)
            .map(|(name, _)| member(name))
            .collect();
        let connector = FakeConnector(
            nodes
                .iter()
                .map(|(name, node)| (name.to_string(), node.clone()))
                .collect(),
        );
        ClusterBroadcaster::new(
            Arc::new(StaticView {
                local: member(local),
                peers,
            }),
            Arc::new(connector),
        )
    }

    #[tokio::test]
    async fn test_single_hop_in_three_node_ring() {
        let a = FakeNode::new(&[], &[]);
        let b = FakeNode::new(&[], &[]);
        let c = FakeNode::new(&["f010"], &[]);
        let nodes = [("a", a.clone()), ("b", b.clone()), ("c", c.clone())];

        let proofs = broadcaster("a", &nodes)
            .compute_proof(&CallContext::background(), &proof_params("f010"))
            .await
            .unwrap();
        assert_eq!(proofs[0].proof_bytes, vec![3, 4]);

        let remote_calls = b.calls.load(Ordering::SeqCst) + c.calls.load(Ordering::SeqCst);
        assert_eq!(remote_calls, 2);
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
        for node in [&b, &c] {
            assert_eq!(*node.saw_broadcast_flag.lock().unwrap(), vec![true]);
        }
    }

    #[tokio::test]
    async fn test_nobody_has_identity() {
        let nodes = [
            ("a", FakeNode::new(&[], &[])),
            ("b", FakeNode::new(&[], &[])),
            ("c", FakeNode::new(&[], &[])),
        ];
        let err = broadcaster("a", &nodes)
            .compute_proof(&CallContext::background(), &proof_params("f010"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoGatewayHasIdentity(id) if id == "f010"));
    }

    #[tokio::test]
    async fn test_no_peers() {
        let err = broadcaster("a", &[("a", FakeNode::new(&[], &[]))])
            .compute_proof(&CallContext::background(), &proof_params("f010"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoGatewayHasIdentity(_)));
    }

    #[tokio::test]
    async fn test_transport_failures_are_skipped() {
        let nodes = [
            ("a", FakeNode::new(&[], &[])),
            ("b", FakeNode::unreachable()),
            ("c", FakeNode::new(&["f010"], &[])),
        ];
        assert!(
            broadcaster("a", &nodes)
                .compute_proof(&CallContext::background(), &proof_params("f010"))
                .await
                .is_ok()
        );

        let all_down = [
            ("a", FakeNode::new(&[], &[])),
            ("b", FakeNode::unreachable()),
            ("c", FakeNode::unreachable()),
        ];
        let err = broadcaster("a", &all_down)
            .compute_proof(&CallContext::background(), &proof_params("f010"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Peer { .. }));
    }

    #[tokio::test]
    async fn test_wallet_sign_asks_has_first() {
        let b = FakeNode::new(&[], &[]);
        let c = FakeNode::new(&[], &["t1"]);
        let nodes = [("a", FakeNode::new(&[], &[])), ("b", b.clone()), ("c", c.clone())];
        let broadcaster = broadcaster("a", &nodes);

        assert!(
            broadcaster
                .wallet_has(&CallContext::background(), "alice", "t1")
                .await
                .unwrap()
        );
        assert!(
            !broadcaster
                .wallet_has(&CallContext::background(), "alice", "t9")
                .await
                .unwrap()
        );

        let params = WalletSignParams {
            support_account: "alice".to_owned(),
            addr: "t1".to_owned(),
            to_sign: b"hello".to_vec(),
            meta: MsgMeta {
                kind: "message".to_owned(),
                extra: vec![],
            },
        };
        let sig = broadcaster
            .wallet_sign(&CallContext::background(), &params)
            .await
            .unwrap();
        assert_eq!(sig.data, b"hello".to_vec());

        let missing = WalletSignParams {
            addr: "t9".to_owned(),
            ..params
        };
        let err = broadcaster
            .wallet_sign(&CallContext::background(), &missing)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoGatewayHasIdentity(addr) if addr == "t9"));
    }

    #[test]
    fn test_member_infos_lists_local_first() {
        let nodes = [
            ("a", FakeNode::new(&[], &[])),
            ("b", FakeNode::new(&[], &[])),
        ];
        let names: Vec<_> = broadcaster("a", &nodes)
            .member_infos()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
