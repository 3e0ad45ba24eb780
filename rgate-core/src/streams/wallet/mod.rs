//! Wallet channels.
//!
//! A wallet registers under its authenticated account. Before the channel
//! becomes visible the broker asks it for the addresses it holds
//! (`WalletList`); a wallet that cannot answer is never inserted.

mod registry;

use std::sync::Arc;

use rgate_sdk::objects::{
    Method, MsgMeta, ResponseEvent, Signature, WalletDetail, WalletRegisterPolicy,
    WalletSignRequest,
};
use rgate_sdk::sign::derive_sign_payload;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use self::registry::WalletRegistry;
use crate::config::RequestConfig;
use crate::context::CallContext;
use crate::error::GatewayError;
use crate::events::{Channel, ChannelHandle, Correlator, channel::spawn_lifecycle};

const DOMAIN: &str = "wallet";

#[derive(Clone)]
pub struct WalletEventStream {
    registry: WalletRegistry,
    correlator: Correlator,
    queue_size: usize,
}

impl WalletEventStream {
    pub fn new(config: RequestConfig, shutdown: CancellationToken) -> Self {
        Self {
            registry: WalletRegistry::default(),
            correlator: Correlator::new(DOMAIN, config, shutdown),
            queue_size: config.queue_size,
        }
    }

    /// Register a wallet channel for the caller's account.
    ///
    /// The handle is returned immediately so the transport can deliver
    /// `InitConnect` and the `WalletList` query; the channel is inserted once
    /// the query succeeds.
    pub async fn listen_wallet_event(
        &self,
        cx: &CallContext,
        policy: &WalletRegisterPolicy,
    ) -> Result<ChannelHandle, GatewayError> {
        let account = cx.account()?.to_owned();
        let (channel, events) = Channel::open(&account, cx.ip_string(), self.queue_size);
        channel.notify_connected();
        let handle = ChannelHandle {
            channel_id: channel.id(),
            events,
        };

        let stream = self.clone();
        let cx = cx.clone();
        let support_accounts = policy.support_accounts.clone();
        tokio::spawn(async move {
            let addrs: Vec<String> = match stream
                .correlator
                .call(&cx, &[channel.clone()], Method::WALLET_LIST, &())
                .await
            {
                Ok(addrs) => addrs,
                Err(e) => {
                    warn!(
                        account = %account,
                        channel_id = %channel.id(),
                        error = %e,
                        "wallet did not list its addresses, dropping channel"
                    );
                    return;
                }
            };

            info!(
                account = %account,
                channel_id = %channel.id(),
                ip = %channel.ip(),
                addrs = addrs.len(),
                "wallet registered"
            );
            stream
                .registry
                .insert(&account, &support_accounts, channel.clone(), addrs);

            let registry = stream.registry.clone();
            spawn_lifecycle(channel, cx.cancel_token().clone(), move |channel| {
                registry.remove(channel.identity(), channel.id());
            });
        });

        Ok(handle)
    }

    pub fn response_event(&self, response: ResponseEvent) {
        self.correlator.resolve_response(response);
    }

    pub fn reject_response(&self, id: Uuid, err: GatewayError) {
        self.correlator.reject_response(id, err);
    }

    /// Channels able to sign for `from` on behalf of `support_account`.
    pub fn get_channels(&self, support_account: &str, from: &str) -> Vec<Arc<Channel>> {
        self.registry.get_channels(support_account, from)
    }

    pub fn wallet_has(&self, support_account: &str, addr: &str) -> bool {
        !self.get_channels(support_account, addr).is_empty()
    }

    pub fn add_new_address(
        &self,
        cx: &CallContext,
        channel_id: Uuid,
        addrs: Vec<String>,
    ) -> Result<(), GatewayError> {
        self.registry
            .update_addrs(cx.account()?, channel_id, |set| set.extend(addrs))
    }

    pub fn remove_address(
        &self,
        cx: &CallContext,
        channel_id: Uuid,
        addrs: Vec<String>,
    ) -> Result<(), GatewayError> {
        self.registry.update_addrs(cx.account()?, channel_id, |set| {
            for addr in &addrs {
                set.remove(addr);
            }
        })
    }

    /// Let the caller's wallet sign for `support_account` too.
    pub fn support_account(
        &self,
        cx: &CallContext,
        support_account: &str,
    ) -> Result<(), GatewayError> {
        let account = cx.account()?;
        self.registry.add_support_account(account, support_account)?;
        info!(account, support_account, "support account added");
        Ok(())
    }

    /// Sign `to_sign` with the wallet holding `addr`.
    ///
    /// The wallet receives the derived challenge, not the raw bytes.
    pub async fn wallet_sign(
        &self,
        cx: &CallContext,
        support_account: &str,
        addr: &str,
        to_sign: &[u8],
        meta: MsgMeta,
    ) -> Result<Signature, GatewayError> {
        let channels = self.get_channels(support_account, addr);
        if channels.is_empty() {
            return Err(GatewayError::NoConnection(addr.to_owned()));
        }
        debug!(support_account, addr, channels = channels.len(), kind = %meta.kind, "signing");
        let request = WalletSignRequest {
            signer: addr.to_owned(),
            to_sign: derive_sign_payload(to_sign),
            meta,
        };
        self.correlator
            .call(cx, &channels, Method::WALLET_SIGN, &request)
            .await
    }

    pub fn list_wallet_info(&self) -> Vec<WalletDetail> {
        self.registry.list()
    }

    pub fn list_wallet_info_by_wallet(&self, account: &str) -> Result<WalletDetail, GatewayError> {
        self.registry.list_one(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::testing::{fast_config, spawn_worker, wait_until};

    fn meta() -> MsgMeta {
        MsgMeta {
            kind: "message".to_owned(),
            extra: vec![],
        }
    }

    /// A wallet answering `WalletList` with `addrs` and signing by echoing
    /// the challenge.
    async fn connect(
        stream: &WalletEventStream,
        cx: &CallContext,
        support: &[&str],
        addrs: &[&str],
    ) -> Uuid {
        let policy = WalletRegisterPolicy {
            support_accounts: support.iter().map(|s| s.to_string()).collect(),
        };
        let handle = stream.listen_wallet_event(cx, &policy).await.unwrap();
        let addrs: Vec<String> = addrs.iter().map(|s| s.to_string()).collect();
        let sink = stream.clone();
        spawn_worker(
            handle.events,
            move |req| match req.method.as_str() {
                Method::WALLET_LIST => Some(ResponseEvent::success(
                    req.id,
                    serde_json::to_vec(&addrs).unwrap(),
                )),
                Method::WALLET_SIGN => {
                    let sign: WalletSignRequest = serde_json::from_slice(&req.payload).unwrap();
                    let sig = Signature {
                        kind: 1,
                        data: sign.to_sign,
                    };
                    Some(ResponseEvent::success(req.id, serde_json::to_vec(&sig).unwrap()))
                }
                _ => None,
            },
            move |resp| sink.response_event(resp),
        );
        handle.channel_id
    }

    #[tokio::test]
    async fn test_listen_requires_account() {
        let stream = WalletEventStream::new(fast_config(), CancellationToken::new());
        let err = stream
            .listen_wallet_event(&CallContext::background(), &WalletRegisterPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::IdentityNotPresent));
    }

    #[tokio::test]
    async fn test_address_scoping() {
        let stream = WalletEventStream::new(fast_config(), CancellationToken::new());
        let alice = CallContext::background().with_account("alice");
        let channel_id = connect(&stream, &alice, &["bob"], &["t1"]).await;
        wait_until(|| stream.wallet_has("alice", "t1")).await;

        assert!(stream.wallet_has("bob", "t1"));
        assert!(!stream.wallet_has("carol", "t1"));
        assert!(!stream.wallet_has("bob", "t2"));

        stream
            .add_new_address(&alice, channel_id, vec!["t2".to_owned()])
            .unwrap();
        assert!(stream.wallet_has("bob", "t2"));

        let mallory = CallContext::background().with_account("mallory");
        let err = stream
            .remove_address(&mallory, channel_id, vec!["t2".to_owned()])
            .unwrap_err();
        assert!(matches!(err, GatewayError::ChannelNotFound(_)));

        stream
            .remove_address(&alice, channel_id, vec!["t2".to_owned(), "t9".to_owned()])
            .unwrap();
        assert!(!stream.wallet_has("bob", "t2"));

        stream.support_account(&alice, "carol").unwrap();
        assert!(stream.wallet_has("carol", "t1"));

        let detail = stream.list_wallet_info_by_wallet("alice").unwrap();
        assert_eq!(detail.support_accounts, vec!["alice", "bob", "carol"]);
        assert_eq!(detail.connect_states[0].addrs, vec!["t1"]);
    }

    #[tokio::test]
    async fn test_sign_sends_derived_payload() {
        let stream = WalletEventStream::new(fast_config(), CancellationToken::new());
        let alice = CallContext::background().with_account("alice");
        connect(&stream, &alice, &[], &["t1"]).await;
        wait_until(|| stream.wallet_has("alice", "t1")).await;

        let sig = stream
            .wallet_sign(&CallContext::background(), "alice", "t1", b"hello", meta())
            .await
            .unwrap();
        assert_eq!(sig.data, derive_sign_payload(b"hello"));

        let err = stream
            .wallet_sign(&CallContext::background(), "alice", "t2", b"hello", meta())
            .await
            .unwrap_err();
        assert!(err.is_no_connection());
    }

    #[tokio::test]
    async fn test_failed_listing_never_inserts() {
        let stream = WalletEventStream::new(fast_config(), CancellationToken::new());
        let alice = CallContext::background().with_account("alice");
        let mut handle = stream
            .listen_wallet_event(&alice, &WalletRegisterPolicy::default())
            .await
            .unwrap();
        let init = handle.events.recv().await.unwrap();
        assert_eq!(init.method, Method::INIT_CONNECT);
        let list = handle.events.recv().await.unwrap();
        stream.response_event(ResponseEvent::failure(list.id, "locked"));

        assert!(handle.events.recv().await.is_none());
        assert!(stream.list_wallet_info().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_removes_wallet() {
        let stream = WalletEventStream::new(fast_config(), CancellationToken::new());
        let alice = CallContext::background().with_account("alice");
        connect(&stream, &alice, &[], &["t1"]).await;
        wait_until(|| stream.wallet_has("alice", "t1")).await;

        alice.cancel_token().cancel();
        wait_until(|| stream.list_wallet_info().is_empty()).await;
        assert!(stream.list_wallet_info_by_wallet("alice").is_err());
    }
}
