//! Identity-scoped channel registry used by the proof and market streams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use itertools::Itertools;
use rgate_sdk::objects::ConnectionStates;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::channel::{Channel, ChannelHandle, spawn_lifecycle};
use crate::error::GatewayError;

type Entries = HashMap<String, HashMap<Uuid, Arc<Channel>>>;

/// Maps an identity to its live channels.
///
/// An identity is present only while it has at least one channel.
#[derive(Clone)]
pub struct ChannelRegistry {
    domain: &'static str,
    queue_size: usize,
    entries: Arc<Mutex<Entries>>,
}

impl ChannelRegistry {
    pub fn new(domain: &'static str, queue_size: usize) -> Self {
        Self {
            domain,
            queue_size,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        lock(&self.entries)
    }

    /// Register a channel for `identity` that lives until `cancel` fires.
    pub fn register(
        &self,
        cancel: CancellationToken,
        identity: &str,
        ip: impl Into<String>,
    ) -> ChannelHandle {
        let (channel, events) = Channel::open(identity, ip, self.queue_size);
        channel.notify_connected();

        let channel_count = {
            let mut entries = self.entries();
            let channels = entries.entry(identity.to_owned()).or_default();
            channels.insert(channel.id(), channel.clone());
            channels.len()
        };
        info!(
            domain = self.domain,
            identity,
            channel_id = %channel.id(),
            ip = %channel.ip(),
            channel_count,
            "channel registered"
        );

        let handle = ChannelHandle {
            channel_id: channel.id(),
            events,
        };

        let entries = self.entries.clone();
        let domain = self.domain;
        spawn_lifecycle(channel, cancel, move |channel| {
            let mut entries = lock(&entries);
            let remaining = match entries.get_mut(channel.identity()) {
                Some(channels) => {
                    channels.remove(&channel.id());
                    channels.len()
                }
                None => 0,
            };
            if remaining == 0 {
                entries.remove(channel.identity());
            }
            info!(
                domain,
                identity = %channel.identity(),
                channel_id = %channel.id(),
                remaining,
                "channel unregistered"
            );
        });

        handle
    }

    /// All channels of `identity`, in no particular order.
    pub fn select(&self, identity: &str) -> Result<Vec<Arc<Channel>>, GatewayError> {
        self.entries()
            .get(identity)
            .filter(|channels| !channels.is_empty())
            .map(|channels| channels.values().cloned().collect())
            .ok_or_else(|| GatewayError::NoConnection(identity.to_owned()))
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries().contains_key(identity)
    }

    /// Registered identities, sorted.
    pub fn identities(&self) -> Vec<String> {
        self.entries().keys().cloned().sorted().collect()
    }

    pub fn list_one(&self, identity: &str) -> Result<ConnectionStates, GatewayError> {
        let channels = self.select(identity)?;
        Ok(snapshot(&channels))
    }

    /// Snapshot of every identity's channels, sorted by identity.
    pub fn list(&self) -> Vec<(String, ConnectionStates)> {
        let entries = self.entries();
        entries
            .iter()
            .sorted_by(|a, b| a.0.cmp(b.0))
            .map(|(identity, channels)| {
                let channels: Vec<_> = channels.values().cloned().collect();
                (identity.clone(), snapshot(&channels))
            })
            .collect()
    }
}

fn lock(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connection snapshot, oldest channel first.
pub(crate) fn snapshot(channels: &[Arc<Channel>]) -> ConnectionStates {
    ConnectionStates::new(
        channels
            .iter()
            .map(|c| c.info())
            .sorted_by_key(|info| info.create_time)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelState;
    use rgate_sdk::objects::Method;
    use std::time::Duration;

    async fn wait_until(mut f: impl FnMut() -> bool) {
        for _ in 0..100 {
            if f() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_select_unknown_identity() {
        let registry = ChannelRegistry::new("proof", 4);
        let err = registry.select("f099").unwrap_err();
        assert!(matches!(err, GatewayError::NoConnection(id) if id == "f099"));
        assert!(registry.list_one("f099").is_err());
    }

    #[tokio::test]
    async fn test_register_sends_init_connect_first() {
        let registry = ChannelRegistry::new("proof", 4);
        let mut handle = registry.register(CancellationToken::new(), "f010", "10.0.0.1");
        let first = handle.events.recv().await.unwrap();
        assert_eq!(first.method, Method::INIT_CONNECT);
        assert_eq!(registry.select("f010").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_removes_channel_and_entry() {
        let registry = ChannelRegistry::new("proof", 4);
        let first = CancellationToken::new();
        let second = CancellationToken::new();
        let h1 = registry.register(first.clone(), "f010", "10.0.0.1");
        let _h2 = registry.register(second.clone(), "f010", "10.0.0.2");
        assert_eq!(registry.list_one("f010").unwrap().connection_count, 2);

        let channel = registry
            .select("f010")
            .unwrap()
            .into_iter()
            .find(|c| c.id() == h1.channel_id)
            .unwrap();

        first.cancel();
        wait_until(|| registry.select("f010").map(|c| c.len()).unwrap_or(0) == 1).await;
        wait_until(|| channel.state() == ChannelState::Removed).await;

        second.cancel();
        wait_until(|| !registry.contains("f010")).await;
        assert!(registry.identities().is_empty());
        assert!(registry.list().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_channel_closes_queue() {
        let registry = ChannelRegistry::new("proof", 4);
        let cancel = CancellationToken::new();
        let mut handle = registry.register(cancel.clone(), "f010", "10.0.0.1");
        let _init = handle.events.recv().await.unwrap();

        cancel.cancel();
        wait_until(|| !registry.contains("f010")).await;
        assert!(handle.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_list_sorted_by_identity() {
        let registry = ChannelRegistry::new("market", 4);
        let _b = registry.register(CancellationToken::new(), "f020", "10.0.0.2");
        let _a = registry.register(CancellationToken::new(), "f010", "10.0.0.1");
        let listed: Vec<_> = registry.list().into_iter().map(|(id, _)| id).collect();
        assert_eq!(listed, vec!["f010".to_owned(), "f020".to_owned()]);
    }
}
