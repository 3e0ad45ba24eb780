//! Wallet account → channels and the addresses each channel signs for.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use itertools::Itertools;
use rgate_sdk::objects::{WalletConnectState, WalletDetail};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::events::Channel;

struct WalletChannel {
    channel: Arc<Channel>,
    addrs: HashSet<String>,
}

/// Everything registered under one wallet account.
struct WalletInfo {
    /// Accounts this wallet signs for; always contains the wallet account.
    support_accounts: HashSet<String>,
    channels: HashMap<Uuid, WalletChannel>,
}

type Entries = HashMap<String, WalletInfo>;

#[derive(Clone, Default)]
pub(crate) struct WalletRegistry {
    entries: Arc<Mutex<Entries>>,
}

impl WalletRegistry {
    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(
        &self,
        account: &str,
        support_accounts: &[String],
        channel: Arc<Channel>,
        addrs: impl IntoIterator<Item = String>,
    ) {
        let mut entries = self.entries();
        let info = entries
            .entry(account.to_owned())
            .or_insert_with(|| WalletInfo {
                support_accounts: HashSet::from([account.to_owned()]),
                channels: HashMap::new(),
            });
        info.support_accounts
            .extend(support_accounts.iter().cloned());
        info.channels.insert(
            channel.id(),
            WalletChannel {
                channel,
                addrs: addrs.into_iter().collect(),
            },
        );
    }

    /// Drop one channel and its address set; the account goes with its last
    /// channel.
    pub fn remove(&self, account: &str, channel_id: Uuid) {
        let mut entries = self.entries();
        let Some(info) = entries.get_mut(account) else {
            return;
        };
        info.channels.remove(&channel_id);
        if info.channels.is_empty() {
            entries.remove(account);
            info!(account, "wallet account unregistered");
        }
    }

    /// Channels of every account that supports `support_account` and
    /// claims `addr`.
    pub fn get_channels(&self, support_account: &str, addr: &str) -> Vec<Arc<Channel>> {
        self.entries()
            .values()
            .filter(|info| info.support_accounts.contains(support_account))
            .flat_map(|info| info.channels.values())
            .filter(|wc| wc.addrs.contains(addr))
            .map(|wc| wc.channel.clone())
            .collect()
    }

    /// Apply `f` to the address set of a channel owned by `account`.
    pub fn update_addrs<F>(&self, account: &str, channel_id: Uuid, f: F) -> Result<(), GatewayError>
    where
        F: FnOnce(&mut HashSet<String>),
    {
        let mut entries = self.entries();
        let wc = entries
            .get_mut(account)
            .and_then(|info| info.channels.get_mut(&channel_id))
            .ok_or(GatewayError::ChannelNotFound(channel_id))?;
        f(&mut wc.addrs);
        debug!(account, %channel_id, addrs = wc.addrs.len(), "wallet addresses updated");
        Ok(())
    }

    pub fn add_support_account(&self, account: &str, support: &str) -> Result<(), GatewayError> {
        let mut entries = self.entries();
        let info = entries
            .get_mut(account)
            .ok_or_else(|| GatewayError::NoConnection(account.to_owned()))?;
        info.support_accounts.insert(support.to_owned());
        Ok(())
    }

    pub fn list(&self) -> Vec<WalletDetail> {
        self.entries()
            .iter()
            .sorted_by(|a, b| a.0.cmp(b.0))
            .map(|(account, info)| detail(account, info))
            .collect()
    }

    pub fn list_one(&self, account: &str) -> Result<WalletDetail, GatewayError> {
        self.entries()
            .get(account)
            .map(|info| detail(account, info))
            .ok_or_else(|| GatewayError::NoConnection(account.to_owned()))
    }
}

fn detail(account: &str, info: &WalletInfo) -> WalletDetail {
    WalletDetail {
        account: account.to_owned(),
        support_accounts: info.support_accounts.iter().cloned().sorted().collect(),
        connect_states: info
            .channels
            .values()
            .map(|wc| {
                let conn = wc.channel.info();
                WalletConnectState {
                    channel_id: conn.channel_id,
                    ip: conn.ip,
                    request_count: conn.request_count,
                    create_time: conn.create_time,
                    addrs: wc.addrs.iter().cloned().sorted().collect(),
                }
            })
            .sorted_by_key(|state| state.create_time)
            .collect(),
    }
}
