use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bytes_b64;

/// Registration policy sent by a wallet as its first frame.
///
/// The wallet account itself comes from the authenticated connection; the
/// policy only lists the additional accounts this wallet is willing to sign
/// for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRegisterPolicy {
    #[serde(default)]
    pub support_accounts: Vec<String>,
}

/// Metadata describing what is being signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgMeta {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, with = "bytes_b64")]
    pub extra: Vec<u8>,
}

/// Payload of a `WalletSign` request.
///
/// `to_sign` is already the derived challenge, see [`crate::sign`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSignRequest {
    pub signer: String,
    #[serde(with = "bytes_b64")]
    pub to_sign: Vec<u8>,
    pub meta: MsgMeta,
}

/// A signature returned by a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(rename = "Type")]
    pub kind: u8,
    #[serde(rename = "Data", with = "bytes_b64")]
    pub data: Vec<u8>,
}

/// Public RPC body for `WalletHas`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletHasRequest {
    pub support_account: String,
    pub addr: String,
}

/// Public RPC body for `WalletSign`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSignParams {
    pub support_account: String,
    pub addr: String,
    #[serde(with = "bytes_b64")]
    pub to_sign: Vec<u8>,
    pub meta: MsgMeta,
}

/// Public RPC body for `AddNewAddress` / `RemoveAddress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressesRequest {
    pub channel_id: Uuid,
    pub addrs: Vec<String>,
}

/// Public RPC body for `SupportAccount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportAccountRequest {
    pub support_account: String,
}

/// Connection state of one wallet channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConnectState {
    pub channel_id: Uuid,
    pub ip: String,
    pub request_count: usize,
    pub create_time: time::OffsetDateTime,
    pub addrs: Vec<String>,
}

/// Snapshot of everything registered under one wallet account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDetail {
    pub account: String,
    pub support_accounts: Vec<String>,
    pub connect_states: Vec<WalletConnectState>,
}
