use serde::{Deserialize, Serialize};

/// Registration policy sent by a market worker as its first frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRegisterPolicy {
    pub miner: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectorId {
    pub miner: u64,
    pub number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectorRef {
    #[serde(rename = "ID")]
    pub id: SectorId,
    pub proof_type: i64,
}

/// Payload of an `IsUnsealed` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsUnsealedRequest {
    pub piece_cid: String,
    pub sector: SectorRef,
    pub offset: u64,
    pub size: u64,
}

/// Payload of a `SectorsUnsealPiece` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsealRequest {
    pub piece_cid: String,
    pub sector: SectorRef,
    pub offset: u64,
    pub size: u64,
    /// Where the worker should place the unsealed piece.
    pub dest: String,
}

/// Public RPC body for `IsUnsealed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsUnsealedParams {
    pub miner: String,
    #[serde(flatten)]
    pub request: IsUnsealedRequest,
}

/// Public RPC body for `SectorsUnsealPiece`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsealParams {
    pub miner: String,
    #[serde(flatten)]
    pub request: UnsealRequest,
}
