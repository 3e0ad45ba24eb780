use serde::{Deserialize, Serialize};

use super::bytes_b64;

/// Registration policy sent by a proof worker as its first frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRegisterPolicy {
    pub miner_address: String,
}

/// A sector participating in a window/winning PoSt computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectorInfo {
    pub seal_proof: i64,
    pub sector_number: u64,
    #[serde(rename = "SealedCID")]
    pub sealed_cid: String,
}

/// A proof produced by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoStProof {
    #[serde(rename = "PoStProof")]
    pub post_proof: i64,
    #[serde(rename = "ProofBytes", with = "bytes_b64")]
    pub proof_bytes: Vec<u8>,
}

/// Payload of a `ComputeProof` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeProofRequest {
    pub sector_infos: Vec<SectorInfo>,
    #[serde(with = "bytes_b64")]
    pub rand: Vec<u8>,
    pub height: i64,
    pub nw_version: u32,
}

/// Public RPC body for `ComputeProof`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeProofParams {
    pub miner: String,
    #[serde(flatten)]
    pub request: ComputeProofRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_proof_wire_names() {
        let proof = PoStProof {
            post_proof: 1,
            proof_bytes: vec![3, 4],
        };
        let value = serde_json::to_value(&proof).unwrap();
        assert_eq!(value["PoStProof"], 1);
        assert!(value["ProofBytes"].is_string());
    }

    #[test]
    fn test_compute_params_flatten() {
        let params = ComputeProofParams {
            miner: "f010".into(),
            request: ComputeProofRequest {
                sector_infos: vec![],
                rand: vec![1, 23],
                height: 100,
                nw_version: 10,
            },
        };
        let json = serde_json::to_string(&params).unwrap();
        let back: ComputeProofParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
