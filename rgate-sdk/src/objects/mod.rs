pub mod cluster;
pub mod connection;
pub mod error;
pub mod event;
pub mod market;
pub mod proof;
pub mod wallet;

pub use cluster::{GossipDigest, MemberInfo, MemberMeta, MemberState};
pub use connection::{ConnectionInfo, ConnectionStates, MarketConnectionState};
pub use error::{ApiErrorBody, ErrorCode};
pub use event::{ConnectedCompleted, Method, RequestEvent, ResponseEvent};
pub use market::{
    IsUnsealedParams, IsUnsealedRequest, MarketRegisterPolicy, SectorId, SectorRef, UnsealParams,
    UnsealRequest,
};
pub use proof::{ComputeProofParams, ComputeProofRequest, PoStProof, ProofRegisterPolicy, SectorInfo};
pub use wallet::{
    AddressesRequest, MsgMeta, Signature, SupportAccountRequest, WalletConnectState,
    WalletDetail, WalletHasRequest, WalletRegisterPolicy, WalletSignRequest, WalletSignParams,
};

/// Serde helpers encoding byte buffers as unpadded base64 strings.
pub mod bytes_b64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&fast32::base64::RFC4648_NOPAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        fast32::base64::RFC4648_NOPAD
            .decode_str(s.trim_end_matches('='))
            .map_err(|e| serde::de::Error::custom(format!("invalid base64: {e:?}")))
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(b) => super::serialize(b, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            let s: Option<String> = Option::deserialize(deserializer)?;
            s.map(|s| {
                fast32::base64::RFC4648_NOPAD
                    .decode_str(s.trim_end_matches('='))
                    .map_err(|e| serde::de::Error::custom(format!("invalid base64: {e:?}")))
            })
            .transpose()
        }
    }
}
