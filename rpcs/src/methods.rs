// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Typed wrappers over the legacy JSON-RPC methods the indexer relies on.
//!
//! Historical blocks are only reachable through these methods; the
//! `chainHead` follow window covers recent blocks alone, so backfill and
//! gap repair always come through here.

use crate::client::{RpcClient, RpcSubscription, rpc_params};
use crate::Error;
use primitive_types::H256;
use serde::{Deserialize, Serialize};
use sublens_core::{compact::encode_compact_u32, hashers::blake2_256, to_hex};

/// A block hash.
pub type Hash = H256;

/// An interface to the legacy RPC methods.
#[derive(Clone, Debug)]
pub struct LegacyRpcMethods {
    client: RpcClient,
}

impl LegacyRpcMethods {
    /// Instantiate the legacy RPC method interface.
    pub fn new(client: RpcClient) -> Self {
        LegacyRpcMethods { client }
    }

    /// Fetch the block hash at the given height, if any.
    pub async fn chain_get_block_hash(&self, height: Option<u32>) -> Result<Option<Hash>, Error> {
        self.client
            .request("chain_getBlockHash", rpc_params![height])
            .await
    }

    /// Fetch the hash of the latest finalized block.
    pub async fn chain_get_finalized_head(&self) -> Result<Hash, Error> {
        self.client
            .request("chain_getFinalizedHead", rpc_params![])
            .await
    }

    /// Fetch a header by block hash.
    pub async fn chain_get_header(&self, hash: Option<Hash>) -> Result<Option<Header>, Error> {
        self.client.request("chain_getHeader", rpc_params![hash]).await
    }

    /// Fetch a full block (header plus extrinsics) by hash.
    pub async fn chain_get_block(&self, hash: Option<Hash>) -> Result<Option<BlockDetails>, Error> {
        self.client.request("chain_getBlock", rpc_params![hash]).await
    }

    /// Fetch the runtime version in effect at the given block.
    pub async fn state_get_runtime_version(
        &self,
        at: Option<Hash>,
    ) -> Result<RuntimeVersion, Error> {
        self.client
            .request("state_getRuntimeVersion", rpc_params![at])
            .await
    }

    /// Fetch the raw SCALE-encoded runtime metadata at the given block.
    pub async fn state_get_metadata(&self, at: Option<Hash>) -> Result<Vec<u8>, Error> {
        let bytes: Bytes = self
            .client
            .request("state_getMetadata", rpc_params![at])
            .await?;
        Ok(bytes.0)
    }

    /// Fetch the raw bytes under a storage key at the given block.
    pub async fn state_get_storage(
        &self,
        key: &[u8],
        at: Option<Hash>,
    ) -> Result<Option<Vec<u8>>, Error> {
        let data: Option<Bytes> = self
            .client
            .request("state_getStorage", rpc_params![to_hex(key), at])
            .await?;
        Ok(data.map(|b| b.0))
    }

    /// Fetch the chain's arbitrary system properties (token decimals and
    /// symbol, ss58 format, ...).
    pub async fn system_properties(&self) -> Result<SystemProperties, Error> {
        self.client
            .request("system_properties", rpc_params![])
            .await
    }

    /// Subscribe to best block headers.
    pub async fn chain_subscribe_new_heads(&self) -> Result<RpcSubscription<Header>, Error> {
        self.client
            .subscribe(
                "chain_subscribeNewHeads",
                rpc_params![],
                "chain_unsubscribeNewHeads",
            )
            .await
    }

    /// Subscribe to finalized block headers.
    ///
    /// Note: this may not produce _every_ block in the finalized chain;
    /// sometimes multiple blocks are finalized at once, and in this case
    /// only the latest one is returned. The gap-verification pass fills
    /// the rest in.
    pub async fn chain_subscribe_finalized_heads(
        &self,
    ) -> Result<RpcSubscription<Header>, Error> {
        self.client
            .subscribe(
                "chain_subscribeFinalizedHeads",
                rpc_params![],
                "chain_unsubscribeFinalizedHeads",
            )
            .await
    }
}

/// A block header as served by the legacy RPC.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// The parent block's hash.
    pub parent_hash: Hash,
    /// The block height; hex on the wire.
    #[serde(deserialize_with = "deserialize_block_number")]
    pub number: u32,
    /// The state trie root.
    pub state_root: Hash,
    /// The extrinsics trie root.
    pub extrinsics_root: Hash,
    /// The digest logs, one hex blob per log.
    #[serde(default)]
    pub digest: Digest,
}

/// The digest carried in a header.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Digest {
    /// SCALE-encoded digest items as hex blobs.
    #[serde(default)]
    pub logs: Vec<String>,
}

impl Header {
    /// The Blake2-256 hash of this header, which is the block hash.
    ///
    /// The JSON form carries everything the SCALE form does, so the header
    /// is re-encoded here: parent hash, compact block number, the two
    /// roots, then the digest log vector whose items are already SCALE
    /// bytes on the wire.
    pub fn hash(&self) -> Result<Hash, Error> {
        let mut encoded = Vec::with_capacity(96 + self.digest.logs.len() * 40);
        encoded.extend_from_slice(self.parent_hash.as_bytes());
        encoded.extend_from_slice(&encode_compact_u32(self.number));
        encoded.extend_from_slice(self.state_root.as_bytes());
        encoded.extend_from_slice(self.extrinsics_root.as_bytes());
        encoded.extend_from_slice(&encode_compact_u32(self.digest.logs.len() as u32));
        for log in &self.digest.logs {
            let bytes = sublens_core::from_hex(log)
                .map_err(|e| Error::RequestRejected(format!("bad digest log hex: {e}")))?;
            encoded.extend_from_slice(&bytes);
        }
        Ok(H256(blake2_256(&encoded)))
    }
}

/// The response from `chain_getBlock`.
#[derive(Clone, Debug, Deserialize)]
pub struct BlockDetails {
    /// The block itself.
    pub block: Block,
}

/// Block details in the [`BlockDetails`].
#[derive(Clone, Debug, Deserialize)]
pub struct Block {
    /// The block header.
    pub header: Header,
    /// The accompanying extrinsics as hex blobs.
    pub extrinsics: Vec<String>,
}

/// The runtime version as obtained from `state_getRuntimeVersion`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersion {
    /// Version of the runtime specification. Metadata layout is stable
    /// within one spec version.
    pub spec_version: u32,
    /// Changes whenever an existing dispatchable changes shape.
    pub transaction_version: u32,
    /// Fields unnecessary to the indexer are collected here.
    #[serde(flatten)]
    pub other: std::collections::HashMap<String, serde_json::Value>,
}

/// System properties; an arbitrary JSON object.
pub type SystemProperties = serde_json::Map<String, serde_json::Value>;

/// A hex-encoded byte blob in JSON.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bytes(#[serde(with = "impl_serde::serialize")] pub Vec<u8>);

fn deserialize_block_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct NumberVisitor;

    impl serde::de::Visitor<'_> for NumberVisitor {
        type Value = u32;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a block number as a hex string or integer")
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<u32, E> {
            u32::try_from(v).map_err(|_| E::custom("block number out of range"))
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<u32, E> {
            let digits = v.strip_prefix("0x").unwrap_or(v);
            let radix = if digits.len() == v.len() { 10 } else { 16 };
            u32::from_str_radix(digits, radix)
                .map_err(|_| E::custom(format!("bad block number: {v}")))
        }
    }

    deserializer.deserialize_any(NumberVisitor)
}
