// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! JSON-RPC access to Substrate nodes for the sublens indexer.
//!
//! The layering runs bottom-up: [`client::RpcClientT`] is the object-safe
//! transport trait (implemented for jsonrpsee's WS client and for the test
//! mock), [`pool::BalancedRpcClient`] spreads calls over several endpoints
//! with health tracking and failover, and [`methods::LegacyRpcMethods`]
//! puts typed wrappers over the legacy RPC surface the indexer uses.

pub mod client;
pub mod methods;
pub mod pool;

#[cfg(any(test, feature = "mock-client"))]
pub mod mock;

pub use client::{RpcClient, RpcClientT, RpcSubscription};
pub use methods::LegacyRpcMethods;
pub use pool::BalancedRpcClient;

/// This encapsulates any errors that could be emitted in this crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An error coming from the underlying RPC client.
    #[error("RPC error: client error: {0}")]
    Client(Box<dyn std::error::Error + Send + Sync + 'static>),
    /// The node answered, but with an RPC-level error object.
    #[error("RPC error: request rejected: {0}")]
    RequestRejected(String),
    /// Cannot deserialize the response.
    #[error("RPC error: cannot deserialize response: {0}")]
    Deserialization(serde_json::Error),
    /// The requested URL is insecure.
    #[error("RPC error: insecure URL: {0}")]
    InsecureUrl(String),
    /// Every configured endpoint was tried and none produced a response.
    #[error("RPC error: all {attempts} endpoint attempts failed")]
    AllEndpointsFailed {
        /// How many endpoint attempts were made.
        attempts: usize,
    },
    /// A subscription ended unexpectedly.
    #[error("RPC error: subscription dropped")]
    SubscriptionDropped,
}
