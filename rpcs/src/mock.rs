// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! A programmable [`RpcClientT`] implementation, useful for testing.

use crate::Error;
use crate::client::{RawRpcFuture, RawRpcSubscription, RpcClientT};
use futures::StreamExt;
use serde_json::value::RawValue;

type MethodHandler =
    Box<dyn Fn(&str, Option<Box<RawValue>>) -> Result<Box<RawValue>, Error> + Send + Sync>;
type SubscriptionHandler =
    Box<dyn Fn(&str, Option<Box<RawValue>>) -> Result<RawRpcSubscription, Error> + Send + Sync>;

/// A mock RPC client that responds programmatically to requests.
pub struct MockRpcClient {
    method_handler: MethodHandler,
    subscription_handler: SubscriptionHandler,
}

impl MockRpcClient {
    /// Create a mock answering method calls with the given handler.
    /// Subscriptions error until [`Self::with_subscriptions`] is used.
    pub fn new<F>(method_handler: F) -> Self
    where
        F: Fn(&str, Option<Box<RawValue>>) -> Result<Box<RawValue>, Error>
            + Send
            + Sync
            + 'static,
    {
        MockRpcClient {
            method_handler: Box::new(method_handler),
            subscription_handler: Box::new(|sub, _| {
                Err(Error::RequestRejected(format!(
                    "no subscription handler installed for {sub}"
                )))
            }),
        }
    }

    /// Install a subscription handler.
    pub fn with_subscriptions<F>(mut self, subscription_handler: F) -> Self
    where
        F: Fn(&str, Option<Box<RawValue>>) -> Result<RawRpcSubscription, Error>
            + Send
            + Sync
            + 'static,
    {
        self.subscription_handler = Box::new(subscription_handler);
        self
    }

    /// Serialize a value into the raw JSON a handler must return.
    pub fn json<T: serde::Serialize>(value: T) -> Result<Box<RawValue>, Error> {
        let json = serde_json::to_string(&value).map_err(Error::Deserialization)?;
        RawValue::from_string(json).map_err(Error::Deserialization)
    }

    /// Build a subscription that yields the given items and then ends.
    pub fn subscription_of<T: serde::Serialize>(
        items: Vec<T>,
    ) -> Result<RawRpcSubscription, Error> {
        let raw: Result<Vec<Box<RawValue>>, Error> =
            items.into_iter().map(Self::json).collect();
        Ok(RawRpcSubscription {
            stream: futures::stream::iter(raw?.into_iter().map(Ok)).boxed(),
            id: Some("mock".into()),
        })
    }
}

impl RpcClientT for MockRpcClient {
    fn request_raw<'a>(
        &'a self,
        method: &'a str,
        params: Option<Box<RawValue>>,
    ) -> RawRpcFuture<'a, Box<RawValue>> {
        let res = (self.method_handler)(method, params);
        Box::pin(async move { res })
    }

    fn subscribe_raw<'a>(
        &'a self,
        sub: &'a str,
        params: Option<Box<RawValue>>,
        _unsub: &'a str,
    ) -> RawRpcFuture<'a, RawRpcSubscription> {
        let res = (self.subscription_handler)(sub, params);
        Box::pin(async move { res })
    }
}
