// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The low level RPC client interface and its jsonrpsee implementation.

use crate::Error;
use futures::{Stream, StreamExt, TryStreamExt};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::value::RawValue;
use std::{future::Future, pin::Pin, sync::Arc, task::Poll};

/// A boxed future that is returned from the [`RpcClientT`] methods.
pub type RawRpcFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// The subscription returned from [`RpcClientT`]'s `subscribe_raw`.
pub struct RawRpcSubscription {
    /// The subscription stream.
    pub stream: Pin<Box<dyn Stream<Item = Result<Box<RawValue>, Error>> + Send + 'static>>,
    /// The ID associated with the subscription.
    pub id: Option<String>,
}

/// A trait describing low level JSON-RPC interactions, kept object-safe so
/// transports can be swapped out (jsonrpsee, the balanced pool, a mock).
/// Params are handed over already serialized as a JSON array, and results
/// come back still serialized, deferring deserialization to the caller.
pub trait RpcClientT: Send + Sync + 'static {
    /// Make a raw request for which we expect a single response back.
    fn request_raw<'a>(
        &'a self,
        method: &'a str,
        params: Option<Box<RawValue>>,
    ) -> RawRpcFuture<'a, Box<RawValue>>;

    /// Subscribe to some method, providing the method to call to
    /// unsubscribe from it again.
    fn subscribe_raw<'a>(
        &'a self,
        sub: &'a str,
        params: Option<Box<RawValue>>,
        unsub: &'a str,
    ) -> RawRpcFuture<'a, RawRpcSubscription>;
}

impl<T: RpcClientT> RpcClientT for Arc<T> {
    fn request_raw<'a>(
        &'a self,
        method: &'a str,
        params: Option<Box<RawValue>>,
    ) -> RawRpcFuture<'a, Box<RawValue>> {
        (**self).request_raw(method, params)
    }

    fn subscribe_raw<'a>(
        &'a self,
        sub: &'a str,
        params: Option<Box<RawValue>>,
        unsub: &'a str,
    ) -> RawRpcFuture<'a, RawRpcSubscription> {
        (**self).subscribe_raw(sub, params, unsub)
    }
}

/// A concrete wrapper around an [`RpcClientT`] which provides some higher
/// level helper methods and is cheaply cloneable.
#[derive(Clone)]
pub struct RpcClient {
    client: Arc<dyn RpcClientT>,
}

impl RpcClient {
    /// Create an RPC client pointed at some WS URL, currently based on
    /// [`jsonrpsee`].
    ///
    /// Errors if an insecure URL is provided; non-TLS transports are only
    /// allowed towards localhost.
    pub async fn from_url<U: AsRef<str>>(url: U) -> Result<Self, Error> {
        validate_url_is_secure(url.as_ref())?;
        RpcClient::from_insecure_url(url).await
    }

    /// Like [`RpcClient::from_url`], but permits `ws://` towards any host.
    pub async fn from_insecure_url<U: AsRef<str>>(url: U) -> Result<Self, Error> {
        let client = jsonrpsee::ws_client::WsClientBuilder::default()
            .max_buffer_capacity_per_subscription(4096)
            .build(url.as_ref())
            .await
            .map_err(|e| Error::Client(Box::new(e)))?;
        Ok(Self::new(client))
    }

    /// Create a new [`RpcClient`] from an arbitrary [`RpcClientT`]
    /// implementation.
    pub fn new<R: RpcClientT>(client: R) -> Self {
        RpcClient {
            client: Arc::new(client),
        }
    }

    /// Make an RPC request, given a method name and some parameters.
    pub async fn request<Res: DeserializeOwned>(
        &self,
        method: &str,
        params: RpcParams,
    ) -> Result<Res, Error> {
        let res = self.client.request_raw(method, params.build()).await?;
        let val = serde_json::from_str(res.get()).map_err(Error::Deserialization)?;
        Ok(val)
    }

    /// Subscribe to an RPC endpoint, providing the parameters and the
    /// method to call to unsubscribe from it again.
    pub async fn subscribe<Res: DeserializeOwned>(
        &self,
        sub: &str,
        params: RpcParams,
        unsub: &str,
    ) -> Result<RpcSubscription<Res>, Error> {
        let sub = self.client.subscribe_raw(sub, params.build(), unsub).await?;
        Ok(RpcSubscription::new(sub))
    }
}

impl<C: RpcClientT> From<C> for RpcClient {
    fn from(client: C) -> Self {
        RpcClient::new(client)
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RpcClient").finish()
    }
}

impl std::ops::Deref for RpcClient {
    type Target = dyn RpcClientT;
    fn deref(&self) -> &Self::Target {
        &*self.client
    }
}

/// Create some [`RpcParams`] to pass to our [`RpcClient`].
///
/// As with the [`serde_json::json!`] macro, this will panic if you provide
/// parameters which cannot successfully be serialized to JSON.
#[macro_export]
macro_rules! rpc_params {
    ($($p:expr), *) => {{
        // May be unused if empty; no params.
        #[allow(unused_mut)]
        let mut params = $crate::client::RpcParams::new();
        $(
            params.push($p).expect("values passed to rpc_params! must be serializable to JSON");
        )*
        params
    }}
}
pub use rpc_params;

/// This represents the parameters passed to an [`RpcClient`], and exists to
/// enforce that parameters are provided in the correct format.
#[derive(Debug, Clone, Default)]
pub struct RpcParams(Vec<u8>);

impl RpcParams {
    /// Create a new empty set of [`RpcParams`].
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Push a parameter into our [`RpcParams`]. This serializes it to JSON
    /// in the process, and so will return an error if this is not possible.
    pub fn push<P: Serialize>(&mut self, param: P) -> Result<(), Error> {
        if self.0.is_empty() {
            self.0.push(b'[');
        } else {
            self.0.push(b',')
        }
        serde_json::to_writer(&mut self.0, &param).map_err(Error::Deserialization)?;
        Ok(())
    }

    /// Build a [`RawValue`] from our params, returning `None` if no
    /// parameters were provided.
    pub fn build(mut self) -> Option<Box<RawValue>> {
        if self.0.is_empty() {
            None
        } else {
            self.0.push(b']');
            let s = String::from_utf8(self.0).expect("JSON serialization produces valid UTF-8");
            Some(RawValue::from_string(s).expect("Should be valid JSON"))
        }
    }
}

/// A generic RPC subscription. This implements [`Stream`], and so most of
/// the functionality you'll need to interact with it comes from the
/// [`StreamExt`] extension trait.
pub struct RpcSubscription<Res> {
    inner: RawRpcSubscription,
    _marker: std::marker::PhantomData<Res>,
}

impl<Res> RpcSubscription<Res> {
    /// Creates a new [`RpcSubscription`].
    pub fn new(inner: RawRpcSubscription) -> Self {
        Self {
            inner,
            _marker: std::marker::PhantomData,
        }
    }

    /// Obtain the ID associated with this subscription.
    pub fn subscription_id(&self) -> Option<&str> {
        self.inner.id.as_deref()
    }
}

impl<Res: DeserializeOwned> RpcSubscription<Res> {
    /// Returns the next item in the stream; a wrapper around
    /// [`StreamExt::next()`] to avoid the extra import.
    pub async fn next(&mut self) -> Option<Result<Res, Error>> {
        StreamExt::next(self).await
    }
}

impl<Res> std::marker::Unpin for RpcSubscription<Res> {}

impl<Res: DeserializeOwned> Stream for RpcSubscription<Res> {
    type Item = Result<Res, Error>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let res = futures::ready!(self.inner.stream.poll_next_unpin(cx));

        // Decode the inner RawValue to the type we're expecting and map
        // any errors to the right shape:
        let res = res.map(|r| {
            r.and_then(|raw_val| {
                serde_json::from_str(raw_val.get()).map_err(Error::Deserialization)
            })
        });

        Poll::Ready(res)
    }
}

// The jsonrpsee client handles the JSON-RPC envelope itself; node-side
// error objects surface as `Call` errors here.
impl RpcClientT for jsonrpsee::core::client::Client {
    fn request_raw<'a>(
        &'a self,
        method: &'a str,
        params: Option<Box<RawValue>>,
    ) -> RawRpcFuture<'a, Box<RawValue>> {
        use jsonrpsee::core::client::ClientT;
        Box::pin(async move {
            let res = ClientT::request(self, method, Params(params))
                .await
                .map_err(|e| match e {
                    jsonrpsee::core::client::Error::Call(e) => {
                        Error::RequestRejected(e.to_string())
                    }
                    other => Error::Client(Box::new(other)),
                })?;
            Ok(res)
        })
    }

    fn subscribe_raw<'a>(
        &'a self,
        sub: &'a str,
        params: Option<Box<RawValue>>,
        unsub: &'a str,
    ) -> RawRpcFuture<'a, RawRpcSubscription> {
        use jsonrpsee::core::client::{SubscriptionClientT, SubscriptionKind};
        use jsonrpsee::types::SubscriptionId;
        Box::pin(async move {
            let stream = SubscriptionClientT::subscribe::<Box<RawValue>, _>(
                self,
                sub,
                Params(params),
                unsub,
            )
            .await
            .map_err(|e| Error::Client(Box::new(e)))?;

            let id = match stream.kind() {
                SubscriptionKind::Subscription(SubscriptionId::Str(id)) => {
                    Some(id.clone().into_owned())
                }
                _ => None,
            };

            let stream = stream.map_err(|e| Error::Client(Box::new(e))).boxed();
            Ok(RawRpcSubscription { stream, id })
        })
    }
}

struct Params(Option<Box<RawValue>>);

impl jsonrpsee::core::traits::ToRpcParams for Params {
    fn to_rpc_params(self) -> Result<Option<Box<RawValue>>, serde_json::Error> {
        Ok(self.0)
    }
}

/// A URL is considered secure if it uses a TLS scheme or refers to
/// localhost.
fn validate_url_is_secure(url: &str) -> Result<(), Error> {
    let parsed = url::Url::parse(url).map_err(|e| Error::Client(Box::new(e)))?;
    let secure_scheme = parsed.scheme() == "https" || parsed.scheme() == "wss";
    let is_localhost = parsed.host().is_some_and(|h| match h {
        url::Host::Domain(d) => d == "localhost",
        url::Host::Ipv4(ip) => ip.is_loopback(),
        url::Host::Ipv6(ip) => ip.is_loopback(),
    });
    if secure_scheme || is_localhost {
        Ok(())
    } else {
        Err(Error::InsecureUrl(url.into()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rpc_params_build_a_json_array() {
        let params: RpcParams = rpc_params![];
        assert!(params.build().is_none());

        let params: RpcParams = rpc_params![1, true, "foo"];
        assert_eq!(params.build().unwrap().get(), r#"[1,true,"foo"]"#);
    }

    #[test]
    fn secure_url_check() {
        assert!(validate_url_is_secure("wss://rpc.polkadot.io").is_ok());
        assert!(validate_url_is_secure("ws://localhost:9944").is_ok());
        assert!(validate_url_is_secure("ws://127.0.0.1:9944").is_ok());
        assert!(validate_url_is_secure("ws://example.com:9944").is_err());
    }
}
