// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! A minimal HTTP responder for `/health` and `/metrics`.
//!
//! Deliberately not a full web framework: one listener, one request per
//! connection, JSON bodies. External services poll it; the REST API
//! proper lives elsewhere.

use crate::Error;
use crate::metrics::Metrics;
use crate::pipeline::Indexer;
use crate::store::Store;
use std::sync::Arc;
use sublens_rpcs::BalancedRpcClient;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Everything the endpoint reports on and operates.
#[derive(Clone)]
pub struct HealthContext {
    /// The store, for the indexer_state row.
    pub store: Store,
    /// Which chain's state row to report.
    pub chain_id: String,
    /// Throughput counters.
    pub metrics: Arc<Metrics>,
    /// The RPC pool, for endpoint health.
    pub rpc_pool: BalancedRpcClient,
    /// The pipeline, for the pause/resume maintenance operations.
    pub indexer: Arc<Indexer>,
    /// Key required for maintenance operations; absent disables them.
    pub admin_key: Option<String>,
}

/// Serve until shutdown. Binds immediately so callers can fail fast on a
/// busy port.
pub async fn serve(
    port: u16,
    ctx: HealthContext,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "health endpoint listening");
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
                continue;
            }
        };
        match accepted {
            Ok((stream, _addr)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle(stream, ctx).await {
                        tracing::debug!(error = %e, "health request failed");
                    }
                });
            }
            Err(e) => tracing::warn!(error = %e, "health accept failed"),
        }
    }
}

async fn handle(mut stream: tokio::net::TcpStream, ctx: HealthContext) -> Result<(), Error> {
    let mut buffer = [0u8; 1024];
    let read = stream.read(&mut buffer).await?;

    let mut headers = [httparse::EMPTY_HEADER; 16];
    let mut request = httparse::Request::new(&mut headers);
    let (method, path) = match request.parse(&buffer[..read]) {
        Ok(_) => (
            request.method.unwrap_or(""),
            request.path.unwrap_or(""),
        ),
        Err(_) => ("", ""),
    };
    let admin_key_header = request
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("x-admin-key"))
        .map(|h| h.value.to_vec());

    let (status, body) = match (method, path) {
        ("POST", "/admin/pause") | ("POST", "/admin/resume") => {
            let authorized = matches!(
                (&ctx.admin_key, &admin_key_header),
                (Some(expected), Some(given)) if expected.as_bytes() == given.as_slice()
            );
            if !authorized {
                ("403 Forbidden", r#"{"error":"bad admin key"}"#.to_owned())
            } else {
                let result = if path == "/admin/pause" {
                    ctx.indexer.pause().await
                } else {
                    ctx.indexer.resume().await
                };
                match result {
                    Ok(()) => ("200 OK", r#"{"ok":true}"#.to_owned()),
                    Err(e) => (
                        "500 Internal Server Error",
                        serde_json::to_string(&serde_json::json!({"error": e.to_string()}))?,
                    ),
                }
            }
        }
        (_, "/health") => {
            let state = ctx.store.indexer_state(&ctx.chain_id).await.ok().flatten();
            let body = serde_json::to_string(&serde_json::json!({
                "chain_id": ctx.chain_id,
                "state": state.as_ref().map(|row| row.state.clone()),
                "last_finalized": state.as_ref().map(|row| row.last_finalized),
                "last_best": state.as_ref().map(|row| row.last_best),
                "uptime_seconds": ctx.metrics.snapshot().uptime_seconds,
            }))?;
            ("200 OK", body)
        }
        (_, "/metrics") => {
            let body = serde_json::to_string(&serde_json::json!({
                "indexer": ctx.metrics.snapshot(),
                "rpc_pool": ctx.rpc_pool.snapshot(),
            }))?;
            ("200 OK", body)
        }
        (_, other) => {
            tracing::debug!(path = other, "request at unknown path");
            ("404 Not Found", r#"{"error":"not found"}"#.to_owned())
        }
    };

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len(),
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
