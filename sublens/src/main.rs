// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Service entry point: wire the store, the RPC pool, the caches and the
//! pipeline together, then run until SIGINT/SIGTERM.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use sublens::accounts::BalanceRefresher;
use sublens::cache::{TtlCache, spawn_refresher};
use sublens::health::{self, HealthContext};
use sublens::metrics::Metrics;
use sublens::pipeline::Indexer;
use sublens::plugins::registry::PluginRegistry;
use sublens::plugins::transfers::BalancesTransfers;
use sublens::plugins::Extension;
use sublens::runtimes::RuntimeCache;
use sublens::store::Store;
use sublens::{Config, Error};
use sublens_rpcs::{BalancedRpcClient, LegacyRpcMethods, RpcClient};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    tracing::info!(
        chain_id = %config.chain_id,
        endpoints = config.urls.len(),
        batch_size = config.batch_size,
        concurrency = config.effective_concurrency(),
        "sublens starting"
    );

    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;

    let rpc_pool = BalancedRpcClient::connect(&config.urls).await?;
    let methods = LegacyRpcMethods::new(RpcClient::new(rpc_pool.clone()));

    match methods.system_properties().await {
        Ok(properties) => tracing::info!(
            token_symbol = %properties.get("tokenSymbol").cloned().unwrap_or_default(),
            token_decimals = %properties.get("tokenDecimals").cloned().unwrap_or_default(),
            ss58_format = %properties.get("ss58Format").cloned().unwrap_or_default(),
            "connected to chain"
        ),
        Err(e) => tracing::warn!(error = %e, "could not fetch system properties"),
    }

    let metrics = Arc::new(Metrics::default());
    let runtimes = Arc::new(RuntimeCache::new(methods.clone()));

    let builtins: Vec<Arc<dyn Extension>> = vec![Arc::new(BalancesTransfers::default())];
    let plugins = Arc::new(PluginRegistry::discover(&config.extensions_dir, builtins)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Keep the chain properties warm for read-side consumers.
    let properties_cache = Arc::new(TtlCache::new(Duration::from_secs(600)));
    {
        let methods = methods.clone();
        spawn_refresher(
            properties_cache.clone(),
            "system_properties",
            Duration::from_secs(300),
            move || {
                let methods = methods.clone();
                async move { Ok(methods.system_properties().await?) }
            },
            shutdown_rx.clone(),
        );
    }

    let refresher = BalanceRefresher::new(
        store.clone(),
        methods.clone(),
        Duration::from_secs(config.balance_refresh_secs.max(1)),
        shutdown_rx.clone(),
    );
    let refresher_handle = tokio::spawn(refresher.run());

    let indexer = Arc::new(Indexer::new(
        store.clone(),
        methods,
        runtimes,
        plugins,
        metrics.clone(),
        &config,
        shutdown_rx.clone(),
    ));

    let health_handle = tokio::spawn(health::serve(
        config.health_port,
        HealthContext {
            store,
            chain_id: config.chain_id.clone(),
            metrics,
            rpc_pool,
            indexer: indexer.clone(),
            admin_key: config.admin_key.clone(),
        },
        shutdown_rx,
    ));
    let mut pipeline_handle = {
        let indexer = indexer.clone();
        tokio::spawn(async move { Box::pin(indexer.run()).await })
    };

    let joined = tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received; finishing in-flight work");
            let _ = shutdown_tx.send(true);
            pipeline_handle.await
        }
        result = &mut pipeline_handle => {
            let _ = shutdown_tx.send(true);
            result
        }
    };
    let _ = refresher_handle.await;
    let _ = health_handle.await;

    joined.map_err(|e| Error::Config(format!("pipeline task panicked: {e}")))??;
    tracing::info!("sublens stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "no SIGTERM handler; relying on ctrl-c");
            let _ = ctrl_c.await;
            return;
        }
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm.recv() => {}
    }
}
