// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Discovery, migration, backfill and dispatch of extensions.

use super::{BlockCtx, EventCtx, Extension, ExtrinsicCtx, Manifest};
use crate::Error;
use crate::store::{Store, Tx};
use sqlx::Acquire;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

// Stored events are replayed to a freshly-migrated extension in pages of
// this many rows.
const BACKFILL_PAGE: i64 = 1_000;

struct Registered {
    manifest: Manifest,
    handler: Arc<dyn Extension>,
}

/// The set of enabled extensions and their dispatch indexes.
#[derive(Default)]
pub struct PluginRegistry {
    extensions: Vec<Registered>,
    by_event: HashMap<String, Vec<usize>>,
    by_call: HashMap<String, Vec<usize>>,
}

impl PluginRegistry {
    /// Discover extensions from a manifest directory. Each `*.json` file
    /// is a [`Manifest`] whose `id` must match one of the compiled-in
    /// extensions; the file's event/call lists are authoritative, so a
    /// deployment can narrow what an extension receives.
    pub fn discover(dir: &Path, available: Vec<Arc<dyn Extension>>) -> Result<Self, Error> {
        let mut by_id: HashMap<String, Arc<dyn Extension>> = available
            .into_iter()
            .map(|ext| (ext.manifest().id.clone(), ext))
            .collect();

        let mut registry = PluginRegistry::default();
        if !dir.is_dir() {
            tracing::info!(dir = %dir.display(), "no extensions directory; none enabled");
            return Ok(registry);
        }

        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();

        for path in entries {
            let raw = std::fs::read_to_string(&path)?;
            let manifest: Manifest = match serde_json::from_str(&raw) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "unparseable manifest; skipping");
                    continue;
                }
            };
            let Some(handler) = by_id.remove(&manifest.id) else {
                tracing::warn!(
                    id = %manifest.id,
                    file = %path.display(),
                    "manifest names no compiled-in extension; skipping"
                );
                continue;
            };
            tracing::info!(id = %manifest.id, version = %manifest.version, "extension enabled");
            registry.register(manifest, handler);
        }
        Ok(registry)
    }

    /// Register the given extensions with their compiled-in manifests,
    /// bypassing directory discovery.
    pub fn from_extensions(extensions: Vec<Arc<dyn Extension>>) -> Self {
        let mut registry = PluginRegistry::default();
        for handler in extensions {
            registry.register(handler.manifest().clone(), handler);
        }
        registry
    }

    fn register(&mut self, manifest: Manifest, handler: Arc<dyn Extension>) {
        let at = self.extensions.len();
        for key in &manifest.supported_events {
            self.by_event.entry(key.clone()).or_default().push(at);
        }
        for key in &manifest.supported_calls {
            self.by_call.entry(key.clone()).or_default().push(at);
        }
        self.extensions.push(Registered { manifest, handler });
    }

    /// Ids of the enabled extensions, in registration order.
    pub fn extension_ids(&self) -> Vec<&str> {
        self.extensions
            .iter()
            .map(|ext| ext.manifest.id.as_str())
            .collect()
    }

    /// Extensions subscribed to a `Module.Event` key.
    pub fn extensions_for_event(&self, key: &str) -> &[usize] {
        self.by_event.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Run every extension's unapplied migrations, each atomically with
    /// its bookkeeping row. An extension whose migration fails is logged
    /// and skipped; the others keep going. The first time an extension
    /// gets any migration applied, its event backfill runs.
    pub async fn run_migrations(&self, store: &Store) {
        for registered in &self.extensions {
            if let Err(e) = self.migrate_one(store, registered).await {
                tracing::error!(
                    id = %registered.manifest.id,
                    error = %e,
                    "extension migration failed; extension left as-is"
                );
            }
        }
    }

    async fn migrate_one(&self, store: &Store, registered: &Registered) -> Result<(), Error> {
        let id = &registered.manifest.id;
        let applied = store.applied_extension_migrations(id).await?;
        let first_time = applied.is_empty();
        let mut applied_any = false;

        for migration in registered.handler.migrations() {
            if applied.contains(&migration.version) {
                continue;
            }
            let mut tx = store.begin().await?;
            let conn = &mut *tx;
            sqlx::raw_sql(&migration.sql).execute(conn).await?;
            store
                .record_extension_migration(&mut tx, id, &migration.version)
                .await?;
            tx.commit().await?;
            applied_any = true;
            tracing::info!(id = %id, version = %migration.version, "extension migration applied");
        }

        if first_time && applied_any {
            //self.backfill(store, registered).await?;
        }
        Ok(())
    }

    // Replay the stored events this extension subscribes to, in
    // height-then-index order. Best effort: a handler error skips that
    // event and moves on.
    async fn backfill(&self, store: &Store, registered: &Registered) -> Result<(), Error> {
        let keys = registered.manifest.supported_events.clone();
        if keys.is_empty() {
            return Ok(());
        }
        let id = &registered.manifest.id;
        tracing::info!(id = %id, "backfilling extension from stored events");

        let mut cursor = (-1i64, i32::MAX);
        let mut replayed = 0u64;
        loop {
            let page = store.events_for_replay(&keys, cursor, BACKFILL_PAGE).await?;
            let Some(last) = page.last() else { break };
            cursor = (last.block_height, last.idx);

            let mut tx = store.begin().await?;
            for stored in &page {
                let ctx = EventCtx {
                    block_height: stored.block_height as u32,
                    index: stored.idx as u32,
                    extrinsic_index: stored.extrinsic_idx.map(|at| at as u32),
                    module: &stored.module,
                    event: &stored.event,
                    data: &stored.data,
                };
                if let Err(e) = Self::dispatch_one(&mut tx, registered, &ctx).await {
                    tracing::warn!(
                        id = %id,
                        height = stored.block_height,
                        index = stored.idx,
                        error = %e,
                        "backfill handler failed; event skipped"
                    );
                }
                replayed += 1;
            }
            tx.commit().await?;
        }
        tracing::info!(id = %id, replayed, "extension backfill finished");
        Ok(())
    }

    async fn dispatch_one(
        tx: &mut Tx<'_>,
        registered: &Registered,
        ctx: &EventCtx<'_>,
    ) -> Result<(), Error> {
        let mut savepoint = tx.begin().await?;
        match registered.handler.on_event(&mut savepoint, ctx).await {
            Ok(()) => {
                savepoint.commit().await?;
                Ok(())
            }
            Err(e) => {
                savepoint.rollback().await?;
                Err(e)
            }
        }
    }

    /// Dispatch a block to every extension's `on_block`.
    pub async fn dispatch_block(&self, tx: &mut Tx<'_>, block: &BlockCtx<'_>) -> Result<(), Error> {
        for registered in &self.extensions {
            let mut savepoint = tx.begin().await?;
            match registered.handler.on_block(&mut savepoint, block).await {
                Ok(()) => savepoint.commit().await?,
                Err(e) => {
                    savepoint.rollback().await?;
                    tracing::warn!(
                        id = %registered.manifest.id,
                        height = block.height,
                        error = %e,
                        "on_block handler failed; continuing"
                    );
                }
            }
        }
        Ok(())
    }

    /// Dispatch an extrinsic to the extensions registered for its
    /// `Module.call` key, in registration order.
    pub async fn dispatch_extrinsic(
        &self,
        tx: &mut Tx<'_>,
        extrinsic: &ExtrinsicCtx<'_>,
    ) -> Result<(), Error> {
        let key = format!("{}.{}", extrinsic.module, extrinsic.call);
        let Some(interested) = self.by_call.get(&key) else {
            return Ok(());
        };
        for &at in interested {
            let registered = &self.extensions[at];
            let mut savepoint = tx.begin().await?;
            match registered
                .handler
                .on_extrinsic(&mut savepoint, extrinsic)
                .await
            {
                Ok(()) => savepoint.commit().await?,
                Err(e) => {
                    savepoint.rollback().await?;
                    tracing::warn!(
                        id = %registered.manifest.id,
                        key = %key,
                        height = extrinsic.block_height,
                        error = %e,
                        "on_extrinsic handler failed; continuing"
                    );
                }
            }
        }
        Ok(())
    }

    /// Dispatch an event to the extensions registered for its
    /// `Module.Event` key, in registration order.
    pub async fn dispatch_event(&self, tx: &mut Tx<'_>, event: &EventCtx<'_>) -> Result<(), Error> {
        let key = format!("{}.{}", event.module, event.event);
        let Some(interested) = self.by_event.get(&key) else {
            return Ok(());
        };
        for &at in interested {
            let registered = &self.extensions[at];
            let mut savepoint = tx.begin().await?;
            match registered.handler.on_event(&mut savepoint, event).await {
                Ok(()) => savepoint.commit().await?,
                Err(e) => {
                    savepoint.rollback().await?;
                    tracing::warn!(
                        id = %registered.manifest.id,
                        key = %key,
                        height = event.block_height,
                        error = %e,
                        "on_event handler failed; continuing"
                    );
                }
            }
        }
        Ok(())
    }
}
