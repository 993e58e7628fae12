// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Maps one decoded block into store rows, in a single transaction.

use crate::Error;
use crate::decoder::{BlockStatus, DecodedBlock};
use crate::metrics::Metrics;
use crate::plugins::{BlockCtx, EventCtx, ExtrinsicCtx, PluginRegistry};
use crate::store::Store;
use crate::store::blocks::{BlockRow, EventRow, ExtrinsicRow};

/// Persist a decoded block: the block row, its extrinsics (and their
/// signers' accounts), its events, then the extension dispatch, all in
/// one transaction. Re-processing the same block is idempotent.
pub async fn process_block(
    store: &Store,
    plugins: &PluginRegistry,
    metrics: &Metrics,
    block: &DecodedBlock,
    status: BlockStatus,
) -> Result<(), Error> {
    let height = block.height as i64;
    let mut tx = store.begin().await?;

    if let Some((existing_hash, existing_status)) = store.block_meta_tx(&mut tx, height).await? {
        // A best-stream writer must never overwrite a finalized row.
        if status == BlockStatus::Best && existing_status == "finalized" {
            tracing::debug!(height = block.height, "already finalized; best write skipped");
            return Ok(());
        }
        // Rewriting the height with a different hash: the old hash's
        // extrinsics and events must not survive it.
        if existing_hash != block.hash {
            tracing::debug!(
                height = block.height,
                old = %existing_hash,
                new = %block.hash,
                "replacing block at height; clearing its previous rows"
            );
            store.delete_block_children(&mut tx, height).await?;
        }
    }

    store
        .upsert_block(
            &mut tx,
            &BlockRow {
                height,
                hash: block.hash.clone(),
                parent_hash: block.parent_hash.clone(),
                state_root: block.state_root.clone(),
                extrinsics_root: block.extrinsics_root.clone(),
                timestamp_ms: block.timestamp_ms.map(|ts| ts as i64),
                validator: None,
                status: status.as_str().to_owned(),
                spec_version: block.spec_version as i64,
                extrinsic_count: block.extrinsics.len() as i32,
                event_count: block.events.len() as i32,
                digest_logs: serde_json::to_value(&block.digest_logs)?,
            },
        )
        .await?;

    let mut extrinsic_args = Vec::with_capacity(block.extrinsics.len());
    for extrinsic in &block.extrinsics {
        let args = serde_json::to_value(&extrinsic.args)?;
        store
            .upsert_extrinsic(
                &mut tx,
                &ExtrinsicRow {
                    block_height: height,
                    idx: extrinsic.index as i32,
                    tx_hash: extrinsic.tx_hash.clone(),
                    signer: extrinsic.signer.clone(),
                    module: extrinsic.module.clone(),
                    call: extrinsic.call.clone(),
                    args: args.clone(),
                    nonce: extrinsic.nonce.map(|n| n as i64),
                    success: extrinsic.success,
                    fee: extrinsic.fee.clone(),
                    tip: extrinsic.tip.clone(),
                },
            )
            .await?;
        if let Some(signer) = &extrinsic.signer {
            store.upsert_account(&mut tx, signer, height).await?;
        }
        extrinsic_args.push(args);
    }

    let mut event_data = Vec::with_capacity(block.events.len());
    for event in &block.events {
        let data = serde_json::to_value(&event.data)?;
        store
            .insert_event(
                &mut tx,
                &EventRow {
                    block_height: height,
                    idx: event.index as i32,
                    extrinsic_idx: event.phase.extrinsic_index().map(|at| at as i32),
                    module: event.module.clone(),
                    event: event.event.clone(),
                    data: data.clone(),
                    phase: event.phase.label().to_owned(),
                },
            )
            .await?;
        event_data.push(data);
    }

    // Extension dispatch: block, then extrinsics, then events.
    plugins
        .dispatch_block(
            &mut tx,
            &BlockCtx {
                height: block.height,
                hash: &block.hash,
                timestamp_ms: block.timestamp_ms,
            },
        )
        .await?;
    for (extrinsic, args) in block.extrinsics.iter().zip(&extrinsic_args) {
        plugins
            .dispatch_extrinsic(
                &mut tx,
                &ExtrinsicCtx {
                    block_height: block.height,
                    index: extrinsic.index,
                    module: &extrinsic.module,
                    call: &extrinsic.call,
                    signer: extrinsic.signer.as_deref(),
                    args,
                    success: extrinsic.success,
                },
            )
            .await?;
    }
    for (event, data) in block.events.iter().zip(&event_data) {
        plugins
            .dispatch_event(
                &mut tx,
                &EventCtx {
                    block_height: block.height,
                    index: event.index,
                    extrinsic_index: event.phase.extrinsic_index(),
                    module: &event.module,
                    event: &event.event,
                    data,
                },
            )
            .await?;
    }

    tx.commit().await?;

    metrics.record_block(block);
    Ok(())
}
