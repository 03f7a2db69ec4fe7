use std::sync::Arc;

use archive_core::{
    assign_file_stems, Archive, DumpMode, ExportFormat, HaltReason, RunSummary, SkippedTarget,
    Target, TargetOutcome, TargetReport,
};
use archive_logging::{archive_error, archive_info, archive_warn};
use chrono::{SecondsFormat, Utc};
use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::client::RemoteApi;
use crate::export::{Exporter, OutputLayout};
use crate::gateway::{Gateway, GatewaySettings};
use crate::harvest::{DialogHarvester, HarvestContext, HarvestSettings, PostHarvester};
use crate::{ApiError, Clock, HarvestError, Params, RunError};

pub const MAX_THREAD_COUNT: usize = 20;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: DumpMode,
    pub formats: Vec<ExportFormat>,
    /// Targets processed concurrently, clamped to `1..=MAX_THREAD_COUNT`.
    pub thread_count: usize,
    pub layout: OutputLayout,
    /// Numeric ids or screen names, used in posts mode.
    pub community_ids: Vec<String>,
    pub harvest: HarvestSettings,
    pub gateway: GatewaySettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: DumpMode::Dialogs,
            formats: vec![ExportFormat::Json],
            thread_count: 4,
            layout: OutputLayout::default(),
            community_ids: Vec::new(),
            harvest: HarvestSettings::default(),
            gateway: GatewaySettings::default(),
        }
    }
}

pub fn system_clock() -> Clock {
    Arc::new(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Runs one archive pass: check the token, enumerate targets, harvest and
/// export them on a bounded worker pool.
///
/// `cancel` aborts the run. A quota failure halts it internally. Either
/// way targets that never started are reported as skipped and targets in
/// flight are discarded.
pub async fn run_archive(
    config: RunConfig,
    api: Arc<dyn RemoteApi>,
    cancel: CancellationToken,
    clock: Clock,
) -> Result<RunSummary, RunError> {
    let halt = cancel.child_token();
    let gateway = Arc::new(Gateway::new(api, config.gateway.clone(), halt.clone()));

    match gateway.call("users.get", &Params::new()).await {
        Ok(_) => archive_info!("Access token accepted"),
        Err(ApiError::Auth(message)) => return Err(RunError::Auth(message)),
        Err(ApiError::QuotaExhausted) => return Err(RunError::Quota),
        Err(ApiError::Cancelled) => return Err(RunError::Cancelled),
        Err(err) => return Err(RunError::Unreachable(err)),
    }

    let exporter = Arc::new(Exporter::new(config.layout.clone(), &config.formats));
    exporter.prepare()?;

    let ctx = Arc::new(HarvestContext {
        gateway: gateway.clone(),
        cancel: halt.clone(),
        settings: config.harvest.clone(),
        clock,
    });

    let mut summary = RunSummary::default();
    let targets = enumerate_targets(&config, &ctx, &mut summary).await;
    archive_info!("Dispatching {} targets on {} workers", targets.len(), worker_count(&config));

    let stems = assign_file_stems(&targets);
    let outcomes: Vec<TargetOutcome> = stream::iter(targets.into_iter().zip(stems))
        .map(|(target, stem)| {
            let ctx = ctx.clone();
            let exporter = exporter.clone();
            async move { process_target(&ctx, exporter, target, stem).await }
        })
        .buffer_unordered(worker_count(&config))
        .collect()
        .await;
    for outcome in outcomes {
        summary.record(outcome);
    }

    let stats = gateway.stats().await;
    summary.requests_made = stats.calls;
    summary.halted = if stats.quota_exhausted {
        Some(HaltReason::QuotaExhausted)
    } else if cancel.is_cancelled() {
        Some(HaltReason::Cancelled)
    } else {
        None
    };
    summary.sort();
    archive_info!(
        "Run finished: {} succeeded, {} skipped, {} requests ({} retries)",
        summary.succeeded.len(),
        summary.skipped.len(),
        stats.calls,
        stats.retries
    );
    Ok(summary)
}

fn worker_count(config: &RunConfig) -> usize {
    config.thread_count.clamp(1, MAX_THREAD_COUNT)
}

/// Enumeration failures become skipped entries; fatal ones also fire the halt.
async fn enumerate_targets(
    config: &RunConfig,
    ctx: &HarvestContext,
    summary: &mut RunSummary,
) -> Vec<Target> {
    let mut targets = Vec::new();

    if config.mode.includes_dialogs() {
        match DialogHarvester::new(ctx).list_dialogs().await {
            Ok(peers) => targets.extend(peers.into_iter().map(Target::Conversation)),
            Err(err) => {
                note_halt(ctx, &err);
                archive_warn!("Conversation list unavailable: {err}");
                summary.skip("conversation list", err.to_string());
            }
        }
    }

    if config.mode.includes_posts() {
        for id in &config.community_ids {
            if ctx.cancel.is_cancelled() {
                summary.skip(format!("community {id}"), "not started: run halted");
                continue;
            }
            match PostHarvester::new(ctx).resolve_community(id).await {
                Ok(community) => {
                    let known = targets
                        .iter()
                        .any(|t| matches!(t, Target::Community(c) if c.id == community.id));
                    if known {
                        archive_info!("Community {id} already listed as {}", community.name);
                    } else {
                        targets.push(Target::Community(community));
                    }
                }
                Err(err) => {
                    note_halt(ctx, &err);
                    archive_warn!("Community {id} unavailable: {err}");
                    summary.skip(format!("community {id}"), err.to_string());
                }
            }
        }
    }
    targets
}

fn note_halt(ctx: &HarvestContext, err: &HarvestError) {
    if let HarvestError::Fatal(cause) = err {
        archive_error!("Halting run: {cause}");
        ctx.cancel.cancel();
    }
}

async fn process_target(
    ctx: &HarvestContext,
    exporter: Arc<Exporter>,
    target: Target,
    stem: String,
) -> TargetOutcome {
    let label = target.label();
    if ctx.cancel.is_cancelled() {
        return skipped(label, "not started: run halted");
    }

    archive_info!("Harvesting {label}");
    let harvested = match &target {
        Target::Conversation(peer) => DialogHarvester::new(ctx)
            .harvest(peer)
            .await
            .map(Archive::Conversation),
        Target::Community(community) => PostHarvester::new(ctx)
            .harvest(community)
            .await
            .map(Archive::Community),
    };
    let archive = match harvested {
        Ok(archive) => archive,
        Err(err) => {
            note_halt(ctx, &err);
            archive_warn!("Skipping {label}: {err}");
            return skipped(label, err.to_string());
        }
    };

    let items = archive.item_count();
    let exported = tokio::task::spawn_blocking(move || exporter.export(&archive, &stem)).await;
    match exported {
        Ok(Ok(files)) => {
            archive_info!("Finished {label}: {items} items");
            TargetOutcome::Succeeded(TargetReport { label, items, files })
        }
        Ok(Err(err)) => {
            archive_warn!("Export of {label} failed: {err}");
            skipped(label, format!("export failed: {err}"))
        }
        Err(err) => {
            archive_error!("Export task for {label} failed: {err}");
            skipped(label, format!("export task failed: {err}"))
        }
    }
}

fn skipped(label: String, reason: impl Into<String>) -> TargetOutcome {
    TargetOutcome::Skipped(SkippedTarget {
        label,
        reason: reason.into(),
    })
}
