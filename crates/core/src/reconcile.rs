//! Drives one correction run: list remote assets, gate them through the
//! filters, match local files, decide, then apply or report.

use crate::config::{AppConfig, ReconcileConfig, UnresolvedOffsetPolicy};
use crate::error::ReconcileError;
use crate::extractor::{self, MetadataSource};
use crate::filter::Filters;
use crate::matcher::StemIndex;
use crate::metadata;
use crate::models::{EmbeddedOffset, Outcome, ReconciliationDecision, RunSummary, SkipReason};
use crate::offset::OffsetResolver;
use crate::scanner;
use anyhow::Context;
use chrono::{FixedOffset, NaiveDateTime};
use providers::immich::{ImmichClient, ImmichConfig};
use providers::{AssetProvider, ProviderError, RemoteAsset};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    pub dry_run: bool,
    /// Correct offsets only, from the fallback timezone; no local files.
    pub no_files: bool,
    pub timezone: Option<String>,
    pub unresolved_offset: UnresolvedOffsetPolicy,
    pub page_size: u32,
}

impl ReconcileOptions {
    pub fn from_config(cfg: &ReconcileConfig, page_size: u32) -> Self {
        Self {
            dry_run: cfg.dry_run,
            no_files: cfg.no_files,
            timezone: cfg.timezone.clone().filter(|t| !t.trim().is_empty()),
            unresolved_offset: cfg.unresolved_offset,
            page_size,
        }
    }
}

pub struct Reconciler {
    provider: Arc<dyn AssetProvider>,
    source: Arc<dyn MetadataSource>,
    options: ReconcileOptions,
    filters: Filters,
    stems: StemIndex,
    resolver: OffsetResolver,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn AssetProvider>,
        source: Arc<dyn MetadataSource>,
        options: ReconcileOptions,
        filters: Filters,
        stems: StemIndex,
    ) -> Result<Self, ReconcileError> {
        let resolver = OffsetResolver::new(options.timezone.as_deref())?;
        if options.no_files && resolver.fallback().is_none() {
            return Err(ReconcileError::config("--no-files requires --timezone"));
        }
        Ok(Self {
            provider,
            source,
            options,
            filters,
            stems,
            resolver,
        })
    }

    /// Target values for one asset, without touching the server. `Ok(None)`
    /// means no local file matched.
    pub fn decide(
        &self,
        asset: &RemoteAsset,
    ) -> Result<Option<ReconciliationDecision>, ReconcileError> {
        if self.options.no_files {
            let offset = self
                .resolver
                .resolve(asset.local_timestamp, EmbeddedOffset::Unknown)
                .map_err(|_| ReconcileError::UnresolvedOffset(asset.id.clone()))?;
            return Ok(Some(decision(asset, asset.local_timestamp, offset, None)));
        }

        let Some(path) = self.stems.find(&asset.original_filename)? else {
            return Ok(None);
        };
        let tags = self.source.read_tags(path)?;
        let local = metadata::normalize(path, &tags)?;
        debug!(
            "Read date {} ({:?}) from {} via {}",
            local.local_timestamp,
            local.offset,
            path.display(),
            local.source_tag
        );

        let offset = match self.resolver.resolve(local.local_timestamp, local.offset) {
            Ok(offset) => offset,
            Err(ReconcileError::UnresolvedOffset(_)) => match (self.options.unresolved_offset, asset.offset) {
                (UnresolvedOffsetPolicy::KeepCurrent, Some(current)) => {
                    debug!(
                        "No offset for {}; keeping asset ID {} offset {}",
                        path.display(),
                        asset.id,
                        current
                    );
                    current
                }
                _ => return Err(ReconcileError::UnresolvedOffset(asset.id.clone())),
            },
            Err(e) => return Err(e),
        };

        Ok(Some(decision(
            asset,
            local.local_timestamp,
            offset,
            Some(path.to_path_buf()),
        )))
    }

    /// Filter, decide and act on one asset. Per-asset errors end here.
    pub async fn process(&self, asset: &RemoteAsset) -> Outcome {
        if let Some(condition) = self.filters.rejects(asset) {
            debug!("Asset ID {} filtered out by {:?}", asset.id, condition);
            return Outcome::Skipped(SkipReason::Filtered);
        }

        let decision = match self.decide(asset) {
            Ok(Some(d)) => d,
            Ok(None) => {
                debug!(
                    "No matching local file found for asset ID {} ({})",
                    asset.id, asset.original_filename
                );
                return Outcome::Skipped(SkipReason::NoMatch);
            }
            Err(e) => {
                warn!("Skipping asset ID {} ({}): {}", asset.id, asset.original_filename, e);
                return Outcome::Skipped(skip_reason(&e));
            }
        };

        if !decision.changed {
            debug!(
                "Asset ID {} ({}) already has correct date {}",
                asset.id,
                asset.original_filename,
                stamp(decision.target_timestamp, Some(decision.target_offset))
            );
            return Outcome::AlreadyCorrect;
        }

        let change = describe_change(asset, &decision);
        if self.options.dry_run {
            println!("Would update {}", change);
            return Outcome::Reported;
        }

        info!("Updating {}", change);
        match self
            .provider
            .update_asset(&asset.id, decision.target_timestamp, decision.target_offset)
            .await
        {
            Ok(()) => Outcome::Applied,
            Err(source) => {
                let err = ReconcileError::RemoteUpdate {
                    id: asset.id.clone(),
                    source,
                };
                error!("{}", err);
                Outcome::Failed(err.to_string())
            }
        }
    }

    /// Pages through the listing and processes every asset once. Only
    /// listing and configuration errors end the run early.
    pub async fn run(&self) -> Result<RunSummary, ReconcileError> {
        let tags = if self.filters.tags.is_empty() {
            Vec::new()
        } else {
            self.provider
                .resolve_tags(&self.filters.tags)
                .await
                .map_err(|e| match e {
                    ProviderError::UnknownTag(tag) => {
                        ReconcileError::config(format!("no such tag found on server: {}", tag))
                    }
                    other => ReconcileError::Remote(other),
                })?
        };
        let query = self.filters.to_query(tags, self.options.page_size);

        let mut summary = RunSummary::default();
        let mut decided: HashSet<String> = HashSet::new();
        let mut page = 1u32;
        loop {
            let batch = self.provider.search_page(&query, page).await?;
            debug!(
                "Found {} assets on page {} (next page: {:?})",
                batch.assets.len(),
                page,
                batch.next_page
            );
            for asset in &batch.assets {
                let outcome = if decided.insert(asset.id.clone()) {
                    self.process(asset).await
                } else {
                    debug!("Asset ID {} listed twice; ignoring repeat", asset.id);
                    Outcome::Skipped(SkipReason::Duplicate)
                };
                summary.record(&asset.id, &outcome);
            }
            match batch.next_page {
                Some(next) if next > page => page = next,
                Some(next) => {
                    warn!("Server returned non-advancing next page {}; stopping", next);
                    break;
                }
                None => break,
            }
        }

        info!(
            "Run complete: {} seen, {} applied, {} reported, {} already correct, {} unmatched, {} skipped, {} failed",
            summary.seen,
            summary.applied,
            summary.reported,
            summary.already_correct,
            summary.unmatched,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }
}

fn decision(
    asset: &RemoteAsset,
    target_timestamp: NaiveDateTime,
    target_offset: FixedOffset,
    matched_path: Option<PathBuf>,
) -> ReconciliationDecision {
    let changed =
        target_timestamp != asset.local_timestamp || asset.offset != Some(target_offset);
    ReconciliationDecision {
        target_timestamp,
        target_offset,
        matched_path,
        changed,
    }
}

fn skip_reason(err: &ReconcileError) -> SkipReason {
    match err {
        ReconcileError::AmbiguousMatch { .. } => SkipReason::Ambiguous,
        ReconcileError::UnresolvedOffset(_) => SkipReason::UnresolvedOffset,
        _ => SkipReason::Metadata,
    }
}

fn stamp(local: NaiveDateTime, offset: Option<FixedOffset>) -> String {
    let local = local.format("%Y-%m-%dT%H:%M:%S%.f");
    match offset {
        Some(o) => format!("{}{}", local, o),
        None => format!("{} (no offset)", local),
    }
}

/// One human-readable line: asset, matched file, old and new values.
pub fn describe_change(asset: &RemoteAsset, decision: &ReconciliationDecision) -> String {
    let file = match &decision.matched_path {
        Some(p) => format!(" from file {}", p.display()),
        None => String::new(),
    };
    format!(
        "asset ID {} ({}){}: {} -> {}",
        asset.id,
        asset.original_filename,
        file,
        stamp(asset.local_timestamp, asset.offset),
        stamp(decision.target_timestamp, Some(decision.target_offset))
    )
}

/// Builds every collaborator from `config` and runs against the Immich
/// server it names.
pub async fn run_with_config(config: AppConfig) -> anyhow::Result<RunSummary> {
    config.validate()?;
    let (url, api_key) = config.connection()?;
    let provider = Arc::new(ImmichClient::new(ImmichConfig { url, api_key }));
    let source = extractor::detect(config.scan.exiftool.as_deref());
    run_with_provider(config, provider, source).await
}

pub async fn run_with_provider(
    config: AppConfig,
    provider: Arc<dyn AssetProvider>,
    source: Arc<dyn MetadataSource>,
) -> anyhow::Result<RunSummary> {
    config.validate()?;
    let filters = Filters::from_config(&config.filters)?;
    let options = ReconcileOptions::from_config(&config.reconcile, config.server.page_size);
    // Reject a bad zone before walking the tree.
    OffsetResolver::new(options.timezone.as_deref())?;

    let stems = if options.no_files {
        StemIndex::default()
    } else {
        let roots: Vec<PathBuf> = config.scan.include.iter().map(PathBuf::from).collect();
        let files = scanner::scan(&roots, &config.scan.exclude)
            .await
            .context("scan local paths")?;
        if files.is_empty() {
            return Err(ReconcileError::config("no supported media files found under given paths").into());
        }
        info!("Found {} local media file(s).", files.len());
        StemIndex::build(files, config.matching, filters.try_prefix.clone())
    };

    let reconciler = Reconciler::new(provider, source, options, filters, stems)?;
    Ok(reconciler.run().await?)
}
