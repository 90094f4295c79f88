//! Argument parsing, config merging and logging setup for the binary.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;
use tzfix_core::config::{AppConfig, LoggingConfig, UnresolvedOffsetPolicy};
use tzfix_core::models::RunSummary;

#[derive(Parser, Debug, Default)]
#[command(name = "immich-tz-fixer", version)]
#[command(about = "Fix timestamps and UTC offsets of Immich assets from local originals", long_about = None)]
pub struct Args {
    /// Local files or directories holding the originals
    pub paths: Vec<String>,

    /// Immich API base URL, e.g. https://photos.example.com/api
    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub api_key: Option<String>,

    /// Path to config TOML
    #[arg(short, long)]
    pub config: Option<String>,

    /// Print what would change without updating anything
    #[arg(short = 'n', long, default_value_t = false)]
    pub dry_run: bool,

    /// Fallback IANA timezone for files without an offset, e.g. US/Central
    #[arg(long)]
    pub timezone: Option<String>,

    /// Only assets taken before this date (YYYY-MM-DD, exclusive)
    #[arg(long)]
    pub before: Option<String>,

    /// Only assets taken after this date (YYYY-MM-DD, exclusive)
    #[arg(long)]
    pub after: Option<String>,

    /// Only assets from this camera model
    #[arg(long)]
    pub model: Option<String>,

    /// Only assets carrying this tag; repeat to require several
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Also match remote names carrying this prefix, e.g. IMG_
    #[arg(long)]
    pub try_prefix: Option<String>,

    /// Skip local files; apply --timezone to the server's timestamps
    #[arg(long, default_value_t = false)]
    pub no_files: bool,

    /// Compare filename stems case-insensitively
    #[arg(long, default_value_t = false)]
    pub ignore_case: bool,

    /// NFC-normalize filename stems before comparing
    #[arg(long, default_value_t = false)]
    pub normalize_unicode: bool,

    /// What to do when a file has no offset and no --timezone is given
    #[arg(long, value_enum)]
    pub unresolved_offset: Option<OffsetPolicyArg>,

    /// exiftool binary used to read raw and movie files
    #[arg(long)]
    pub exiftool: Option<String>,

    /// Glob of paths to leave out of the scan; repeatable
    #[arg(long)]
    pub exclude: Vec<String>,

    /// -v info, -vv debug
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Also write a debug log to this file
    #[arg(long)]
    pub log_file: Option<String>,

    /// Print the run summary as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OffsetPolicyArg {
    KeepCurrent,
    Skip,
}

impl From<OffsetPolicyArg> for UnresolvedOffsetPolicy {
    fn from(arg: OffsetPolicyArg) -> Self {
        match arg {
            OffsetPolicyArg::KeepCurrent => UnresolvedOffsetPolicy::KeepCurrent,
            OffsetPolicyArg::Skip => UnresolvedOffsetPolicy::Skip,
        }
    }
}

/// Command-line values win over file and environment settings. Flags only
/// ever switch a setting on.
pub fn apply_args(cfg: &mut AppConfig, args: &Args) {
    fn set(slot: &mut Option<String>, value: &Option<String>) {
        if value.is_some() {
            *slot = value.clone();
        }
    }

    set(&mut cfg.server.url, &args.url);
    set(&mut cfg.server.api_key, &args.api_key);

    if !args.paths.is_empty() {
        cfg.scan.include = args.paths.clone();
    }
    cfg.scan.exclude.extend(args.exclude.iter().cloned());
    set(&mut cfg.scan.exiftool, &args.exiftool);

    set(&mut cfg.filters.after, &args.after);
    set(&mut cfg.filters.before, &args.before);
    set(&mut cfg.filters.model, &args.model);
    set(&mut cfg.filters.try_prefix, &args.try_prefix);
    if !args.tags.is_empty() {
        cfg.filters.tags = args.tags.clone();
    }

    cfg.reconcile.dry_run |= args.dry_run;
    cfg.reconcile.no_files |= args.no_files;
    set(&mut cfg.reconcile.timezone, &args.timezone);
    if let Some(policy) = args.unresolved_offset {
        cfg.reconcile.unresolved_offset = policy.into();
    }

    if args.ignore_case {
        cfg.matching.case_sensitive = false;
    }
    cfg.matching.unicode_normalization |= args.normalize_unicode;

    cfg.logging.verbose = cfg.logging.verbose.max(args.verbose);
    set(&mut cfg.logging.log_file, &args.log_file);
}

pub fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}

/// Stderr at the verbosity level, plus an optional plain-text debug file.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(level_for(cfg.verbose));

    let file = match cfg.log_file.as_deref().filter(|p| !p.is_empty()) {
        Some(path) => {
            let f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(f))
                    .with_ansi(false)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr)
        .with(file)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}

pub fn render_summary(summary: &RunSummary, dry_run: bool, json: bool) -> Result<String> {
    if json {
        let value = serde_json::json!({
            "status": "ok",
            "dry_run": dry_run,
            "summary": summary,
        });
        return Ok(serde_json::to_string_pretty(&value)?);
    }
    let changed = if dry_run {
        format!("would update {}", summary.reported)
    } else {
        format!("updated {}", summary.applied)
    };
    let mut out = format!(
        "assets: seen {}, {}, already correct {}, filtered {}, unmatched {}, skipped {}, failed {}",
        summary.seen,
        changed,
        summary.already_correct,
        summary.filtered,
        summary.unmatched,
        summary.skipped,
        summary.failed
    );
    for f in &summary.failures {
        out.push_str(&format!("\n  failed {}: {}", f.id, f.error));
    }
    Ok(out)
}
