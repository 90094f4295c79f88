use anyhow::Result;
use clap::Parser;
use cli::{apply_args, init_logging, render_summary, Args};
use tzfix_core::config;
use tzfix_core::reconcile;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = config::load(args.config.as_deref())?;
    apply_args(&mut cfg, &args);
    init_logging(&cfg.logging)?;

    if cfg.reconcile.dry_run {
        tracing::info!("Dry run: no assets will be updated.");
    }
    let dry_run = cfg.reconcile.dry_run;
    let summary = reconcile::run_with_config(cfg).await?;
    println!("{}", render_summary(&summary, dry_run, args.json)?);
    Ok(())
}
