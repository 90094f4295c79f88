use chrono::{FixedOffset, NaiveDate};
use clap::Parser;
use cli::{apply_args, render_summary, Args};
use providers::memory::InMemoryProvider;
use providers::RemoteAsset;
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;
use tzfix_core::config::{AppConfig, UnresolvedOffsetPolicy};
use tzfix_core::extractor::StaticSource;
use tzfix_core::reconcile;
use tzfix_core::ReconcileError;

fn parse(argv: &[&str]) -> AppConfig {
    let args = Args::parse_from(std::iter::once("immich-tz-fixer").chain(argv.iter().copied()));
    let mut cfg = AppConfig::default();
    apply_args(&mut cfg, &args);
    cfg
}

#[test]
fn flags_override_config() {
    let mut cfg = AppConfig::default();
    cfg.server.url = Some("http://old/api".into());
    cfg.filters.tags = vec!["FromFile".into()];
    cfg.scan.exclude = vec!["**/cache".into()];

    let args = Args::parse_from([
        "immich-tz-fixer",
        "--url",
        "http://photos/api",
        "--tag",
        "Trip",
        "--tag",
        "2025/Trip",
        "--exclude",
        "**/exports",
        "--ignore-case",
        "--exiftool",
        "/opt/exiftool/exiftool",
        "--unresolved-offset",
        "skip",
        "-vv",
        "-n",
        "DCIM",
    ]);
    apply_args(&mut cfg, &args);

    assert_eq!(cfg.server.url.as_deref(), Some("http://photos/api"));
    assert_eq!(cfg.filters.tags, vec!["Trip", "2025/Trip"]);
    assert_eq!(cfg.scan.exclude, vec!["**/cache", "**/exports"]);
    assert_eq!(cfg.scan.include, vec!["DCIM"]);
    assert_eq!(cfg.scan.exiftool.as_deref(), Some("/opt/exiftool/exiftool"));
    assert!(!cfg.matching.case_sensitive);
    assert!(!cfg.matching.unicode_normalization);
    assert_eq!(cfg.reconcile.unresolved_offset, UnresolvedOffsetPolicy::Skip);
    assert!(cfg.reconcile.dry_run);
    assert_eq!(cfg.logging.verbose, 2);
}

#[test]
fn path_and_mode_errors() {
    assert!(parse(&[]).validate().is_err());
    assert!(parse(&["--no-files", "DCIM"]).validate().is_err());
    assert!(parse(&["--no-files"]).validate().is_err());
    assert!(parse(&["--no-files", "--timezone", "US/Central"]).validate().is_ok());
    assert!(parse(&["DCIM"]).validate().is_ok());
}

#[tokio::test]
async fn unknown_timezone_is_rejected() {
    let cfg = parse(&["--no-files", "--timezone", "Mars/Olympus"]);
    let provider = Arc::new(InMemoryProvider::new(Vec::new()));
    let result = reconcile::run_with_provider(cfg, provider, Arc::new(StaticSource::new())).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn unknown_timezone_is_reported_before_scanning() {
    let temp = tempdir().unwrap();
    let missing = temp.path().join("not-there");
    let cfg = parse(&[missing.to_str().unwrap(), "--timezone", "Mars/Olympus"]);
    let provider = Arc::new(InMemoryProvider::new(Vec::new()));
    let err = reconcile::run_with_provider(cfg, provider, Arc::new(StaticSource::new()))
        .await
        .unwrap_err();
    let err = err.downcast_ref::<ReconcileError>().unwrap();
    assert!(matches!(err, ReconcileError::Configuration(_)));
    assert!(err.to_string().contains("Mars/Olympus"), "{err}");
}

#[tokio::test]
async fn directory_without_media_is_rejected() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("notes.txt"), b"txt").unwrap();
    let cfg = parse(&[temp.path().to_str().unwrap()]);
    let provider = Arc::new(InMemoryProvider::new(Vec::new()));
    let result = reconcile::run_with_provider(cfg, provider, Arc::new(StaticSource::new())).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn scans_matches_and_updates() {
    let temp = tempdir().unwrap();
    let dir = temp.path().join("DCIM/PANA_107");
    fs::create_dir_all(&dir).unwrap();
    let raw = dir.join("P1070427.RW2");
    fs::write(&raw, b"raw").unwrap();

    let source = StaticSource::new().with_file(
        raw.clone(),
        [
            ("EXIF:DateTimeOriginal", "2025:07:04 08:00:00"),
            ("EXIF:SubSecTimeOriginal", "25"),
            ("EXIF:OffsetTimeOriginal", "-05:00"),
        ],
    );
    let provider = Arc::new(InMemoryProvider::new(vec![RemoteAsset {
        id: "a1".into(),
        original_filename: "/usr/src/app/upload/2025-11-30/P1070427.jpg".into(),
        local_timestamp: NaiveDate::from_ymd_opt(2025, 7, 4)
            .unwrap()
            .and_hms_opt(4, 0, 0)
            .unwrap(),
        offset: FixedOffset::east_opt(-9 * 3600),
        model: None,
        tags: BTreeSet::new(),
    }]));

    let cfg = parse(&[temp.path().to_str().unwrap()]);
    let summary = reconcile::run_with_provider(cfg, provider.clone(), Arc::new(source))
        .await
        .unwrap();
    assert_eq!(summary.applied, 1);

    let updated = provider.asset("a1").unwrap();
    assert_eq!(
        updated.local_timestamp,
        NaiveDate::from_ymd_opt(2025, 7, 4)
            .unwrap()
            .and_hms_milli_opt(8, 0, 0, 250)
            .unwrap()
    );
    assert_eq!(updated.offset, FixedOffset::east_opt(-5 * 3600));

    let text = render_summary(&summary, false, false).unwrap();
    assert!(text.contains("updated 1"));
    let json: serde_json::Value =
        serde_json::from_str(&render_summary(&summary, false, true).unwrap()).unwrap();
    assert_eq!(json["summary"]["applied"], 1);
}
