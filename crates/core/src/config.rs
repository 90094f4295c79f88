use crate::error::ReconcileError;
use crate::matcher::StemPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub scan: ScanPaths,
    pub filters: FilterConfig,
    pub reconcile: ReconcileConfig,
    pub matching: StemPolicy,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub page_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            page_size: 250,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPaths {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// exiftool binary; the built-in EXIF reader is used when it cannot run.
    pub exiftool: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// YYYY-MM-DD, exclusive.
    pub after: Option<String>,
    /// YYYY-MM-DD, exclusive.
    pub before: Option<String>,
    pub model: Option<String>,
    pub tags: Vec<String>,
    pub try_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub dry_run: bool,
    pub timezone: Option<String>,
    pub no_files: bool,
    pub unresolved_offset: UnresolvedOffsetPolicy,
}

/// What to do when a matched file has no embedded offset and no fallback
/// timezone is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedOffsetPolicy {
    /// Correct the timestamp and keep the asset's current offset.
    #[default]
    KeepCurrent,
    Skip,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 0 = warnings, 1 = info, 2+ = debug.
    pub verbose: u8,
    pub log_file: Option<String>,
}

impl AppConfig {
    /// URL and API key, both required before talking to the server.
    pub fn connection(&self) -> Result<(String, String), ReconcileError> {
        let url = non_empty(&self.server.url)
            .ok_or_else(|| ReconcileError::config("missing server url (--url)"))?;
        let key = non_empty(&self.server.api_key)
            .ok_or_else(|| ReconcileError::config("missing API key (--api-key)"))?;
        Ok((url, key))
    }

    /// Checks the combination of paths and modes.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        let has_paths = !self.scan.include.is_empty();
        if self.reconcile.no_files {
            if has_paths {
                return Err(ReconcileError::config(
                    "paths provided but --no-files specified",
                ));
            }
            if non_empty(&self.reconcile.timezone).is_none() {
                return Err(ReconcileError::config("--no-files requires --timezone"));
            }
        } else if !has_paths {
            return Err(ReconcileError::config("no paths provided"));
        }
        if self.server.page_size == 0 {
            return Err(ReconcileError::config("server.page_size must be positive"));
        }
        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Layers an optional TOML file under `IMMICH_TZ_*` environment variables
/// (`IMMICH_TZ_SERVER__API_KEY` sets `server.api_key`).
pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("IMMICH_TZ")
            .prefix_separator("_")
            .separator("__"),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_combinations() {
        let mut cfg = AppConfig::default();
        assert!(cfg.validate().is_err());

        cfg.scan.include = vec!["DCIM".into()];
        assert!(cfg.validate().is_ok());

        cfg.reconcile.no_files = true;
        assert!(cfg.validate().is_err());

        cfg.scan.include.clear();
        assert!(cfg.validate().is_err());

        cfg.reconcile.timezone = Some("US/Central".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn connection_requires_url_and_key() {
        let mut cfg = AppConfig::default();
        cfg.server.url = Some("https://photos.example.com/api".into());
        assert!(cfg.connection().is_err());
        cfg.server.api_key = Some("  ".into());
        assert!(cfg.connection().is_err());
        cfg.server.api_key = Some("secret".into());
        assert_eq!(
            cfg.connection().unwrap(),
            ("https://photos.example.com/api".to_string(), "secret".to_string())
        );
    }
}
