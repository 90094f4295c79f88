use crate::config::FilterConfig;
use crate::error::ReconcileError;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use providers::{AssetQuery, RemoteAsset, ResolvedTag};

/// Widest UTC offset in use; server-side date windows are widened by this
/// much so that no asset whose local date is in range gets dropped.
const MAX_OFFSET_HOURS: i64 = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    After(NaiveDate),
    Before(NaiveDate),
    Model(String),
    Tag(String),
}

pub fn matches(condition: &Condition, asset: &RemoteAsset) -> bool {
    match condition {
        Condition::After(date) => asset.capture_date() > *date,
        Condition::Before(date) => asset.capture_date() < *date,
        Condition::Model(model) => asset.model.as_deref() == Some(model.as_str()),
        Condition::Tag(tag) => asset.tags.contains(tag),
    }
}

/// Per-run query constraints. Both date bounds are exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
    pub model: Option<String>,
    pub tags: Vec<String>,
    pub try_prefix: Option<String>,
}

impl Filters {
    pub fn from_config(cfg: &FilterConfig) -> Result<Self, ReconcileError> {
        Ok(Self {
            after: cfg.after.as_deref().map(parse_date).transpose()?,
            before: cfg.before.as_deref().map(parse_date).transpose()?,
            model: cfg.model.clone().filter(|m| !m.is_empty()),
            tags: cfg.tags.clone(),
            try_prefix: cfg.try_prefix.clone().filter(|p| !p.is_empty()),
        })
    }

    pub fn conditions(&self) -> Vec<Condition> {
        let mut out = Vec::new();
        out.extend(self.after.map(Condition::After));
        out.extend(self.before.map(Condition::Before));
        out.extend(self.model.clone().map(Condition::Model));
        out.extend(self.tags.iter().cloned().map(Condition::Tag));
        out
    }

    /// First condition the asset fails, if any.
    pub fn rejects(&self, asset: &RemoteAsset) -> Option<Condition> {
        self.conditions().into_iter().find(|c| !matches(c, asset))
    }

    pub fn passes(&self, asset: &RemoteAsset) -> bool {
        self.rejects(asset).is_none()
    }

    /// Server-side narrowing for the listing; a superset of what `passes`
    /// accepts.
    pub fn to_query(&self, tags: Vec<ResolvedTag>, page_size: u32) -> AssetQuery {
        let slack = Duration::hours(MAX_OFFSET_HOURS);
        let midnight = |d: NaiveDate| {
            d.and_hms_opt(0, 0, 0)
                .map(|dt| Utc.from_utc_datetime(&dt))
        };
        AssetQuery {
            taken_after: self
                .after
                .and_then(|d| d.succ_opt())
                .and_then(midnight)
                .map(|t| t - slack),
            taken_before: self.before.and_then(midnight).map(|t| t + slack),
            model: self.model.clone(),
            tags,
            page_size,
        }
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, ReconcileError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| ReconcileError::config(format!("invalid date {:?} (want YYYY-MM-DD): {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn asset_on(date: &str) -> RemoteAsset {
        RemoteAsset {
            id: "a".into(),
            original_filename: "P1.jpg".into(),
            local_timestamp: parse_date(date).unwrap().and_hms_opt(12, 0, 0).unwrap(),
            offset: None,
            model: Some("DMC-GX85".into()),
            tags: BTreeSet::from(["Trip".to_string(), "2025/Trip".to_string()]),
        }
    }

    fn filters(cfg: FilterConfig) -> Filters {
        Filters::from_config(&cfg).unwrap()
    }

    #[test]
    fn before_bound_is_exclusive() {
        let f = filters(FilterConfig {
            before: Some("2025-07-04".into()),
            ..Default::default()
        });
        assert!(!f.passes(&asset_on("2025-07-04")));
        assert!(f.passes(&asset_on("2025-07-03")));
    }

    #[test]
    fn after_bound_is_exclusive() {
        let f = filters(FilterConfig {
            after: Some("2025-07-04".into()),
            ..Default::default()
        });
        assert!(!f.passes(&asset_on("2025-07-04")));
        assert!(f.passes(&asset_on("2025-07-05")));
    }

    #[test]
    fn model_is_exact() {
        let f = filters(FilterConfig {
            model: Some("DMC-GX8".into()),
            ..Default::default()
        });
        assert_eq!(
            f.rejects(&asset_on("2025-07-04")),
            Some(Condition::Model("DMC-GX8".into()))
        );
    }

    #[test]
    fn every_tag_is_required() {
        let both = filters(FilterConfig {
            tags: vec!["Trip".into(), "2025/Trip".into()],
            ..Default::default()
        });
        assert!(both.passes(&asset_on("2025-07-04")));

        let missing = filters(FilterConfig {
            tags: vec!["Trip".into(), "Work".into()],
            ..Default::default()
        });
        assert!(!missing.passes(&asset_on("2025-07-04")));
    }

    #[test]
    fn no_constraints_pass_everything() {
        assert!(Filters::default().passes(&asset_on("1999-12-31")));
    }

    #[test]
    fn bad_dates_are_configuration_errors() {
        for cfg in [
            FilterConfig {
                before: Some("07/04/2025".into()),
                ..Default::default()
            },
            FilterConfig {
                after: Some("2025-7-5x".into()),
                ..Default::default()
            },
        ] {
            assert!(Filters::from_config(&cfg).unwrap_err().is_fatal());
        }
    }

    #[test]
    fn empty_window_is_allowed_and_passes_nothing() {
        let f = filters(FilterConfig {
            after: Some("2025-07-04".into()),
            before: Some("2025-07-04".into()),
            ..Default::default()
        });
        for day in ["2025-07-03", "2025-07-04", "2025-07-05"] {
            assert!(!f.passes(&asset_on(day)), "{day}");
        }
    }

    #[test]
    fn server_window_covers_every_offset() {
        let f = filters(FilterConfig {
            after: Some("2025-07-01".into()),
            before: Some("2025-07-04".into()),
            ..Default::default()
        });
        let q = f.to_query(Vec::new(), 250);
        assert_eq!(
            q.taken_after.unwrap().to_rfc3339(),
            "2025-07-01T10:00:00+00:00"
        );
        assert_eq!(
            q.taken_before.unwrap().to_rfc3339(),
            "2025-07-04T14:00:00+00:00"
        );
        assert_eq!(q.page_size, 250);
    }
}
