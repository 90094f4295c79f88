//! Remote photo-service abstractions: asset records, paged listing, updates.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

pub mod immich;
pub mod memory;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("no such tag found on server: {0}")]
    UnknownTag(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One photo or video record as the remote service currently describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAsset {
    pub id: String,
    pub original_filename: String,
    /// Wall-clock capture time, without offset.
    pub local_timestamp: NaiveDateTime,
    /// `None` when the service has no timezone recorded for the asset.
    pub offset: Option<FixedOffset>,
    pub model: Option<String>,
    pub tags: BTreeSet<String>,
}

impl RemoteAsset {
    /// Calendar date used by date-range filters.
    pub fn capture_date(&self) -> NaiveDate {
        self.local_timestamp.date()
    }
}

/// A tag as known to the server, resolved from a user-supplied name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTag {
    pub id: String,
    pub name: String,
    pub value: String,
}

/// Server-side narrowing of an asset listing. Providers may ignore any of
/// these; callers must re-filter exactly on their side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetQuery {
    pub taken_after: Option<DateTime<Utc>>,
    pub taken_before: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub tags: Vec<ResolvedTag>,
    pub page_size: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AssetPage {
    pub assets: Vec<RemoteAsset>,
    pub next_page: Option<u32>,
}

#[async_trait::async_trait]
pub trait AssetProvider: Send + Sync {
    /// Resolve tag names (full value first, then short name) to server tags.
    async fn resolve_tags(&self, tags: &[String]) -> Result<Vec<ResolvedTag>, ProviderError>;

    /// Fetch one page of assets. Pages are numbered from 1.
    async fn search_page(&self, query: &AssetQuery, page: u32)
        -> Result<AssetPage, ProviderError>;

    /// Set the asset's capture time to `local` at `offset`.
    async fn update_asset(
        &self,
        id: &str,
        local: NaiveDateTime,
        offset: FixedOffset,
    ) -> Result<(), ProviderError>;
}
