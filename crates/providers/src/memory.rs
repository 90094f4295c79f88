use crate::{AssetPage, AssetProvider, AssetQuery, ProviderError, RemoteAsset, ResolvedTag};
use chrono::{FixedOffset, NaiveDateTime};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

/// A recorded `update_asset` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCall {
    pub id: String,
    pub local: NaiveDateTime,
    pub offset: FixedOffset,
}

/// Asset service held in memory. Listing ignores the query's narrowing, so
/// every stored asset is returned and callers see the unfiltered stream.
#[derive(Debug)]
pub struct InMemoryProvider {
    state: Mutex<State>,
    tags: Vec<ResolvedTag>,
    page_size: usize,
    failing: HashSet<String>,
}

#[derive(Debug, Default)]
struct State {
    assets: Vec<RemoteAsset>,
    updates: Vec<UpdateCall>,
}

impl InMemoryProvider {
    pub fn new(assets: Vec<RemoteAsset>) -> Self {
        Self {
            state: Mutex::new(State {
                assets,
                updates: Vec::new(),
            }),
            tags: Vec::new(),
            page_size: 100,
            failing: HashSet::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<ResolvedTag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make `update_asset` fail for this id.
    pub fn fail_updates_for(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn updates(&self) -> Vec<UpdateCall> {
        self.lock().updates.clone()
    }

    pub fn asset(&self, id: &str) -> Option<RemoteAsset> {
        self.lock().assets.iter().find(|a| a.id == id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl AssetProvider for InMemoryProvider {
    async fn resolve_tags(&self, tags: &[String]) -> Result<Vec<ResolvedTag>, ProviderError> {
        tags.iter()
            .map(|wanted| {
                self.tags
                    .iter()
                    .find(|t| &t.value == wanted)
                    .or_else(|| self.tags.iter().find(|t| &t.name == wanted))
                    .cloned()
                    .ok_or_else(|| ProviderError::UnknownTag(wanted.clone()))
            })
            .collect()
    }

    async fn search_page(
        &self,
        _query: &AssetQuery,
        page: u32,
    ) -> Result<AssetPage, ProviderError> {
        let state = self.lock();
        let start = (page.max(1) as usize - 1) * self.page_size;
        let assets: Vec<RemoteAsset> = state
            .assets
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();
        let next_page = if start + self.page_size < state.assets.len() {
            Some(page.max(1) + 1)
        } else {
            None
        };
        debug!("in-memory page {} holds {} assets", page, assets.len());
        Ok(AssetPage { assets, next_page })
    }

    async fn update_asset(
        &self,
        id: &str,
        local: NaiveDateTime,
        offset: FixedOffset,
    ) -> Result<(), ProviderError> {
        if self.failing.contains(id) {
            return Err(ProviderError::RequestFailed(format!(
                "update asset {}: status 500",
                id
            )));
        }
        let mut state = self.lock();
        let asset = state
            .assets
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| ProviderError::NotFound(format!("asset {}", id)))?;
        asset.local_timestamp = local;
        asset.offset = Some(offset);
        state.updates.push(UpdateCall {
            id: id.to_string(),
            local,
            offset,
        });
        Ok(())
    }
}
