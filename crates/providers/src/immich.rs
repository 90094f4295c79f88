use crate::{AssetPage, AssetProvider, AssetQuery, ProviderError, RemoteAsset, ResolvedTag};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct ImmichConfig {
    /// API root, e.g. `https://photos.example.com/api`.
    pub url: String,
    pub api_key: String,
}

#[derive(Clone)]
pub struct ImmichClient {
    client: Client,
    cfg: ImmichConfig,
}

impl ImmichClient {
    pub fn new(mut cfg: ImmichConfig) -> Self {
        while cfg.url.ends_with('/') {
            cfg.url.pop();
        }
        Self {
            client: Client::new(),
            cfg,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response, ProviderError> {
        let resp = builder
            .header("x-api-key", &self.cfg.api_key)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(format!("{}: {}", what, e)))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(format!(
                "{}: status {} body {:?}",
                what, status, body
            )));
        }
        Ok(resp)
    }

    async fn all_tags(&self) -> Result<Vec<TagResponseDto>, ProviderError> {
        let url = format!("{}/tags", self.cfg.url);
        let resp = self.send(self.client.get(url), "list tags").await?;
        resp.json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    async fn asset_info(&self, id: &str) -> Result<AssetResponseDto, ProviderError> {
        let url = format!("{}/assets/{}", self.cfg.url, id);
        let resp = self
            .send(self.client.get(url), &format!("asset {}", id))
            .await?;
        resp.json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl AssetProvider for ImmichClient {
    async fn resolve_tags(&self, tags: &[String]) -> Result<Vec<ResolvedTag>, ProviderError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let known = self.all_tags().await?;
        tags.iter()
            .map(|wanted| {
                if let Some(t) = known.iter().find(|t| &t.value == wanted) {
                    return Ok(t.clone().into());
                }
                match known.iter().find(|t| &t.name == wanted) {
                    Some(t) => {
                        warn!(
                            "Using short name match for tag: {} (full name: {})",
                            wanted, t.value
                        );
                        Ok(t.clone().into())
                    }
                    None => Err(ProviderError::UnknownTag(wanted.clone())),
                }
            })
            .collect()
    }

    async fn search_page(
        &self,
        query: &AssetQuery,
        page: u32,
    ) -> Result<AssetPage, ProviderError> {
        let body = MetadataSearchDto {
            page,
            size: query.page_size,
            with_exif: true,
            taken_after: query.taken_after,
            taken_before: query.taken_before,
            model: query.model.clone(),
            tag_ids: if query.tags.is_empty() {
                None
            } else {
                Some(query.tags.iter().map(|t| t.id.clone()).collect())
            },
        };
        let url = format!("{}/search/metadata", self.cfg.url);
        let resp = self
            .send(self.client.post(url).json(&body), "search assets")
            .await?;
        let parsed: SearchResponseDto = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let next_page = match parsed.assets.next_page.as_deref() {
            Some(p) => Some(p.parse::<u32>().map_err(|_| {
                ProviderError::InvalidResponse(format!("invalid nextPage {:?}", p))
            })?),
            None => None,
        };
        debug!(
            "search page {} returned {} assets (next page: {:?})",
            page,
            parsed.assets.items.len(),
            next_page
        );

        let mut assets = Vec::with_capacity(parsed.assets.items.len());
        for item in parsed.assets.items {
            let item = if item.exif_info.is_none() {
                match self.asset_info(&item.id).await {
                    Ok(full) => full,
                    Err(e) => {
                        error!("Failed to get full info for asset ID {}: {}", item.id, e);
                        continue;
                    }
                }
            } else {
                item
            };
            match to_remote(item, &query.tags) {
                Ok(asset) => assets.push(asset),
                Err(e) => warn!("Skipping unreadable asset record: {}", e),
            }
        }
        Ok(AssetPage { assets, next_page })
    }

    async fn update_asset(
        &self,
        id: &str,
        local: NaiveDateTime,
        offset: FixedOffset,
    ) -> Result<(), ProviderError> {
        let body = UpdateAssetDto {
            date_time_original: date_time_original(local, offset)?,
        };
        let url = format!("{}/assets/{}", self.cfg.url, id);
        self.send(self.client.put(url).json(&body), &format!("update asset {}", id))
            .await?;
        Ok(())
    }
}

/// RFC 3339 at millisecond precision, the resolution the server keeps.
fn date_time_original(local: NaiveDateTime, offset: FixedOffset) -> Result<String, ProviderError> {
    let when = offset.from_local_datetime(&local).single().ok_or_else(|| {
        ProviderError::InvalidResponse(format!("cannot place {} at {}", local, offset))
    })?;
    Ok(when.to_rfc3339_opts(SecondsFormat::Millis, false))
}

/// Offset of a server-recorded zone at `instant`. Accepts `UTC`, `UTC±H[:MM]`
/// and IANA names.
pub fn zone_offset_at(zone: &str, instant: DateTime<Utc>) -> Option<FixedOffset> {
    let zone = zone.trim();
    if zone == "UTC" || zone == "Z" {
        return FixedOffset::east_opt(0);
    }
    if let Some(rest) = zone.strip_prefix("UTC") {
        let (sign, rest) = match rest.chars().next()? {
            '+' => (1, &rest[1..]),
            '-' => (-1, &rest[1..]),
            _ => return None,
        };
        let (hours, minutes) = match rest.split_once(':') {
            Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
            None => (rest.parse::<i32>().ok()?, 0),
        };
        if hours > 14 || minutes > 59 {
            return None;
        }
        return FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60));
    }
    let tz: chrono_tz::Tz = zone.parse().ok()?;
    Some(instant.with_timezone(&tz).offset().fix())
}

fn to_remote(dto: AssetResponseDto, guaranteed: &[ResolvedTag]) -> Result<RemoteAsset, ProviderError> {
    let exif = dto.exif_info.unwrap_or_default();

    let zoned = match (&exif.date_time_original, &exif.time_zone) {
        (Some(original), Some(zone)) => {
            let instant = DateTime::parse_from_rfc3339(original)
                .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", dto.id, e)))?
                .with_timezone(&Utc);
            match zone_offset_at(zone, instant) {
                Some(offset) => Some((instant.with_timezone(&offset).naive_local(), offset)),
                None => {
                    warn!("Asset ID {} has unknown time zone: {}", dto.id, zone);
                    None
                }
            }
        }
        _ => None,
    };

    let (local_timestamp, offset) = match zoned {
        Some((local, offset)) => (local, Some(offset)),
        None => {
            // localDateTime encodes the wall clock as if it were UTC.
            let local = DateTime::parse_from_rfc3339(&dto.local_date_time)
                .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", dto.id, e)))?
                .naive_utc();
            (local, None)
        }
    };

    let mut tags = BTreeSet::new();
    for t in dto.tags.iter().map(|t| (&t.name, &t.value)).chain(
        guaranteed.iter().map(|t| (&t.name, &t.value)),
    ) {
        tags.insert(t.0.clone());
        tags.insert(t.1.clone());
    }

    Ok(RemoteAsset {
        id: dto.id,
        original_filename: dto.original_file_name,
        local_timestamp,
        offset,
        model: exif.model,
        tags,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataSearchDto {
    page: u32,
    size: u32,
    with_exif: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    taken_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    taken_before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAssetDto {
    date_time_original: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponseDto {
    assets: SearchAssetResponseDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchAssetResponseDto {
    items: Vec<AssetResponseDto>,
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetResponseDto {
    id: String,
    original_file_name: String,
    local_date_time: String,
    exif_info: Option<ExifResponseDto>,
    #[serde(default)]
    tags: Vec<TagResponseDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExifResponseDto {
    date_time_original: Option<String>,
    time_zone: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TagResponseDto {
    id: String,
    name: String,
    value: String,
}

impl From<TagResponseDto> for ResolvedTag {
    fn from(t: TagResponseDto) -> Self {
        ResolvedTag {
            id: t.id,
            name: t.name,
            value: t.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dto(json: serde_json::Value) -> AssetResponseDto {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn zone_names_and_utc_forms() {
        let july = Utc.with_ymd_and_hms(2025, 7, 4, 17, 0, 0).unwrap();
        assert_eq!(zone_offset_at("UTC", july), FixedOffset::east_opt(0));
        assert_eq!(zone_offset_at("UTC-9", july), FixedOffset::west_opt(9 * 3600));
        assert_eq!(
            zone_offset_at("UTC+5:30", july),
            FixedOffset::east_opt(5 * 3600 + 1800)
        );
        assert_eq!(
            zone_offset_at("America/Chicago", july),
            FixedOffset::west_opt(5 * 3600)
        );
        assert_eq!(zone_offset_at("Mars/Olympus", july), None);
    }

    #[test]
    fn remote_asset_uses_zone_when_known() {
        let asset = to_remote(
            dto(serde_json::json!({
                "id": "a1",
                "originalFileName": "P1070427.jpg",
                "localDateTime": "2025-07-04T03:00:00.000Z",
                "exifInfo": {
                    "dateTimeOriginal": "2025-07-04T12:00:00.000Z",
                    "timeZone": "UTC-9",
                    "model": "DMC-GX85"
                },
                "tags": [{"id": "t1", "name": "Trip", "value": "2025/Trip"}]
            })),
            &[],
        )
        .unwrap();
        let expected = NaiveDate::from_ymd_opt(2025, 7, 4)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap();
        assert_eq!(asset.local_timestamp, expected);
        assert_eq!(asset.offset, FixedOffset::west_opt(9 * 3600));
        assert_eq!(asset.model.as_deref(), Some("DMC-GX85"));
        assert!(asset.tags.contains("Trip"));
        assert!(asset.tags.contains("2025/Trip"));
    }

    #[test]
    fn remote_asset_without_zone_falls_back_to_local_wall_clock() {
        let guaranteed = vec![ResolvedTag {
            id: "t9".into(),
            name: "Kids".into(),
            value: "Family/Kids".into(),
        }];
        let asset = to_remote(
            dto(serde_json::json!({
                "id": "a2",
                "originalFileName": "IMG_0001.HEIC",
                "localDateTime": "2024-01-04T08:30:00.000Z",
                "exifInfo": { "dateTimeOriginal": "2024-01-04T14:30:00.000Z" }
            })),
            &guaranteed,
        )
        .unwrap();
        assert_eq!(asset.offset, None);
        assert_eq!(asset.local_timestamp.to_string(), "2024-01-04 08:30:00");
        assert!(asset.tags.contains("Family/Kids"));
    }

    #[test]
    fn update_body_reads_back_unchanged() {
        let local = NaiveDate::from_ymd_opt(2025, 7, 4)
            .unwrap()
            .and_hms_milli_opt(8, 0, 0, 123)
            .unwrap();
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let sent = date_time_original(local, offset).unwrap();
        assert_eq!(sent, "2025-07-04T08:00:00.123-05:00");

        let asset = to_remote(
            dto(serde_json::json!({
                "id": "a1",
                "originalFileName": "P1070427.jpg",
                "localDateTime": "2025-07-04T08:00:00.123Z",
                "exifInfo": {
                    "dateTimeOriginal": "2025-07-04T13:00:00.123Z",
                    "timeZone": "UTC-5"
                }
            })),
            &[],
        )
        .unwrap();
        assert_eq!(asset.local_timestamp, local);
        assert_eq!(asset.offset, Some(offset));
    }
}
