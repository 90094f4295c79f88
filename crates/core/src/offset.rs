//! Picks the UTC offset to record for a local timestamp.

use crate::error::ReconcileError;
use crate::models::EmbeddedOffset;
use chrono::{Duration, FixedOffset, LocalResult, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;

#[derive(Debug, Clone, Default)]
pub struct OffsetResolver {
    fallback: Option<Tz>,
}

impl OffsetResolver {
    /// Unknown timezone names are rejected here, before any asset is processed.
    pub fn new(fallback: Option<&str>) -> Result<Self, ReconcileError> {
        let fallback = fallback
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|_| ReconcileError::config(format!("no such time zone known: {:?}", name)))
            })
            .transpose()?;
        Ok(Self { fallback })
    }

    pub fn fallback(&self) -> Option<Tz> {
        self.fallback
    }

    /// Embedded offset wins; otherwise the fallback zone's offset at `local`.
    pub fn resolve(
        &self,
        local: NaiveDateTime,
        embedded: EmbeddedOffset,
    ) -> Result<FixedOffset, ReconcileError> {
        if let EmbeddedOffset::Known(offset) = embedded {
            return Ok(offset);
        }
        match &self.fallback {
            Some(tz) => Ok(zone_offset_at(tz, local)),
            None => Err(ReconcileError::UnresolvedOffset(local.to_string())),
        }
    }
}

/// Offset `tz` had at wall-clock time `local`. At a DST overlap the earlier
/// offset is used; inside a DST gap, the offset in force just before it.
pub fn zone_offset_at(tz: &Tz, local: NaiveDateTime) -> FixedOffset {
    let mut probe = local;
    for _ in 0..8 {
        match tz.from_local_datetime(&probe) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => return dt.offset().fix(),
            LocalResult::None => probe -= Duration::minutes(30),
        }
    }
    tz.offset_from_utc_datetime(&local).fix()
}
