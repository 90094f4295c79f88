//! Normalizes a file's raw tag map into a canonical local timestamp plus an
//! optional embedded UTC offset.
//!
//! Photo (EXIF) and movie (QuickTime) containers name their capture-time tags
//! differently. Rules are tried in the order of [`RULES`]; the first rule
//! whose timestamp tag is present decides, even if a later rule would parse.

use crate::error::ReconcileError;
use crate::models::{EmbeddedOffset, LocalFileMetadata, TagMap};
use chrono::{FixedOffset, NaiveDateTime, Timelike};
use std::path::Path;

const NANOS_PER_MILLI: u32 = 1_000_000;

struct TimestampRule {
    tag: &'static str,
    subsec: Option<&'static str>,
    offset: Option<&'static str>,
}

const RULES: &[TimestampRule] = &[
    TimestampRule {
        tag: "EXIF:DateTimeOriginal",
        subsec: Some("EXIF:SubSecTimeOriginal"),
        offset: Some("EXIF:OffsetTimeOriginal"),
    },
    TimestampRule {
        tag: "EXIF:DateTimeDigitized",
        subsec: Some("EXIF:SubSecTimeDigitized"),
        offset: Some("EXIF:OffsetTimeDigitized"),
    },
    // QuickTime dates carry their offset inline.
    TimestampRule {
        tag: "QuickTime:CreationDate",
        subsec: None,
        offset: None,
    },
    TimestampRule {
        tag: "QuickTime:ContentCreateDate",
        subsec: None,
        offset: None,
    },
    TimestampRule {
        tag: "EXIF:DateTime",
        subsec: Some("EXIF:SubSecTime"),
        offset: Some("EXIF:OffsetTime"),
    },
];

/// Every tag the rules can read, for sources that fetch selectively.
pub fn recognized_tags() -> impl Iterator<Item = &'static str> {
    RULES
        .iter()
        .flat_map(|r| std::iter::once(r.tag).chain(r.subsec).chain(r.offset))
}

pub fn normalize(path: &Path, tags: &TagMap) -> Result<LocalFileMetadata, ReconcileError> {
    let (rule, raw) = RULES
        .iter()
        .find_map(|r| {
            tags.get(r.tag)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| (r, v))
        })
        .ok_or_else(|| ReconcileError::metadata(path, "no recognized timestamp tag"))?;

    let (mut local, inline_offset) = parse_timestamp(raw).ok_or_else(|| {
        ReconcileError::metadata(path, format!("unparsable {} value {:?}", rule.tag, raw))
    })?;

    if local.nanosecond() == 0 {
        if let Some(nanos) = rule
            .subsec
            .and_then(|t| tags.get(t))
            .and_then(|v| subsec_nanos(v))
        {
            local = local.with_nanosecond(nanos).unwrap_or(local);
        }
    }

    // Stored remotely at millisecond precision; finer digits would never
    // compare equal on the next run.
    let millis = local.nanosecond() / NANOS_PER_MILLI * NANOS_PER_MILLI;
    local = local.with_nanosecond(millis).unwrap_or(local);

    let tagged_offset = match rule.offset.and_then(|t| tags.get(t).map(|v| (t, v.trim()))) {
        Some((_, "")) | None => None,
        Some((tag, value)) => Some(parse_offset(value).ok_or_else(|| {
            ReconcileError::metadata(path, format!("unparsable {} value {:?}", tag, value))
        })?),
    };

    let offset = match tagged_offset.or(inline_offset) {
        Some(o) => EmbeddedOffset::Known(o),
        None => EmbeddedOffset::Unknown,
    };

    Ok(LocalFileMetadata {
        path: path.to_path_buf(),
        local_timestamp: local,
        offset,
        source_tag: rule.tag,
    })
}

/// Parses `YYYY:MM:DD HH:MM:SS[.f][±HH:MM|Z]`; dashes are accepted in the
/// date part and `T` as the separator.
pub fn parse_timestamp(raw: &str) -> Option<(NaiveDateTime, Option<FixedOffset>)> {
    let raw = raw.trim();
    let head = raw.get(..19)?;
    let tail = raw.get(19..)?;

    let mut body: String = head
        .char_indices()
        .map(|(i, c)| match (i, c) {
            (4 | 7, '-') => ':',
            (10, 'T') => ' ',
            _ => c,
        })
        .collect();

    let (fraction, offset) = match tail.find(|c: char| c == '+' || c == '-' || c == 'Z') {
        Some(i) => (&tail[..i], Some(parse_offset(&tail[i..])?)),
        None => (tail, None),
    };
    if !fraction.is_empty() {
        if !fraction.starts_with('.') || !fraction[1..].bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        body.push_str(fraction);
    }

    let local = NaiveDateTime::parse_from_str(&body, "%Y:%m:%d %H:%M:%S%.f").ok()?;
    Some((local, offset))
}

/// Parses `±HH:MM`, `±HHMM`, `±HH` or `Z`.
pub fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw == "Z" {
        return FixedOffset::east_opt(0);
    }
    let sign = match raw.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let digits: String = raw[1..].chars().filter(|c| *c != ':').collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (
            digits[..2].parse::<i32>().ok()?,
            digits[2..].parse::<i32>().ok()?,
        ),
        _ => return None,
    };
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// `"5"` is half a second, `"123"` is 123 ms.
fn subsec_nanos(raw: &str) -> Option<u32> {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .take(9)
        .collect();
    if digits.is_empty() {
        return None;
    }
    let scale = 10u32.pow(9 - digits.len() as u32);
    digits.parse::<u32>().ok().map(|n| n * scale)
}
