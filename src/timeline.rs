//! Chronological reconstruction around an anchor.
//!
//! The anchor comes from an explicit chunk id, a date (midnight UTC), or
//! a search query resolved to its top hit. The window
//! `[anchor - before, anchor + after]` is scanned across every layer of
//! the store's metadata — timeline is cross-layer by design, so facts,
//! events, and operating notes that co-occur in time appear together.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::error::{MemexError, MemexResult};
use crate::models::{Chunk, Layer};
use crate::search::SearchEngine;
use crate::store::Store;

/// How the anchor point is specified.
#[derive(Debug, Clone)]
pub enum Anchor {
    Id(String),
    Date(NaiveDate),
    Query(String),
}

#[derive(Debug, Serialize)]
pub struct TimelineWindow {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub end: DateTime<Utc>,
    pub before_hours: i64,
    pub after_hours: i64,
}

#[derive(Debug, Serialize)]
pub struct TimelineEntry {
    pub id: String,
    pub layer: Layer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub preview: String,
    /// True on exactly one entry: the anchor chunk, or for date anchors
    /// the in-window chunk nearest the anchor timestamp.
    pub anchor: bool,
}

/// Ordered reconstruction: entries ascend by timestamp, ties broken by
/// id. A window with no entries besides the anchor is valid output.
#[derive(Debug, Serialize)]
pub struct Timeline {
    pub window: TimelineWindow,
    pub entries: Vec<TimelineEntry>,
}

/// Reconstruct the timeline around `anchor` with an inclusive window of
/// `before_hours`/`after_hours` around the anchor timestamp.
///
/// The anchor chunk itself is always part of the output, even when its
/// timestamp falls outside a window edge.
pub fn timeline(
    store: &Store,
    anchor: &Anchor,
    before_hours: i64,
    after_hours: i64,
    anchor_floor: f64,
) -> MemexResult<Timeline> {
    let (anchor_ts, mut anchor_id) = resolve_anchor(store, anchor, anchor_floor)?;

    let start = anchor_ts - Duration::hours(before_hours);
    let end = anchor_ts + Duration::hours(after_hours);

    // A date anchor names no chunk of its own; flag the in-window chunk
    // nearest to the anchor timestamp instead, when one exists.
    if anchor_id.is_none() {
        anchor_id = nearest_in_window(store, anchor_ts, start, end);
    }

    let mut entries: Vec<TimelineEntry> = store
        .chunks
        .iter()
        .filter(|chunk| {
            let in_window = chunk.timestamp >= start && chunk.timestamp <= end;
            in_window || anchor_id.as_deref() == Some(chunk.id.as_str())
        })
        .map(|chunk| to_entry(chunk, anchor_id.as_deref()))
        .collect();

    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

    Ok(Timeline {
        window: TimelineWindow {
            start,
            end,
            before_hours,
            after_hours,
        },
        entries,
    })
}

/// Resolve the anchor to a timestamp and, where it names a chunk, that
/// chunk's id.
fn resolve_anchor(
    store: &Store,
    anchor: &Anchor,
    anchor_floor: f64,
) -> MemexResult<(DateTime<Utc>, Option<String>)> {
    match anchor {
        Anchor::Id(id) => {
            let chunk = store
                .get(id)
                .ok_or_else(|| MemexError::UnknownId(id.clone()))?;
            Ok((chunk.timestamp, Some(chunk.id.clone())))
        }
        Anchor::Date(date) => {
            let midnight = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap());
            Ok((midnight, None))
        }
        Anchor::Query(query) => {
            let engine = SearchEngine::new(store);
            let hit = engine
                .top_hit(query, anchor_floor)
                .ok_or_else(|| MemexError::NoAnchorFound {
                    query: query.clone(),
                })?;
            Ok((hit.timestamp, Some(hit.id)))
        }
    }
}

fn nearest_in_window(
    store: &Store,
    anchor_ts: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<String> {
    store
        .chunks
        .iter()
        .filter(|c| c.timestamp >= start && c.timestamp <= end)
        .min_by(|a, b| {
            let da = (a.timestamp - anchor_ts).num_seconds().abs();
            let db = (b.timestamp - anchor_ts).num_seconds().abs();
            da.cmp(&db).then_with(|| a.id.cmp(&b.id))
        })
        .map(|c| c.id.clone())
}

fn to_entry(chunk: &Chunk, anchor_id: Option<&str>) -> TimelineEntry {
    TimelineEntry {
        id: chunk.id.clone(),
        layer: chunk.layer,
        entity: chunk.entity.clone(),
        timestamp: chunk.timestamp,
        preview: chunk.preview(),
        anchor: anchor_id == Some(chunk.id.as_str()),
    }
}
