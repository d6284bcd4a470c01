//! Source walker for the three memory layers.
//!
//! Enumerates daily logs, the entity areas tree, and tacit-knowledge
//! files under the workspace root and yields [`RawRecord`]s tagged with
//! layer and provenance. A single unreadable or malformed file never
//! fails the walk: it is logged, collected as a [`SkipReport`], and the
//! walk continues.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::MemexResult;
use crate::models::{FactRecord, Layer, RawRecord, RecordKind};

/// A per-file failure recovered during the walk.
#[derive(Debug, Clone, Serialize)]
pub struct SkipReport {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything a walk produced: the records plus the files it had to skip.
#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub records: Vec<RawRecord>,
    pub skipped: Vec<SkipReport>,
}

impl WalkOutcome {
    fn skip(&mut self, path: &Path, reason: impl ToString) {
        let reason = reason.to_string();
        warn!(path = %path.display(), %reason, "skipping source file");
        self.skipped.push(SkipReport {
            path: path.to_path_buf(),
            reason,
        });
    }
}

/// Walk all three layers of the workspace.
///
/// Records come back sorted by source path for deterministic downstream
/// processing. Missing layer directories are fine; they just contribute
/// nothing.
pub fn walk_workspace(config: &Config) -> MemexResult<WalkOutcome> {
    let mut outcome = WalkOutcome::default();

    walk_daily(config, &mut outcome)?;
    walk_areas(config, &mut outcome);
    walk_tacit(config, &mut outcome)?;

    outcome
        .records
        .sort_by(|a, b| a.source.cmp(&b.source).then(a.timestamp.cmp(&b.timestamp)));

    debug!(
        records = outcome.records.len(),
        skipped = outcome.skipped.len(),
        "walk complete"
    );
    Ok(outcome)
}

fn walk_daily(config: &Config, outcome: &mut WalkOutcome) -> MemexResult<()> {
    let daily_dir = config.daily_path();
    if !daily_dir.exists() {
        return Ok(());
    }

    let include = build_globset(&config.workspace.daily_include)?;
    let exclude = build_globset(&config.workspace.daily_exclude)?;

    for entry in WalkDir::new(&daily_dir).max_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e.path().unwrap_or(&daily_dir).to_path_buf();
                outcome.skip(&path, e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if exclude.is_match(&name) || !include.is_match(&name) {
            continue;
        }

        let mtime = file_mtime(path);
        let timestamp = date_from_filename(&name)
            .map(|d| Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap()))
            .unwrap_or(mtime);

        match std::fs::read_to_string(path) {
            Ok(body) => outcome.records.push(RawRecord {
                layer: Layer::Daily,
                source: relative_source(config, path),
                entity: None,
                timestamp,
                mtime,
                kind: RecordKind::Narrative { body },
            }),
            Err(e) => outcome.skip(path, e),
        }
    }

    Ok(())
}

fn walk_areas(config: &Config, outcome: &mut WalkOutcome) {
    let areas_dir = config.areas_path();
    if !areas_dir.exists() {
        return;
    }

    // areas/<kind>/<entity>/{summary.md, facts.json}
    for entry in WalkDir::new(&areas_dir).min_depth(2).max_depth(2) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e.path().unwrap_or(&areas_dir).to_path_buf();
                outcome.skip(&path, e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let entity_dir = entry.path();
        let entity = entity_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        let area_kind = entity_dir
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string());

        let summary = entity_dir.join("summary.md");
        if summary.is_file() {
            match std::fs::read_to_string(&summary) {
                Ok(body) => {
                    let mtime = file_mtime(&summary);
                    outcome.records.push(RawRecord {
                        layer: Layer::KnowledgeGraph,
                        source: relative_source(config, &summary),
                        entity: entity.clone(),
                        timestamp: mtime,
                        mtime,
                        kind: RecordKind::Narrative { body },
                    });
                }
                Err(e) => outcome.skip(&summary, e),
            }
        }

        let facts = entity_dir.join("facts.json");
        if facts.is_file() {
            read_facts_file(config, &facts, entity.clone(), area_kind.as_deref(), outcome);
        }
    }
}

fn read_facts_file(
    config: &Config,
    path: &Path,
    entity: Option<String>,
    area_kind: Option<&str>,
    outcome: &mut WalkOutcome,
) {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            outcome.skip(path, e);
            return;
        }
    };

    let mut facts = match parse_facts(&content) {
        Ok(f) => f,
        Err(e) => {
            outcome.skip(path, format!("malformed facts file: {}", e));
            return;
        }
    };

    // A fact referenced by another fact's `supersedes` stays in the
    // corpus but is down-ranked out of default search.
    let superseded_ids: Vec<String> = facts
        .iter()
        .filter_map(|f| f.supersedes.clone())
        .collect();
    for fact in &mut facts {
        if let Some(id) = &fact.id {
            fact.superseded = superseded_ids.contains(id);
        }
    }

    let mtime = file_mtime(path);
    for mut fact in facts {
        if fact.fact.trim().is_empty() {
            debug!(path = %path.display(), "dropping fact record with empty text");
            continue;
        }
        if fact.category.is_none() {
            fact.category = area_kind.map(|k| k.to_string());
        }
        let timestamp = fact
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(mtime);
        outcome.records.push(RawRecord {
            layer: Layer::KnowledgeGraph,
            source: relative_source(config, path),
            entity: entity.clone(),
            timestamp,
            mtime,
            kind: RecordKind::Fact(fact),
        });
    }
}

/// Facts files come in two shapes: a bare array, or `{"items": [...]}`.
fn parse_facts(content: &str) -> serde_json::Result<Vec<FactRecord>> {
    #[derive(serde::Deserialize)]
    struct Wrapper {
        items: Vec<FactRecord>,
    }

    match serde_json::from_str::<Vec<FactRecord>>(content) {
        Ok(facts) => Ok(facts),
        Err(first_err) => match serde_json::from_str::<Wrapper>(content) {
            Ok(w) => Ok(w.items),
            Err(_) => Err(first_err),
        },
    }
}

fn walk_tacit(config: &Config, outcome: &mut WalkOutcome) -> MemexResult<()> {
    let root = &config.workspace.root;
    if !root.exists() {
        return Ok(());
    }
    let tacit = build_globset(&config.workspace.tacit_globs)?;
    if config.workspace.tacit_globs.is_empty() {
        return Ok(());
    }

    let daily_dir = config.daily_path();
    let areas_dir = config.areas_path();

    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.path() != daily_dir && e.path() != areas_dir);
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                outcome.skip(&path, e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(path);
        if !tacit.is_match(rel) {
            continue;
        }

        let mtime = file_mtime(path);
        match std::fs::read_to_string(path) {
            Ok(body) => outcome.records.push(RawRecord {
                layer: Layer::Tacit,
                source: relative_source(config, path),
                entity: None,
                timestamp: mtime,
                mtime,
                kind: RecordKind::TacitNote { body },
            }),
            Err(e) => outcome.skip(path, e),
        }
    }

    Ok(())
}

fn build_globset(patterns: &[String]) -> MemexResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern)
                .map_err(|e| crate::error::MemexError::Config(format!("bad glob: {}", e)))?,
        );
    }
    builder
        .build()
        .map_err(|e| crate::error::MemexError::Config(format!("bad glob set: {}", e)))
}

fn relative_source(config: &Config, path: &Path) -> PathBuf {
    path.strip_prefix(&config.workspace.root)
        .unwrap_or(path)
        .to_path_buf()
}

fn file_mtime(path: &Path) -> DateTime<Utc> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    let secs = modified
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

/// `2026-01-30.md` → Jan 30, 2026. Anything without a leading date yields
/// `None` and the caller falls back to the file's modification time.
fn date_from_filename(name: &str) -> Option<NaiveDate> {
    let prefix = name.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Parse a fact timestamp: RFC 3339 first, then a naive datetime, then a
/// bare date at midnight UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
    }
    None
}
