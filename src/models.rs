//! Core data models used throughout memex.
//!
//! These types represent the raw records, chunks, and search results that
//! flow through the indexing and retrieval pipeline.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum preview length in characters for the `index` result form.
pub const PREVIEW_CHARS: usize = 200;

/// The three memory tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Durable per-entity facts and summaries.
    KnowledgeGraph,
    /// Chronological daily logs.
    Daily,
    /// Distilled operating notes.
    Tacit,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::KnowledgeGraph, Layer::Daily, Layer::Tacit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::KnowledgeGraph => "knowledge_graph",
            Layer::Daily => "daily",
            Layer::Tacit => "tacit",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "knowledge_graph" => Ok(Layer::KnowledgeGraph),
            "daily" => Ok(Layer::Daily),
            "tacit" => Ok(Layer::Tacit),
            other => Err(format!(
                "unknown layer '{}' (expected knowledge_graph, daily, or tacit)",
                other
            )),
        }
    }
}

/// One structured fact from an entity's `facts.json`.
///
/// Only `fact` is required; everything else degrades gracefully. A fact
/// that carries its own `id` keeps it as the chunk id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub fact: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Provenance label (e.g. `conversation`, `imported`).
    #[serde(default)]
    pub source: Option<String>,
    /// Id of an older fact this one replaces.
    #[serde(default)]
    pub supersedes: Option<String>,
    /// Set by the walker when another fact in the same file supersedes
    /// this one. Not part of the on-disk record.
    #[serde(skip)]
    pub superseded: bool,
}

/// Tagged union of record kinds produced by the source walker.
#[derive(Debug, Clone)]
pub enum RecordKind {
    /// Markdown with a heading hierarchy (daily logs, entity summaries).
    Narrative { body: String },
    /// A single structured fact record.
    Fact(FactRecord),
    /// Free text with no enforced heading convention.
    TacitNote { body: String },
}

/// Raw record yielded by the source walker before chunking.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub layer: Layer,
    pub source: PathBuf,
    /// Associated subject, derived from the containing directory for
    /// knowledge-graph records.
    pub entity: Option<String>,
    /// Point in time the record represents. Filename date or record field
    /// where available, file modification time otherwise.
    pub timestamp: DateTime<Utc>,
    /// File modification time, used by incremental builds to detect
    /// changed sources.
    pub mtime: DateTime<Utc>,
    pub kind: RecordKind,
}

/// The atomic retrievable unit. Immutable once produced by a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable short id, deterministic function of content + source path.
    pub id: String,
    pub content: String,
    pub layer: Layer,
    /// Originating file path, workspace-relative where possible.
    pub source: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Category label from the section heading or fact record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Superseded facts stay in the corpus but are excluded from ranked
    /// search by default.
    #[serde(default)]
    pub superseded: bool,
}

impl Chunk {
    /// Short single-line rendering of `content`, bounded to
    /// [`PREVIEW_CHARS`] characters.
    pub fn preview(&self) -> String {
        let flat: String = self
            .content
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if flat.chars().count() <= PREVIEW_CHARS {
            flat
        } else {
            // Leave room for the ellipsis so the bound holds exactly.
            let truncated: String = flat.chars().take(PREVIEW_CHARS - 1).collect();
            format!("{}…", truncated.trim_end())
        }
    }
}

/// A ranked search result. `content` is populated only for the `full`
/// result form.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub layer: Layer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub source: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn chunk_with_content(content: &str) -> Chunk {
        Chunk {
            id: "abc12345".to_string(),
            content: content.to_string(),
            layer: Layer::Daily,
            source: "memory/2026-01-30.md".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 30, 0, 0, 0).unwrap(),
            entity: None,
            category: None,
            superseded: false,
        }
    }

    #[test]
    fn test_layer_round_trip() {
        for layer in Layer::ALL {
            assert_eq!(layer.as_str().parse::<Layer>().unwrap(), layer);
        }
        assert!("tools".parse::<Layer>().is_err());
    }

    #[test]
    fn test_preview_flattens_newlines() {
        let chunk = chunk_with_content("## Heading\n\nBody line one.\nBody line two.");
        let preview = chunk.preview();
        assert!(!preview.contains('\n'));
        assert!(preview.starts_with("## Heading"));
    }

    #[test]
    fn test_preview_bounded() {
        let chunk = chunk_with_content(&"word ".repeat(200));
        let preview = chunk.preview();
        assert!(preview.chars().count() <= PREVIEW_CHARS);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn test_fact_record_minimal_json() {
        let fact: FactRecord = serde_json::from_str(r#"{"fact": "Alice joined Acme"}"#).unwrap();
        assert_eq!(fact.fact, "Alice joined Acme");
        assert!(fact.id.is_none());
        assert!(!fact.superseded);
    }
}
