//! TOML configuration for the memex workspace.
//!
//! All layer locations, chunking thresholds, and retrieval tuning live in
//! a single config file. Every field except `workspace.root` has a
//! default, so a minimal config is just:
//!
//! ```toml
//! [workspace]
//! root = "/home/me/notes"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{MemexError, MemexResult};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    /// Workspace root. All other paths resolve relative to it.
    pub root: PathBuf,
    /// Directory of daily logs (`YYYY-MM-DD.md`).
    #[serde(default = "default_daily_dir")]
    pub daily_dir: PathBuf,
    /// Entity areas tree: `<areas>/<kind>/<entity>/{summary.md,facts.json}`.
    #[serde(default = "default_areas_dir")]
    pub areas_dir: PathBuf,
    /// Glob patterns (relative to root) for tacit-knowledge files.
    #[serde(default = "default_tacit_globs")]
    pub tacit_globs: Vec<String>,
    /// Include patterns for files inside the daily directory.
    #[serde(default = "default_daily_include")]
    pub daily_include: Vec<String>,
    #[serde(default)]
    pub daily_exclude: Vec<String>,
}

fn default_daily_dir() -> PathBuf {
    PathBuf::from("memory")
}
fn default_areas_dir() -> PathBuf {
    PathBuf::from("areas")
}
fn default_tacit_globs() -> Vec<String> {
    vec![
        "MEMORY.md".to_string(),
        "AGENTS.md".to_string(),
        "HEARTBEAT.md".to_string(),
    ]
}
fn default_daily_include() -> Vec<String> {
    vec!["*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Persisted index artifact, relative to the workspace root.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".memex/index.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Chunks shorter than this carry no retrievable signal and are dropped.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
        }
    }
}

fn default_min_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default number of ranked results.
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    /// Vocabulary cap for the term-weighting model.
    #[serde(default = "default_max_vocab")]
    pub max_vocab: usize,
    /// Include word-pair (bigram) terms.
    #[serde(default = "default_bigrams")]
    pub bigrams: bool,
    /// Terms present in more than this fraction of chunks are pruned.
    #[serde(default = "default_max_df")]
    pub max_df: f64,
    /// Minimum cosine score for a query to anchor a timeline.
    #[serde(default = "default_anchor_floor")]
    pub anchor_floor: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
            max_vocab: default_max_vocab(),
            bigrams: default_bigrams(),
            max_df: default_max_df(),
            anchor_floor: default_anchor_floor(),
        }
    }
}

fn default_final_limit() -> usize {
    10
}
fn default_max_vocab() -> usize {
    5000
}
fn default_bigrams() -> bool {
    true
}
fn default_max_df() -> f64 {
    0.95
}
fn default_anchor_floor() -> f64 {
    0.05
}

impl Config {
    /// Default configuration rooted at the given directory. Used when no
    /// config file exists.
    pub fn for_root(root: &Path) -> Config {
        Config {
            workspace: WorkspaceConfig {
                root: root.to_path_buf(),
                daily_dir: default_daily_dir(),
                areas_dir: default_areas_dir(),
                tacit_globs: default_tacit_globs(),
                daily_include: default_daily_include(),
                daily_exclude: Vec::new(),
            },
            index: IndexConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }

    pub fn daily_path(&self) -> PathBuf {
        self.workspace.root.join(&self.workspace.daily_dir)
    }

    pub fn areas_path(&self) -> PathBuf {
        self.workspace.root.join(&self.workspace.areas_dir)
    }

    pub fn index_path(&self) -> PathBuf {
        self.workspace.root.join(&self.index.path)
    }

    fn validate(&self) -> MemexResult<()> {
        if self.chunking.min_chars == 0 {
            return Err(MemexError::Config(
                "chunking.min_chars must be > 0".to_string(),
            ));
        }
        if self.retrieval.final_limit < 1 {
            return Err(MemexError::Config(
                "retrieval.final_limit must be >= 1".to_string(),
            ));
        }
        if self.retrieval.max_vocab < 1 {
            return Err(MemexError::Config(
                "retrieval.max_vocab must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.max_df) {
            return Err(MemexError::Config(
                "retrieval.max_df must be in [0.0, 1.0]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.anchor_floor) {
            return Err(MemexError::Config(
                "retrieval.anchor_floor must be in [0.0, 1.0]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> MemexResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MemexError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| MemexError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

/// Load the config at `path` if it exists, otherwise fall back to the
/// defaults rooted at the current directory.
pub fn load_or_default(path: &Path) -> MemexResult<Config> {
    if path.exists() {
        load_config(path)
    } else {
        let cwd = std::env::current_dir()?;
        Ok(Config::for_root(&cwd))
    }
}
