//! Persisted index store: build, save, load.
//!
//! A [`Store`] is one immutable snapshot of the corpus: the fitted
//! TF-IDF model, every chunk, a vector per chunk, and an id lookup
//! table. Builds are the only mutating operation; search and timeline
//! borrow the store read-only.
//!
//! Persistence is a single versioned JSON artifact. Writes go to a
//! temp file in the artifact's directory followed by a rename, so an
//! interrupted build leaves the previous artifact untouched and a
//! concurrent reader only ever sees a complete snapshot. A reader
//! rejects any version it does not recognize instead of guessing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunk::chunk_records;
use crate::config::Config;
use crate::error::{MemexError, MemexResult};
use crate::index::{SparseVector, TfidfModel};
use crate::models::{Chunk, Layer};
use crate::walker::{walk_workspace, SkipReport};

pub const FORMAT_VERSION: u32 = 1;

/// One immutable index snapshot.
#[derive(Debug, Serialize, Deserialize)]
pub struct Store {
    pub version: u32,
    /// Build start time (epoch seconds). Incremental builds reprocess
    /// sources modified at or after this.
    pub built_at: i64,
    pub model: TfidfModel,
    /// Sorted by (source, id) so identical corpora persist identically.
    pub chunks: Vec<Chunk>,
    /// Parallel to `chunks`.
    pub vectors: Vec<SparseVector>,
    #[serde(skip)]
    id_index: HashMap<String, usize>,
}

/// What a build did, for the caller to render or log.
#[derive(Debug, Serialize)]
pub struct BuildReport {
    /// `full`, `incremental`, or `incremental-fallback-full`.
    pub mode: String,
    pub records: usize,
    pub chunks: usize,
    pub vocabulary: usize,
    pub skipped: Vec<SkipReport>,
}

impl Store {
    /// Full rebuild: walk every source, re-chunk, re-assign ids, refit
    /// the model over the entire corpus.
    pub fn build_full(config: &Config) -> MemexResult<(Store, BuildReport)> {
        let built_at = Utc::now().timestamp();
        let outcome = walk_workspace(config)?;
        let records = outcome.records.len();

        let chunks = chunk_records(&outcome.records, config.chunking.min_chars);
        let documents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let model = TfidfModel::fit(
            &documents,
            config.retrieval.max_vocab,
            config.retrieval.max_df,
            config.retrieval.bigrams,
        );
        let vectors: Vec<SparseVector> =
            chunks.iter().map(|c| model.vectorize(&c.content)).collect();

        let store = Store::assemble(built_at, model, chunks, vectors);
        info!(
            chunks = store.chunks.len(),
            vocabulary = store.model.len(),
            "full build complete"
        );
        let report = BuildReport {
            mode: "full".to_string(),
            records,
            chunks: store.chunks.len(),
            vocabulary: store.model.len(),
            skipped: outcome.skipped,
        };
        Ok((store, report))
    }

    /// Incremental rebuild: reprocess only sources modified after the
    /// previous build, carry unchanged chunks and vectors over, and keep
    /// the previous model's vocabulary. Falls back to a full build when
    /// the previous model cannot represent the fresh content.
    pub fn build_incremental(
        config: &Config,
        previous: &Store,
    ) -> MemexResult<(Store, BuildReport)> {
        if previous.model.is_empty() {
            return Self::fallback_full(config, "previous model has no vocabulary");
        }

        let built_at = Utc::now().timestamp();
        let outcome = walk_workspace(config)?;
        let records = outcome.records.len();

        let mut current_sources: HashSet<String> = HashSet::new();
        let mut changed_records = Vec::new();
        for record in &outcome.records {
            let source = record.source.to_string_lossy().to_string();
            let changed = record.mtime.timestamp() >= previous.built_at;
            current_sources.insert(source);
            if changed {
                changed_records.push(record.clone());
            }
        }
        let changed_sources: HashSet<String> = changed_records
            .iter()
            .map(|r| r.source.to_string_lossy().to_string())
            .collect();

        let fresh = chunk_records(&changed_records, config.chunking.min_chars);
        let fresh_vectors: Vec<SparseVector> = fresh
            .iter()
            .map(|c| previous.model.vectorize(&c.content))
            .collect();

        // If most chunks from never-before-seen sources fall outside the
        // old vocabulary, the carried idf statistics no longer describe
        // the corpus. Unchanged sources swept in by a coarse mtime always
        // vectorize cleanly and must not dilute the ratio.
        let prev_sources: HashSet<&str> =
            previous.chunks.iter().map(|c| c.source.as_str()).collect();
        let novel = |source: &str| !prev_sources.contains(source);
        let novel_total = fresh.iter().filter(|c| novel(&c.source)).count();
        let zero = fresh
            .iter()
            .zip(&fresh_vectors)
            .filter(|(c, v)| novel(&c.source) && v.is_zero())
            .count();
        if novel_total > 0 && zero * 2 > novel_total {
            return Self::fallback_full(config, "previous vocabulary does not cover new content");
        }

        // A changed file replaces its old chunk set wholesale; a removed
        // file drops out entirely.
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut vectors: Vec<SparseVector> = Vec::new();
        let mut carried = 0usize;
        for (chunk, vector) in previous.chunks.iter().zip(&previous.vectors) {
            if current_sources.contains(&chunk.source) && !changed_sources.contains(&chunk.source)
            {
                chunks.push(chunk.clone());
                vectors.push(vector.clone());
                carried += 1;
            }
        }
        chunks.extend(fresh);
        vectors.extend(fresh_vectors);

        let mut ids: HashSet<&str> = HashSet::new();
        if chunks.iter().any(|c| !ids.insert(c.id.as_str())) {
            return Self::fallback_full(config, "id clash between carried and fresh chunks");
        }

        let store = Store::assemble(built_at, previous.model.clone(), chunks, vectors);
        debug!(carried, total = store.chunks.len(), "incremental build complete");
        let report = BuildReport {
            mode: "incremental".to_string(),
            records,
            chunks: store.chunks.len(),
            vocabulary: store.model.len(),
            skipped: outcome.skipped,
        };
        Ok((store, report))
    }

    fn fallback_full(config: &Config, reason: &str) -> MemexResult<(Store, BuildReport)> {
        info!(reason, "incremental build falling back to full");
        let (store, mut report) = Self::build_full(config)?;
        report.mode = "incremental-fallback-full".to_string();
        Ok((store, report))
    }

    fn assemble(
        built_at: i64,
        model: TfidfModel,
        chunks: Vec<Chunk>,
        vectors: Vec<SparseVector>,
    ) -> Store {
        let mut paired: Vec<(Chunk, SparseVector)> = chunks.into_iter().zip(vectors).collect();
        paired.sort_by(|a, b| {
            a.0.source
                .cmp(&b.0.source)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        let (sorted_chunks, sorted_vectors): (Vec<Chunk>, Vec<SparseVector>) =
            paired.into_iter().unzip();

        let mut store = Store {
            version: FORMAT_VERSION,
            built_at,
            model,
            chunks: sorted_chunks,
            vectors: sorted_vectors,
            id_index: HashMap::new(),
        };
        store.rebuild_id_index();
        store
    }

    fn rebuild_id_index(&mut self) {
        self.id_index = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
    }

    /// Atomically persist the store: write a sibling temp file, then
    /// rename over the target.
    pub fn save(&self, path: &Path) -> MemexResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let serialized = serde_json::to_string(self)?;
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "index persisted");
        Ok(())
    }

    /// Load a persisted store, rejecting unknown format versions.
    pub fn load(path: &Path) -> MemexResult<Store> {
        if !path.exists() {
            return Err(MemexError::IndexMissing {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;

        #[derive(Deserialize)]
        struct Header {
            version: u32,
        }
        let header: Header = serde_json::from_str(&content)?;
        if header.version != FORMAT_VERSION {
            return Err(MemexError::IncompatibleIndexVersion {
                path: path.to_path_buf(),
                found: header.version,
                supported: FORMAT_VERSION,
            });
        }

        let mut store: Store = serde_json::from_str(&content)?;
        store.rebuild_id_index();
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Index of the chunk with the given id, if present.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.id_index.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.position(id).map(|i| &self.chunks[i])
    }

    /// Chunk counts per layer, for stats reporting.
    pub fn layer_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for layer in Layer::ALL {
            counts.insert(layer.as_str(), 0);
        }
        for chunk in &self.chunks {
            *counts.entry(chunk.layer.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace_with_sources() -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        fs::create_dir_all(root.join("memory")).unwrap();
        fs::create_dir_all(root.join("areas/people/alice")).unwrap();
        fs::write(
            root.join("memory/2026-01-29.md"),
            "## Search engine\n\nImplemented cosine ranking over the fitted vocabulary today.",
        )
        .unwrap();
        fs::write(
            root.join("memory/2026-01-30.md"),
            "## Timeline\n\nAnchored reconstruction around a chunk works across layers now.",
        )
        .unwrap();
        fs::write(
            root.join("areas/people/alice/facts.json"),
            r#"[{"id": "fa1", "fact": "Alice reviewed the ranking tiebreak design", "timestamp": "2026-01-28"}]"#,
        )
        .unwrap();
        (tmp, Config::for_root(&root))
    }

    #[test]
    fn test_build_full_indexes_all_layers() {
        let (_tmp, config) = workspace_with_sources();
        let (store, report) = Store::build_full(&config).unwrap();
        assert_eq!(report.mode, "full");
        assert_eq!(store.len(), 3);
        assert!(store.model.len() > 0);
        assert!(report.skipped.is_empty());
        let counts = store.layer_counts();
        assert_eq!(counts["daily"], 2);
        assert_eq!(counts["knowledge_graph"], 1);
    }

    #[test]
    fn test_rebuild_reproduces_ids_and_content() {
        let (_tmp, config) = workspace_with_sources();
        let (a, _) = Store::build_full(&config).unwrap();
        let (b, _) = Store::build_full(&config).unwrap();
        let ids_a: Vec<&str> = a.chunks.iter().map(|c| c.id.as_str()).collect();
        let ids_b: Vec<&str> = b.chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(a.chunks, b.chunks);
        assert_eq!(a.model.vocab, b.model.vocab);
        assert_eq!(a.vectors, b.vectors);
    }

    #[test]
    fn test_save_load_round_trip() {
        let (_tmp, config) = workspace_with_sources();
        let (store, _) = Store::build_full(&config).unwrap();
        store.save(&config.index_path()).unwrap();

        let loaded = Store::load(&config.index_path()).unwrap();
        assert_eq!(loaded.chunks, store.chunks);
        assert_eq!(loaded.vectors, store.vectors);
        assert!(loaded.get(&store.chunks[0].id).is_some());
    }

    #[test]
    fn test_load_missing_is_index_missing() {
        let tmp = TempDir::new().unwrap();
        let err = Store::load(&tmp.path().join("index.json")).unwrap_err();
        assert!(matches!(err, MemexError::IndexMissing { .. }));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        fs::write(&path, r#"{"version": 99, "built_at": 0}"#).unwrap();
        let err = Store::load(&path).unwrap_err();
        match err {
            MemexError::IncompatibleIndexVersion { found, supported, .. } => {
                assert_eq!(found, 99);
                assert_eq!(supported, FORMAT_VERSION);
            }
            other => panic!("expected version error, got {other}"),
        }
    }

    #[test]
    fn test_incremental_carries_unchanged_chunks() {
        let (_tmp, config) = workspace_with_sources();
        let (mut prev, _) = Store::build_full(&config).unwrap();
        // Pretend the previous build happened before the files existed,
        // then add one file: everything is "changed" relative to 0 would
        // refit, so anchor built_at in the future instead to mark all
        // sources unchanged.
        prev.built_at = Utc::now().timestamp() + 3600;

        let (next, report) = Store::build_incremental(&config, &prev).unwrap();
        assert_eq!(report.mode, "incremental");
        assert_eq!(next.len(), prev.len());
        assert_eq!(next.chunks, prev.chunks);
    }

    #[test]
    fn test_incremental_picks_up_new_file() {
        let (_tmp, config) = workspace_with_sources();
        let (mut prev, _) = Store::build_full(&config).unwrap();
        prev.built_at -= 3600; // make every current mtime look fresh

        fs::write(
            config.workspace.root.join("memory/2026-01-31.md"),
            "## Vocabulary\n\nRanking cosine search over the timeline engine chunks again today.",
        )
        .unwrap();

        let (next, report) = Store::build_incremental(&config, &prev).unwrap();
        // The shifted built_at sweeps the unchanged files into the fresh
        // set; that alone must not force a full rebuild.
        assert_eq!(report.mode, "incremental");
        assert_eq!(next.len(), 4);
    }

    #[test]
    fn test_incremental_falls_back_on_foreign_content() {
        let (_tmp, config) = workspace_with_sources();
        let (mut prev, _) = Store::build_full(&config).unwrap();
        prev.built_at -= 3600;

        // Content sharing no vocabulary with the previous corpus.
        fs::write(
            config.workspace.root.join("memory/2026-02-01.md"),
            "## Zzz\n\nQqfh wxyzzy plugh vorpal snark boojum frabjous galumphing borogoves mimsy.",
        )
        .unwrap();
        fs::write(
            config.workspace.root.join("memory/2026-02-02.md"),
            "## Qqq\n\nJabberwock tumtum uffish whiffling manxome frumious bandersnatch tulgey.",
        )
        .unwrap();

        let (next, report) = Store::build_incremental(&config, &prev).unwrap();
        assert_eq!(report.mode, "incremental-fallback-full");
        assert!(next.model.vocab.contains_key("jabberwock"));
    }

    #[test]
    fn test_atomic_save_leaves_no_temp_file() {
        let (_tmp, config) = workspace_with_sources();
        let (store, _) = Store::build_full(&config).unwrap();
        store.save(&config.index_path()).unwrap();
        let dir = config.index_path().parent().unwrap().to_path_buf();
        let leftovers: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
