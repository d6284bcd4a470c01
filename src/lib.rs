//! # memex
//!
//! A local-first indexing and retrieval engine for layered personal
//! memory. memex walks a workspace of markdown logs, entity fact files,
//! and tacit notes, chunks them into retrievable units with stable ids,
//! fits a TF-IDF model over the corpus, and persists everything as one
//! versioned index artifact. Searches and timeline reconstructions run
//! against the artifact without touching the source files again.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────┐   ┌────────┐   ┌────────────┐
//! │  walker   │──▶│  chunk  │──▶│ index  │──▶│   store    │
//! │ (sources) │   │ (+ ids) │   │ (tfidf)│   │ (artifact) │
//! └───────────┘   └─────────┘   └────────┘   └─────┬──────┘
//!                                                  │
//!                                   ┌──────────────┴───────────────┐
//!                                   ▼                              ▼
//!                             ┌──────────┐                  ┌──────────┐
//!                             │  search  │                  │ timeline │
//!                             └──────────┘                  └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with validated defaults |
//! | [`error`] | Error taxonomy shared across the crate |
//! | [`models`] | Layers, records, chunks, and search hits |
//! | [`walker`] | Source discovery across the three memory layers |
//! | [`chunk`] | Section splitting and stable id assignment |
//! | [`index`] | TF-IDF model, sparse vectors, cosine similarity |
//! | [`store`] | Build (full and incremental), save, load |
//! | [`search`] | Ranked retrieval, filters, id lookup |
//! | [`timeline`] | Chronological reconstruction around an anchor |
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use memex::config::Config;
//! use memex::search::{ResultForm, SearchEngine, SearchRequest};
//! use memex::store::Store;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::for_root(Path::new("./workspace"));
//! let (store, report) = Store::build_full(&config)?;
//! store.save(&config.index_path())?;
//! println!("indexed {} chunks", report.chunks);
//!
//! let engine = SearchEngine::new(&store);
//! let hits = engine.search(&SearchRequest {
//!     query: "retry budget decision".to_string(),
//!     layer: None,
//!     entity: None,
//!     since: None,
//!     form: ResultForm::Index,
//!     limit: 10,
//! });
//! for hit in hits {
//!     println!("[{:.3}] {} {}", hit.score, hit.id, hit.preview);
//! }
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod search;
pub mod store;
pub mod timeline;
pub mod walker;
