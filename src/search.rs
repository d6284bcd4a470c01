//! Ranked similarity search over an index snapshot.
//!
//! The query is vectorized with the store's fitted model (never
//! retrained) and scored by cosine similarity against every candidate
//! chunk. Filters narrow the candidate set before scoring: a
//! filtered-out chunk never appears regardless of score. Ranking is
//! fully deterministic: score descending, then newer timestamp, then id.

use chrono::{NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::index::cosine;
use crate::models::{Chunk, Layer, SearchHit};
use crate::store::Store;

/// Requested result shape: `Index` is id + preview, `Full` carries the
/// complete chunk content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultForm {
    Index,
    Full,
}

/// One search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub layer: Option<Layer>,
    pub entity: Option<String>,
    /// Only chunks with `timestamp >= since` (midnight UTC).
    pub since: Option<NaiveDate>,
    pub form: ResultForm,
    pub limit: usize,
}

impl SearchRequest {
    pub fn has_filter(&self) -> bool {
        self.layer.is_some() || self.entity.is_some() || self.since.is_some()
    }
}

/// Result of an explicit id lookup: per-id misses are reported, they do
/// not fail sibling lookups.
#[derive(Debug, Serialize)]
pub struct IdLookup {
    pub hits: Vec<SearchHit>,
    pub misses: Vec<String>,
}

/// Read-only search engine over one store snapshot.
pub struct SearchEngine<'a> {
    store: &'a Store,
}

impl<'a> SearchEngine<'a> {
    pub fn new(store: &'a Store) -> SearchEngine<'a> {
        SearchEngine { store }
    }

    /// Ranked search. An empty query with at least one filter returns
    /// everything the filter matches, newest first; an empty query with
    /// no filter matches nothing.
    pub fn search(&self, req: &SearchRequest) -> Vec<SearchHit> {
        let candidates = self.candidates(req);

        let mut scored: Vec<(usize, f64)> = if req.query.trim().is_empty() {
            if !req.has_filter() {
                return Vec::new();
            }
            candidates.into_iter().map(|i| (i, 0.0)).collect()
        } else {
            let query_vec = self.store.model.vectorize(&req.query);
            candidates
                .into_iter()
                .map(|i| (i, cosine(&query_vec, &self.store.vectors[i])))
                .collect()
        };

        if req.query.trim().is_empty() {
            // Filter-only browse: chronological, newest first.
            scored.sort_by(|a, b| {
                let (ca, cb) = (&self.store.chunks[a.0], &self.store.chunks[b.0]);
                cb.timestamp
                    .cmp(&ca.timestamp)
                    .then_with(|| ca.id.cmp(&cb.id))
            });
        } else {
            scored.sort_by(|a, b| {
                let (ca, cb) = (&self.store.chunks[a.0], &self.store.chunks[b.0]);
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| cb.timestamp.cmp(&ca.timestamp))
                    .then_with(|| ca.id.cmp(&cb.id))
            });
        }

        scored.truncate(req.limit);
        scored
            .into_iter()
            .map(|(i, score)| to_hit(&self.store.chunks[i], score, req.form))
            .collect()
    }

    /// Resolve explicit ids, bypassing scoring. Unknown ids land in
    /// `misses`. Superseded facts resolve normally here.
    pub fn lookup_ids(&self, ids: &[String], form: ResultForm) -> IdLookup {
        let mut lookup = IdLookup {
            hits: Vec::new(),
            misses: Vec::new(),
        };
        for id in ids {
            match self.store.get(id) {
                Some(chunk) => lookup.hits.push(to_hit(chunk, 1.0, form)),
                None => lookup.misses.push(id.clone()),
            }
        }
        lookup
    }

    /// Best unfiltered full-form hit for a query, or `None` when nothing
    /// clears the relevance floor. Used for timeline anchor resolution.
    pub fn top_hit(&self, query: &str, floor: f64) -> Option<SearchHit> {
        let req = SearchRequest {
            query: query.to_string(),
            layer: None,
            entity: None,
            since: None,
            form: ResultForm::Full,
            limit: 1,
        };
        self.search(&req).into_iter().next().filter(|h| h.score >= floor)
    }

    /// Pre-filter: layer equality, entity equality, timestamp >= since.
    /// Superseded facts are excluded from ranked search by default.
    fn candidates(&self, req: &SearchRequest) -> Vec<usize> {
        let since_ts = req.since.map(|d| {
            Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap())
        });
        self.store
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| !chunk.superseded)
            .filter(|(_, chunk)| req.layer.is_none_or(|l| chunk.layer == l))
            .filter(|(_, chunk)| {
                req.entity
                    .as_deref()
                    .is_none_or(|e| chunk.entity.as_deref() == Some(e))
            })
            .filter(|(_, chunk)| since_ts.is_none_or(|ts| chunk.timestamp >= ts))
            .map(|(i, _)| i)
            .collect()
    }
}

fn to_hit(chunk: &Chunk, score: f64, form: ResultForm) -> SearchHit {
    SearchHit {
        id: chunk.id.clone(),
        score,
        layer: chunk.layer,
        entity: chunk.entity.clone(),
        source: chunk.source.clone(),
        timestamp: chunk.timestamp,
        preview: chunk.preview(),
        content: match form {
            ResultForm::Full => Some(chunk.content.clone()),
            ResultForm::Index => None,
        },
    }
}
