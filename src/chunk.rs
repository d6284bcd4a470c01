//! Heading-boundary chunker and stable-id assignment.
//!
//! Narrative records split at `#`/`##`/`###` heading boundaries so each
//! chunk keeps the heading that introduces it and reads sensibly on its
//! own. Narrative chunks below the configured minimum length are dropped
//! as noise. Fact records become one chunk each, kept whole regardless of
//! length.
//!
//! Ids are an 8-hex-char truncation of `SHA-256(source ':' content)`.
//! The same content in the same source reproduces the same id across
//! rebuilds; a truncation collision between different contents extends
//! only the colliding ids, deterministically, until they diverge.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::models::{Chunk, RawRecord, RecordKind};

/// Initial id width in hex characters.
const ID_WIDTH: usize = 8;
/// Widening step applied to colliding ids.
const ID_WIDTH_STEP: usize = 2;

/// Turn raw records into id-assigned chunks.
///
/// Output order follows the input record order but is otherwise not
/// meaningful; consumers sort by timestamp or score as needed.
pub fn chunk_records(records: &[RawRecord], min_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for record in records {
        let source = record.source.to_string_lossy().to_string();
        match &record.kind {
            RecordKind::Narrative { body } | RecordKind::TacitNote { body } => {
                for section in split_sections(body) {
                    if section.chars().count() < min_chars {
                        continue;
                    }
                    chunks.push(Chunk {
                        id: String::new(),
                        category: section_category(&section),
                        content: section,
                        layer: record.layer,
                        source: source.clone(),
                        timestamp: record.timestamp,
                        entity: record.entity.clone(),
                        superseded: false,
                    });
                }
            }
            // Facts are atomic statements; the narrative length floor
            // does not apply to them.
            RecordKind::Fact(fact) => {
                chunks.push(Chunk {
                    // Facts that ship their own id keep it.
                    id: fact.id.clone().unwrap_or_default(),
                    content: fact.fact.clone(),
                    layer: record.layer,
                    source: source.clone(),
                    timestamp: record.timestamp,
                    entity: record.entity.clone(),
                    category: fact.category.clone(),
                    superseded: fact.superseded,
                });
            }
        }
    }

    assign_ids(&mut chunks);
    chunks
}

/// Split markdown at level-1..3 heading boundaries, keeping each heading
/// with the text it introduces. Text before the first heading becomes its
/// own section.
pub fn split_sections(text: &str) -> Vec<String> {
    let mut sections: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if is_section_heading(line) && !current.trim().is_empty() {
            sections.push(current.trim().to_string());
            current = String::new();
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push(current.trim().to_string());
    }

    sections
}

fn is_section_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    (1..=3).contains(&hashes) && line.chars().nth(hashes) == Some(' ')
}

/// Category = first heading within the section, lowercased.
fn section_category(section: &str) -> Option<String> {
    section
        .lines()
        .take(3)
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim().to_lowercase())
        .filter(|c| !c.is_empty())
}

/// Fill in empty ids and resolve truncation collisions.
///
/// Exact duplicates (identical source and content) collapse to a single
/// chunk. Genuinely different contents that collide at the current width
/// each widen their prefix by two chars of their own digest; the loop is
/// deterministic, so identical corpora always reproduce identical ids.
pub fn assign_ids(chunks: &mut Vec<Chunk>) {
    // Drop exact duplicates first, keeping the first occurrence.
    let mut seen_digests: HashMap<String, ()> = HashMap::new();
    let mut digests: Vec<Option<String>> = Vec::new();
    let mut keep: Vec<bool> = Vec::new();
    for chunk in chunks.iter() {
        if chunk.id.is_empty() {
            let digest = content_digest(&chunk.source, &chunk.content);
            let dup = seen_digests.insert(digest.clone(), ()).is_some();
            keep.push(!dup);
            digests.push(Some(digest));
        } else {
            keep.push(true);
            digests.push(None);
        }
    }
    let mut keep_iter = keep.iter();
    chunks.retain(|_| *keep_iter.next().unwrap());
    let mut digests: Vec<Option<String>> = digests
        .into_iter()
        .zip(keep)
        .filter(|(_, k)| *k)
        .map(|(d, _)| d)
        .collect();

    // Assign truncated ids, widening colliding groups until distinct.
    let mut widths: Vec<usize> = vec![ID_WIDTH; chunks.len()];
    loop {
        for (i, chunk) in chunks.iter_mut().enumerate() {
            if let Some(digest) = &digests[i] {
                chunk.id = digest[..widths[i].min(digest.len())].to_string();
            }
        }

        let mut by_id: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, chunk) in chunks.iter().enumerate() {
            by_id.entry(chunk.id.as_str()).or_default().push(i);
        }

        let mut colliding: Vec<usize> = by_id
            .values()
            .filter(|group| group.len() > 1)
            .flat_map(|group| group.iter().copied())
            // Fixed ids (facts with their own) cannot widen.
            .filter(|i| digests[*i].is_some())
            .collect();
        colliding.sort_unstable();

        if colliding.is_empty() {
            break;
        }

        let mut widened = false;
        for i in colliding {
            let digest_len = digests[i].as_ref().map(|d| d.len()).unwrap_or(0);
            if widths[i] < digest_len {
                widths[i] = (widths[i] + ID_WIDTH_STEP).min(digest_len);
                widened = true;
            }
        }
        if !widened {
            // Full digests equal would mean identical content, already
            // deduped above; remaining clashes are fixed-id duplicates
            // in the source data. Keep the first of each.
            let mut seen: HashMap<String, ()> = HashMap::new();
            let mut retained: Vec<bool> = Vec::new();
            for chunk in chunks.iter() {
                retained.push(seen.insert(chunk.id.clone(), ()).is_none());
            }
            let mut it = retained.iter();
            chunks.retain(|_| *it.next().unwrap());
            let mut it = retained.iter();
            digests.retain(|_| *it.next().unwrap());
            break;
        }
    }
}

fn content_digest(source: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b":");
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
