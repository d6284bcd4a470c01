//! # memex CLI (`mx`)
//!
//! The `mx` binary is the primary interface to the memex engine. It
//! provides commands for building the index over a layered memory
//! workspace, ranked search with progressive disclosure, and
//! chronological timeline reconstruction.
//!
//! ## Usage
//!
//! ```bash
//! mx --config ./memex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mx build` | Build or incrementally refresh the index |
//! | `mx search "<query>"` | Ranked search over indexed chunks |
//! | `mx search --ids a,b` | Resolve explicit chunk ids |
//! | `mx timeline` | Chronological context around an anchor |
//! | `mx sources` | Show layer locations and their status |
//! | `mx stats` | Index statistics |
//!
//! ## Examples
//!
//! ```bash
//! # Build the index
//! mx build
//!
//! # Cheap first pass: ids and previews only
//! mx search "what did we decide about retries" --format index
//!
//! # Then pull full content for the interesting ids
//! mx search --ids ab12cd34,ef56aa01 --format full
//!
//! # What else happened around that discussion?
//! mx timeline --query "retry budget" --before 48 --after 24
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use memex::config::{self, Config};
use memex::error::MemexError;
use memex::models::Layer;
use memex::search::{ResultForm, SearchEngine, SearchRequest};
use memex::store::Store;
use memex::timeline::{timeline, Anchor};
use memex::walker;

/// memex — a local-first indexing and retrieval engine for layered
/// personal memory.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; without one, the current directory is treated as the workspace
/// root with default layer locations.
#[derive(Parser)]
#[command(
    name = "mx",
    about = "memex — index, search, and timeline engine for layered personal memory",
    version,
    long_about = "memex turns a three-layer personal knowledge store (entity facts, daily \
    logs, tacit notes) into a persisted TF-IDF index, and answers ranked searches and \
    time-windowed timeline reconstructions against it without re-scanning the corpus."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./memex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index over all memory layers.
    ///
    /// By default refreshes incrementally: only sources modified since
    /// the previous build are reprocessed. The persisted artifact is
    /// replaced atomically; an interrupted build never corrupts the
    /// previous index.
    Build {
        /// Ignore the previous index and rebuild everything from scratch.
        #[arg(long)]
        full: bool,
    },

    /// Search indexed chunks.
    ///
    /// Scores the query against every chunk vector with cosine
    /// similarity and returns ranked results. Filters narrow the
    /// candidate set before ranking. With `--ids`, scoring is bypassed
    /// and the listed ids are resolved directly.
    Search {
        /// The search query. May be omitted when a filter or --ids is given.
        query: Option<String>,

        /// Only return chunks from this layer
        /// (knowledge_graph, daily, or tacit).
        #[arg(long)]
        layer: Option<Layer>,

        /// Only return chunks associated with this entity.
        #[arg(long)]
        entity: Option<String>,

        /// Only return chunks dated on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Resolve these chunk ids directly (comma-separated), skipping
        /// ranking. Unknown ids are reported individually as misses.
        #[arg(long, value_delimiter = ',')]
        ids: Option<Vec<String>>,

        /// Result form: `index` (id + preview) or `full` (complete content).
        #[arg(long, default_value = "index")]
        format: String,

        /// Maximum number of ranked results.
        #[arg(long)]
        limit: Option<usize>,

        /// Emit structured JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },

    /// Reconstruct the chronological context around an anchor.
    ///
    /// The anchor is a chunk id, a date, or a search query (resolved to
    /// its top hit). All layers are merged into one ascending timeline;
    /// the anchor entry is flagged.
    Timeline {
        /// Anchor on the top search hit for this query.
        #[arg(long, group = "anchor")]
        query: Option<String>,

        /// Anchor on this chunk id.
        #[arg(long, group = "anchor")]
        id: Option<String>,

        /// Anchor on midnight (UTC) of this date (YYYY-MM-DD).
        #[arg(long, group = "anchor")]
        date: Option<String>,

        /// Hours before the anchor to include.
        #[arg(long, default_value_t = 24)]
        before: i64,

        /// Hours after the anchor to include.
        #[arg(long, default_value_t = 24)]
        after: i64,

        /// Emit structured JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },

    /// Show the configured layer locations and whether they exist.
    Sources,

    /// Show index statistics: chunk counts per layer and vocabulary size.
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log to stderr so stdout stays clean for --json output.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Build { full } => run_build(&cfg, full),
        Commands::Search {
            query,
            layer,
            entity,
            since,
            ids,
            format,
            limit,
            json,
        } => run_search(&cfg, query, layer, entity, since, ids, &format, limit, json),
        Commands::Timeline {
            query,
            id,
            date,
            before,
            after,
            json,
        } => run_timeline(&cfg, query, id, date, before, after, json),
        Commands::Sources => run_sources(&cfg),
        Commands::Stats => run_stats(&cfg),
    }
}

fn run_build(cfg: &Config, full: bool) -> Result<()> {
    let index_path = cfg.index_path();

    let (store, report) = if full {
        Store::build_full(cfg)?
    } else {
        match Store::load(&index_path) {
            Ok(previous) => Store::build_incremental(cfg, &previous)?,
            // No usable previous index: build from scratch.
            Err(MemexError::IndexMissing { .. })
            | Err(MemexError::IncompatibleIndexVersion { .. }) => Store::build_full(cfg)?,
            Err(e) => return Err(e.into()),
        }
    };

    store
        .save(&index_path)
        .with_context(|| format!("failed to persist index to {}", index_path.display()))?;

    println!("build {}", report.mode);
    println!("  records walked: {}", report.records);
    println!("  chunks indexed: {}", report.chunks);
    println!("  vocabulary size: {}", report.vocabulary);
    if !report.skipped.is_empty() {
        println!("  skipped files: {}", report.skipped.len());
        for skip in &report.skipped {
            println!("    {}: {}", skip.path.display(), skip.reason);
        }
    }
    println!("ok");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_search(
    cfg: &Config,
    query: Option<String>,
    layer: Option<Layer>,
    entity: Option<String>,
    since: Option<String>,
    ids: Option<Vec<String>>,
    format: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let form = parse_form(format)?;
    let store = Store::load(&cfg.index_path())?;
    let engine = SearchEngine::new(&store);

    // Explicit id lookup bypasses ranking entirely.
    if let Some(ids) = ids {
        let lookup = engine.lookup_ids(&ids, form);
        if json {
            println!("{}", serde_json::to_string_pretty(&lookup)?);
            return Ok(());
        }
        for (i, hit) in lookup.hits.iter().enumerate() {
            println!("{}. {} / {} / {}", i + 1, hit.id, hit.layer, hit.source);
            match &hit.content {
                Some(content) => {
                    println!("{}", content);
                    println!();
                }
                None => println!("    preview: \"{}\"", hit.preview),
            }
        }
        for miss in &lookup.misses {
            println!("miss: {} (no such id in the index)", miss);
        }
        return Ok(());
    }

    let since = since.map(|s| parse_date(&s)).transpose()?;
    let req = SearchRequest {
        query: query.unwrap_or_default(),
        layer,
        entity,
        since,
        form,
        limit: limit.unwrap_or(cfg.retrieval.final_limit),
    };
    if req.query.trim().is_empty() && !req.has_filter() {
        bail!("a query, a filter, or --ids is required");
    }

    let hits = engine.search(&req);
    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} / {}",
            i + 1,
            hit.score,
            hit.layer,
            hit.source
        );
        if let Some(entity) = &hit.entity {
            println!("    entity: {}", entity);
        }
        println!("    date: {}", hit.timestamp.format("%Y-%m-%d"));
        println!("    id: {}", hit.id);
        match &hit.content {
            Some(content) => {
                println!("{}", content);
                println!();
            }
            None => println!("    preview: \"{}\"", hit.preview),
        }
    }
    Ok(())
}

fn run_timeline(
    cfg: &Config,
    query: Option<String>,
    id: Option<String>,
    date: Option<String>,
    before: i64,
    after: i64,
    json: bool,
) -> Result<()> {
    let anchor = match (query, id, date) {
        (Some(q), None, None) => Anchor::Query(q),
        (None, Some(id), None) => Anchor::Id(id),
        (None, None, Some(d)) => Anchor::Date(parse_date(&d)?),
        _ => bail!("provide exactly one of --query, --id, or --date"),
    };

    let store = Store::load(&cfg.index_path())?;
    let result = timeline(&store, &anchor, before, after, cfg.retrieval.anchor_floor)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "timeline {} -> {} ({}h before, {}h after)",
        result.window.start.format("%Y-%m-%d %H:%M"),
        result.window.end.format("%Y-%m-%d %H:%M"),
        result.window.before_hours,
        result.window.after_hours
    );
    if result.entries.is_empty() {
        println!("  (no chunks in this window)");
        return Ok(());
    }
    let mut current_date = String::new();
    for entry in &result.entries {
        let entry_date = entry.timestamp.format("%Y-%m-%d").to_string();
        if entry_date != current_date {
            println!("  {}", entry_date);
            current_date = entry_date;
        }
        let marker = if entry.anchor { "*" } else { "-" };
        let entity = entry
            .entity
            .as_deref()
            .map(|e| format!(" [{}]", e))
            .unwrap_or_default();
        println!(
            "    {} {} {}{} {}",
            marker, entry.id, entry.layer, entity, entry.preview
        );
    }
    Ok(())
}

fn run_sources(cfg: &Config) -> Result<()> {
    let rows = [
        ("daily", cfg.daily_path()),
        ("knowledge_graph", cfg.areas_path()),
    ];
    println!("{:<16} {:<12} LOCATION", "LAYER", "STATUS");
    for (layer, path) in rows {
        let status = if path.exists() { "OK" } else { "MISSING" };
        println!("{:<16} {:<12} {}", layer, status, path.display());
    }
    println!(
        "{:<16} {:<12} {}",
        "tacit",
        "GLOBS",
        cfg.workspace.tacit_globs.join(", ")
    );

    let outcome = walker::walk_workspace(cfg)?;
    println!();
    println!("records: {}", outcome.records.len());
    if !outcome.skipped.is_empty() {
        println!("unreadable: {}", outcome.skipped.len());
    }
    Ok(())
}

fn run_stats(cfg: &Config) -> Result<()> {
    let store = Store::load(&cfg.index_path())?;
    let built = chrono::DateTime::from_timestamp(store.built_at, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| store.built_at.to_string());
    println!("index: {}", cfg.index_path().display());
    println!("built at: {}", built);
    println!("chunks: {}", store.len());
    for (layer, count) in store.layer_counts() {
        println!("  {:<16} {}", layer, count);
    }
    println!("vocabulary: {} terms", store.model.len());
    Ok(())
}

fn parse_form(s: &str) -> Result<ResultForm> {
    match s {
        "index" => Ok(ResultForm::Index),
        "full" => Ok(ResultForm::Full),
        other => bail!("unknown format '{}': use index or full", other),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| MemexError::InvalidDate(s.to_string()).into())
}
