use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn mx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("mx");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    // Daily logs
    let daily = root.join("memory");
    fs::create_dir_all(&daily).unwrap();
    fs::write(
        daily.join("2026-01-28.md"),
        "## Standup\n\nDiscussed the retry budget with Alice; we settled on three attempts with backoff.\n\n## Afternoon\n\nWired the deployment pipeline to the new staging cluster.",
    ).unwrap();
    fs::write(
        daily.join("2026-01-29.md"),
        "## Standup\n\nBob flagged a regression in the invoice exporter, fix is in review.",
    ).unwrap();
    fs::write(
        daily.join("2026-01-30.md"),
        "## Notes\n\nFinished the retry budget rollout across every service in staging.",
    ).unwrap();

    // Entity areas
    let alice = root.join("areas/people/alice");
    fs::create_dir_all(&alice).unwrap();
    fs::write(
        alice.join("summary.md"),
        "# Alice\n\nAlice leads the platform team and owns the retry and backoff policies.",
    )
    .unwrap();
    fs::write(
        alice.join("facts.json"),
        r#"[
            {"id": "fa1", "fact": "Alice prefers asynchronous design reviews over meetings", "timestamp": "2026-01-27"},
            {"id": "fa2", "fact": "Alice owns the retry budget policy for the platform team", "timestamp": "2026-01-28"}
        ]"#,
    )
    .unwrap();

    // Tacit notes
    fs::write(
        root.join("MEMORY.md"),
        "Always check the staging cluster health dashboard before a rollout begins.",
    )
    .unwrap();

    let config_content = format!(
        r#"[workspace]
root = "{}"

[chunking]
min_chars = 40
"#,
        root.display()
    );
    let config_path = root.join("memex.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_mx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = mx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run mx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_build_then_search() {
    let (_tmp, config) = setup_test_env();

    let (stdout, stderr, ok) = run_mx(&config, &["build"]);
    assert!(ok, "build failed: {stderr}");
    assert!(stdout.contains("chunks indexed"), "unexpected: {stdout}");

    let (stdout, stderr, ok) = run_mx(&config, &["search", "retry budget"]);
    assert!(ok, "search failed: {stderr}");
    assert!(stdout.contains("retry"), "no relevant hit in: {stdout}");
    assert!(stdout.contains("preview:"));
}

#[test]
fn test_search_layer_filter() {
    let (_tmp, config) = setup_test_env();
    run_mx(&config, &["build"]);

    let (stdout, _, ok) = run_mx(
        &config,
        &["search", "Alice", "--layer", "knowledge_graph", "--json"],
    );
    assert!(ok);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert!(!hits.is_empty());
    for hit in hits {
        assert_eq!(hit["layer"], "knowledge_graph");
    }
}

#[test]
fn test_search_ids_round_trip_with_miss() {
    let (_tmp, config) = setup_test_env();
    run_mx(&config, &["build"]);

    let (stdout, _, ok) = run_mx(&config, &["search", "retry budget", "--json"]);
    assert!(ok);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let first_id = hits[0]["id"].as_str().unwrap().to_string();

    let ids = format!("{first_id},zzzzzz");
    let (stdout, _, ok) = run_mx(
        &config,
        &["search", "--ids", &ids, "--format", "full", "--json"],
    );
    assert!(ok);
    let lookup: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(lookup["hits"][0]["id"], first_id.as_str());
    assert!(lookup["hits"][0]["content"].is_string());
    assert_eq!(lookup["misses"][0], "zzzzzz");

    // The default index form stays preview-only, for ids too.
    let (stdout, _, ok) = run_mx(&config, &["search", "--ids", &ids, "--json"]);
    assert!(ok);
    let lookup: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(lookup["hits"][0]["content"].is_null());
    assert!(lookup["hits"][0]["preview"].is_string());
}

#[test]
fn test_search_without_index_reports_missing() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_mx(&config, &["search", "anything"]);
    assert!(!ok);
    assert!(stderr.contains("no index"), "unexpected: {stderr}");
}

#[test]
fn test_search_requires_query_filter_or_ids() {
    let (_tmp, config) = setup_test_env();
    run_mx(&config, &["build"]);
    let (_, stderr, ok) = run_mx(&config, &["search"]);
    assert!(!ok);
    assert!(stderr.contains("required"), "unexpected: {stderr}");
}

#[test]
fn test_timeline_by_date() {
    let (_tmp, config) = setup_test_env();
    run_mx(&config, &["build"]);

    let (stdout, stderr, ok) = run_mx(
        &config,
        &[
            "timeline",
            "--date",
            "2026-01-30",
            "--before",
            "24",
            "--after",
            "0",
        ],
    );
    assert!(ok, "timeline failed: {stderr}");
    assert!(stdout.contains("2026-01-29"));
    assert!(stdout.contains("2026-01-30"));
    assert!(!stdout.contains("2026-01-28"));
    // The chunk on the anchor date carries the anchor marker.
    assert!(stdout.contains("    * "), "no anchor marker in: {stdout}");

    let (stdout, _, ok) = run_mx(
        &config,
        &[
            "timeline",
            "--date",
            "2026-01-30",
            "--before",
            "24",
            "--after",
            "0",
            "--json",
        ],
    );
    assert!(ok);
    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let anchors: Vec<_> = result["entries"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["anchor"] == true)
        .collect();
    assert_eq!(anchors.len(), 1);
}

#[test]
fn test_timeline_by_query_flags_anchor() {
    let (_tmp, config) = setup_test_env();
    run_mx(&config, &["build"]);

    let (stdout, _, ok) = run_mx(
        &config,
        &["timeline", "--query", "invoice exporter regression", "--json"],
    );
    assert!(ok);
    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let anchors: Vec<_> = result["entries"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["anchor"] == true)
        .collect();
    assert_eq!(anchors.len(), 1);
}

#[test]
fn test_timeline_unknown_id_fails() {
    let (_tmp, config) = setup_test_env();
    run_mx(&config, &["build"]);
    let (_, stderr, ok) = run_mx(&config, &["timeline", "--id", "zzzzzz"]);
    assert!(!ok);
    assert!(stderr.contains("zzzzzz"), "unexpected: {stderr}");
}

#[test]
fn test_rebuild_is_idempotent() {
    let (_tmp, config) = setup_test_env();
    run_mx(&config, &["build", "--full"]);
    let (first, _, _) = run_mx(&config, &["search", "retry budget", "--json"]);

    run_mx(&config, &["build", "--full"]);
    let (second, _, _) = run_mx(&config, &["search", "retry budget", "--json"]);

    assert_eq!(first, second);
}

#[test]
fn test_incremental_build_after_new_file() {
    let (tmp, config) = setup_test_env();
    let (stdout, _, ok) = run_mx(&config, &["build"]);
    assert!(ok);
    assert!(stdout.contains("build full"));

    fs::write(
        tmp.path().join("memory/2026-01-31.md"),
        "## Notes\n\nAlice signed off on the retry budget; rollout is complete everywhere.",
    )
    .unwrap();

    let (stdout, stderr, ok) = run_mx(&config, &["build"]);
    assert!(ok, "rebuild failed: {stderr}");
    assert!(
        stdout.contains("build incremental"),
        "unexpected: {stdout}"
    );

    let (stdout, _, ok) = run_mx(&config, &["search", "signed off rollout"]);
    assert!(ok);
    assert!(stdout.contains("2026-01-31"), "unexpected: {stdout}");
}

#[test]
fn test_stats_reports_layers() {
    let (_tmp, config) = setup_test_env();
    run_mx(&config, &["build"]);

    let (stdout, _, ok) = run_mx(&config, &["stats"]);
    assert!(ok);
    assert!(stdout.contains("daily"));
    assert!(stdout.contains("knowledge_graph"));
    assert!(stdout.contains("tacit"));
    assert!(stdout.contains("vocabulary"));
}

#[test]
fn test_sources_shows_layer_status() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, ok) = run_mx(&config, &["sources"]);
    assert!(ok);
    assert!(stdout.contains("LAYER"));
    assert!(stdout.contains("OK"));
    assert!(stdout.contains("records:"));
}
