//! End-to-end tests for the linkgraph CLI.
//!
//! Tests invoke the `linkgraph` binary as a subprocess and verify JSON output.

use std::process::{Command, Output};

use tempfile::TempDir;

fn linkgraph() -> Command {
    Command::new(env!("CARGO_BIN_EXE_linkgraph"))
}

fn run_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn run_failing(cmd: &mut Command) -> Output {
    let output = cmd.output().unwrap();
    assert!(!output.status.success(), "command unexpectedly succeeded");
    output
}

#[test]
fn e2e_partitions_tile_the_id_space() {
    let out = run_json(linkgraph().args(["partitions", "--count", "4"]));
    assert_eq!(out["partitions"], 4);

    let extents = out["extents"].as_array().unwrap();
    assert_eq!(extents.len(), 4);
    assert_eq!(extents[0]["from"], "00000000-0000-0000-0000-000000000000");
    assert_eq!(extents[1]["from"], "3fffffff-ffff-ffff-ffff-ffffffffffff");
    assert_eq!(extents[3]["to"], "ffffffff-ffff-ffff-ffff-ffffffffffff");
    for pair in extents.windows(2) {
        assert_eq!(pair[0]["to"], pair[1]["from"], "extents must share boundaries");
    }
}

#[test]
fn e2e_partitions_of_custom_range() {
    let out = run_json(linkgraph().args([
        "partitions",
        "--count",
        "2",
        "--from",
        "00000000-0000-0000-0000-000000000000",
        "--to",
        "00000000-0000-0000-0000-000000000010",
    ]));
    let extents = out["extents"].as_array().unwrap();
    assert_eq!(extents[0]["to"], "00000000-0000-0000-0000-000000000008");
    assert_eq!(extents[1]["to"], "00000000-0000-0000-0000-000000000010");
}

#[test]
fn e2e_partitions_rejects_zero_count() {
    let output = run_failing(linkgraph().args(["partitions", "--count", "0"]));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid partition"), "stderr: {stderr}");
}

#[test]
fn e2e_partitions_rejects_malformed_bound() {
    run_failing(linkgraph().args(["partitions", "--count", "2", "--from", "not-a-uuid"]));
}

#[test]
fn e2e_bench_memory_backend() {
    let out = run_json(linkgraph().args([
        "bench",
        "--links",
        "50",
        "--fanout",
        "3",
        "--workers",
        "2",
    ]));
    assert_eq!(out["backend"], "memory");
    assert_eq!(out["links_scanned"], 50);
    assert_eq!(out["edges_scanned"], 150);
    assert_eq!(out["edges_after_sweep"], 75);
    assert_eq!(out["upsert_links"]["ops"], 50);
    assert!(out["upsert_edges"]["p99_us"].is_number());
}

#[test]
fn e2e_bench_sqlite_backend_from_config() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("graph.db");
    let config = dir.path().join("linkgraph.toml");
    std::fs::write(
        &config,
        format!(
            "backend = \"sqlite\"\npath = {:?}\nbusy_timeout_ms = 2000\n",
            db.display().to_string()
        ),
    )
    .unwrap();

    let out = run_json(linkgraph().arg("--config").arg(&config).args([
        "bench",
        "--links",
        "30",
        "--fanout",
        "2",
        "--workers",
        "3",
    ]));
    assert_eq!(out["backend"], "sqlite");
    assert_eq!(out["links_scanned"], 30);
    assert_eq!(out["edges_scanned"], 60);
    assert_eq!(out["edges_after_sweep"], 30);
    assert!(db.exists());
}

#[test]
fn e2e_bench_rejects_zero_workers() {
    let output = run_failing(linkgraph().args(["bench", "--workers", "0"]));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("at least one worker"), "stderr: {stderr}");
}

#[test]
fn e2e_missing_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let output = run_failing(
        linkgraph()
            .arg("--config")
            .arg(dir.path().join("absent.toml"))
            .arg("bench"),
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load config"), "stderr: {stderr}");
}
