//! Integration tests for the `webhook-bench` binary.

use assert_cmd::Command;
use chrono::{ DateTime, Utc };
use predicates::prelude::*;
use std::fs;
use std::path::{ Path, PathBuf };
use std::time::Duration;
use webhook_bench::payload::Payload;
use webhook_bench::report::{ BatchResult, Exchange, RequestOutcome, ResultSnapshot };
use wiremock::matchers::method;
use wiremock::{ Mock, MockServer, ResponseTemplate };

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn bin() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("webhook-bench"));
    cmd.env_remove("WEBHOOK_URL").env_remove("WEBHOOK_BENCH_RESULTS_DIR").env_remove("RUST_LOG");
    cmd
}

/// Snapshot where every request of a level took the given mean latency.
fn write_snapshot(path: &Path, levels: &[(usize, u64)]) {
    let at = DateTime::<Utc>::from_timestamp(1_760_884_200, 0).unwrap();
    let batches = levels
        .iter()
        .map(|&(concurrency, ms)| {
            let outcomes = (1..=concurrency)
                .map(|id| {
                    RequestOutcome::record(
                        id,
                        None,
                        at,
                        at,
                        Duration::from_millis(ms),
                        Ok(Exchange { status: 200, reason: Some("OK".into()), body: None })
                    )
                })
                .collect();
            BatchResult::new(concurrency, at, Duration::from_millis(ms), outcomes)
        })
        .collect();
    let snapshot = ResultSnapshot::new("http://localhost:5678/webhook/chat".into(), Payload::default(), at, batches);
    fs::write(path, serde_json::to_string_pretty(&snapshot).unwrap()).unwrap();
}

#[test]
fn compare_reports_deltas_and_unmatched_levels() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = dir.path().join("baseline.json");
    let candidate = dir.path().join("candidate.json");
    write_snapshot(&baseline, &[(5, 100), (10, 150)]);
    write_snapshot(&candidate, &[(5, 120), (10, 140), (20, 200)]);

    bin()
        .arg("compare")
        .arg(&baseline)
        .arg(&candidate)
        .assert()
        .success()
        .stdout(predicate::str::contains("Concurrency 5:"))
        .stdout(predicate::str::contains("+20.00ms (worse)"))
        .stdout(predicate::str::contains("-10.00ms (better)"))
        .stdout(predicate::str::contains("Concurrency 20: candidate only"));
}

#[test]
fn compare_finds_relative_names_in_results_dir() {
    let dir = tempfile::tempdir().unwrap();
    write_snapshot(&dir.path().join("a.json"), &[(5, 100)]);
    write_snapshot(&dir.path().join("b.json"), &[(5, 100)]);

    bin()
        .arg("compare")
        .arg("a.json")
        .arg("b.json")
        .arg("--results-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("+0.00ms (same)"));
}

#[test]
fn compare_rejects_snapshot_without_batches() {
    bin()
        .arg("compare")
        .arg(fixtures_dir().join("missing_batches.json"))
        .arg(fixtures_dir().join("single_request.json"))
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("missing_batches.json"));
}

#[test]
fn compare_rejects_unreadable_file() {
    let dir = tempfile::tempdir().unwrap();
    bin()
        .arg("compare")
        .arg(dir.path().join("nope.json"))
        .arg(fixtures_dir().join("single_request.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read snapshot"));
}

#[test]
fn compare_fixture_against_itself() {
    let fixture = fixtures_dir().join("single_request.json");
    bin()
        .arg("compare")
        .arg(&fixture)
        .arg(&fixture)
        .assert()
        .success()
        .stdout(predicate::str::contains("Concurrency 1:"))
        .stdout(predicate::str::contains("4.00 -> 4.00 req/s"));
}

#[test]
fn run_rejects_malformed_url() {
    bin()
        .args(["run", "localhost:5678/webhook"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("http://"));
}

#[test]
fn run_rejects_descending_levels() {
    bin()
        .args(["run", "http://127.0.0.1:9/hook", "--levels", "10,5", "--skip-preflight"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ascending"));
}

#[test]
fn run_fails_preflight_on_closed_port() {
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let dir = tempfile::tempdir().unwrap();
    bin()
        .args(["run", &format!("http://127.0.0.1:{port}/hook"), "-C", "1s"])
        .arg("--results-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to connect"));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0, "no snapshot on setup failure");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_writes_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results");
    let url = format!("{}/webhook/chat?token=secret", server.uri());

    let results_arg = results.clone();
    tokio::task
        ::spawn_blocking(move || {
            bin()
                .args(["run", &url, "--levels", "1,2", "--pause", "0s", "--out", "smoke"])
                .arg("--results-dir")
                .arg(&results_arg)
                .assert()
                .success()
                .stdout(predicate::str::contains("Results saved to:"));
        }).await
        .unwrap();

    let raw = fs::read_to_string(results.join("smoke.json")).unwrap();
    let snapshot: ResultSnapshot = serde_json::from_str(&raw).unwrap();
    snapshot.validate().unwrap();
    assert_eq!(snapshot.levels(), vec![1, 2]);
    assert_eq!(snapshot.overall.success_count, 3);
    assert!(!snapshot.target_url.contains("secret"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_with_unwritable_results_dir_still_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "").unwrap();
    let url = format!("{}/hook", server.uri());

    tokio::task
        ::spawn_blocking(move || {
            bin()
                .args(["run", &url, "--levels", "1", "--summarize"])
                .arg("--results-dir")
                .arg(blocker.join("results"))
                .assert()
                .success()
                .stdout(predicate::str::contains("Sent 1 requests"))
                .stderr(predicate::str::contains("Warning: failed to write results"));
        }).await
        .unwrap();
}
