//! End-to-end runs of the binary against a fake metadata server.
//!
//! Only failure paths that stop before git or npm are driven here; the rest
//! of the pipeline is covered with the mock runner in the core crate.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PREFIX: &str = "/computeMetadata/v1/instance";

async fn metadata_server(attributes: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/attributes/", PREFIX)))
        .and(query_param("recursive", "true"))
        .and(query_param("alt", "json"))
        .and(header("Metadata-Flavor", "Google"))
        .respond_with(ResponseTemplate::new(200).set_body_json(attributes))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/zone", PREFIX)))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("projects/123/zones/europe-west1-b"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/name", PREFIX)))
        .respond_with(ResponseTemplate::new(200).set_body_string("worker-1"))
        .mount(&server)
        .await;
    server
}

fn base_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), PREFIX)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_metadata_command_prints_merged_map() {
    let server = metadata_server(json!({"PORT": "8080", "GIT_URL": "https://x/repo.git"})).await;

    let output = Command::cargo_bin("appboot")
        .unwrap()
        .env_remove("APPBOOT_CONFIG")
        .args(["metadata", "--metadata-url", &base_url(&server)])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["PORT"], "8080");
    assert_eq!(parsed["ZONE"], "europe-west1-b");
    assert_eq!(parsed["NAME"], "worker-1");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_without_git_url_fails_after_reset() {
    let server = metadata_server(json!({"PORT": "8080"})).await;
    let home = TempDir::new().unwrap();
    let working_dir = home.path().join("app");
    std::fs::create_dir(&working_dir).unwrap();
    std::fs::write(working_dir.join("stale.txt"), "old").unwrap();

    Command::cargo_bin("appboot")
        .unwrap()
        .env_remove("APPBOOT_CONFIG")
        .args(["--log-level", "error", "run", "--metadata-url"])
        .arg(base_url(&server))
        .arg("--working-dir")
        .arg(&working_dir)
        .arg("--home-dir")
        .arg(home.path())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains(
            "clone: FAILED (Git error: GIT_URL required)",
        ))
        .stderr(predicate::str::contains("GIT_URL required"));

    // The workspace was reset before the clone step gave up.
    assert!(working_dir.is_dir());
    assert!(!working_dir.join("stale.txt").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_json_summary_on_metadata_failure() {
    let home = TempDir::new().unwrap();
    let working_dir = home.path().join("app");
    std::fs::create_dir(&working_dir).unwrap();
    std::fs::write(working_dir.join("keep.txt"), "kept").unwrap();

    let output = Command::cargo_bin("appboot")
        .unwrap()
        .env_remove("APPBOOT_CONFIG")
        .args(["run", "--summary", "json", "--metadata-url", "http://127.0.0.1:9"])
        .arg("--working-dir")
        .arg(&working_dir)
        .arg("--home-dir")
        .arg(home.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["phases"][0]["phase"], "checkWorkingDir");
    assert_eq!(parsed["phases"][0]["status"], "executed");
    assert_eq!(parsed["phases"][1]["phase"], "fetchMetadata");
    assert_eq!(parsed["phases"][1]["status"], "failed");
    assert_eq!(parsed["phases"].as_array().unwrap().len(), 2);
    // No reset ran, so the existing checkout is untouched.
    assert!(working_dir.join("keep.txt").exists());
}

#[test]
fn test_run_fails_before_metadata_when_working_dir_missing() {
    let home = TempDir::new().unwrap();

    Command::cargo_bin("appboot")
        .unwrap()
        .env_remove("APPBOOT_CONFIG")
        .args(["run", "--metadata-url", "http://127.0.0.1:9"])
        .arg("--working-dir")
        .arg(home.path().join("app"))
        .arg("--home-dir")
        .arg(home.path())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("checkWorkingDir: FAILED"))
        .stdout(predicate::str::contains("fetchMetadata").not());
}
