#![allow(missing_docs)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

fn run(dir: &Path, args: &[&str]) -> Value {
    let output = cargo_bin_cmd!("freecloud")
        .arg("--config")
        .arg(dir.join("config.toml"))
        .arg("--db")
        .arg(dir.join("graph.db"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run freecloud");
    assert!(
        output.status.success(),
        "freecloud {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json output")
}

#[test]
fn init_creates_database_and_config() {
    let dir = TempDir::new().unwrap();
    let out = run(dir.path(), &["init", "--write-config"]);
    assert_eq!(out["backend"], "sqlite");
    assert!(dir.path().join("graph.db").exists());
    assert!(dir.path().join("config.toml").exists());
}

#[test]
fn tree_and_share_commands() {
    let dir = TempDir::new().unwrap();
    let alice = run(
        dir.path(),
        &["user", "add", "--email", "alice@example.com", "--password-hash", "h"],
    );
    assert_eq!(alice["user"]["is_admin"], true);
    assert!(alice["user"].get("password").is_none());
    let alice_id = alice["user"]["id"].as_str().unwrap().to_string();

    let bob = run(
        dir.path(),
        &["user", "add", "--email", "bob@example.com", "--password-hash", "h"],
    );
    let bob_id = bob["user"]["id"].as_str().unwrap().to_string();

    let docs = run(dir.path(), &["mkdir", "--user", &alice_id, "/docs"]);
    assert_eq!(docs["created"], true);
    assert_eq!(docs["node"]["type"], "FOLDER");
    let again = run(dir.path(), &["mkdir", "--user", &alice_id, "/docs"]);
    assert_eq!(again["created"], false);

    let file = run(dir.path(), &["touch", "--user", &alice_id, "/docs/a.txt"]);
    assert_eq!(file["node"]["full_path"], "/docs/a.txt");
    assert_eq!(file["node"]["mime_type"], "text/plain");

    let docs_id = docs["node"]["id"].as_str().unwrap();
    let shared = run(
        dir.path(),
        &["share", "--user", &alice_id, "--node", docs_id, "--with", &bob_id],
    );
    assert_eq!(shared["created"], true);
    assert_eq!(shared["share"]["share_mode"], "read");

    let listing = run(dir.path(), &["ls", "--user", &bob_id, "/docs"]);
    assert_eq!(listing["node"]["share_mode"], "read");
    assert_eq!(listing["children"][0]["name"], "a.txt");
}

#[test]
fn missing_path_fails_with_message() {
    let dir = TempDir::new().unwrap();
    let user = run(
        dir.path(),
        &["user", "add", "--email", "solo@example.com", "--password-hash", "h"],
    );
    let id = user["user"]["id"].as_str().unwrap().to_string();

    let output = cargo_bin_cmd!("freecloud")
        .arg("--config")
        .arg(dir.path().join("config.toml"))
        .arg("--db")
        .arg(dir.path().join("graph.db"))
        .args(["ls", "--user", &id, "/missing"])
        .output()
        .expect("run freecloud");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"), "{stderr}");
}
