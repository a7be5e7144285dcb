//! End-to-end runs against throwaway repositories built with the git CLI.

use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

use diffpack_core::serialize::verify_checksum;
use diffpack_core::{run, DiffConfig};

fn git(repo: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(repo)
        .env("GIT_AUTHOR_DATE", "2024-01-01T00:00:00+00:00")
        .env("GIT_COMMITTER_DATE", "2024-01-01T00:00:00+00:00")
        .status()
        .expect("failed to run git");
    assert!(status.success(), "git {args:?} failed");
}

fn init_repo(dir: &Path) {
    git(dir, &["init", "-q", "-b", "main"]);
    git(dir, &["config", "user.name", "Test User"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    git(dir, &["config", "core.autocrlf", "false"]);
}

fn commit_all(dir: &Path, message: &str) -> String {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
    rev_parse(dir)
}

fn rev_parse(dir: &Path) -> String {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(dir)
        .output()
        .expect("failed to run git rev-parse");
    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn config_for(dir: &Path, good: &str, cand: &str) -> DiffConfig {
    DiffConfig::new(dir.to_string_lossy().into_owned(), good, cand)
}

fn run_ok(config: &DiffConfig) -> Value {
    let envelope = run(config);
    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(value["ok"], true, "run failed: {value}");
    value["data"].clone()
}

#[test]
fn add_and_modify_emits_ordered_files() {
    let repo = TempDir::new().unwrap();
    init_repo(repo.path());

    fs::write(repo.path().join("a.txt"), "hello\n").unwrap();
    let good = commit_all(repo.path(), "base");

    fs::write(repo.path().join("a.txt"), "hello\nworld\n").unwrap();
    fs::write(repo.path().join("b.txt"), "x\n").unwrap();
    let cand = commit_all(repo.path(), "change");

    let data = run_ok(&config_for(repo.path(), &good, &cand));
    let files = data["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);

    assert_eq!(files[0]["path_new"], "a.txt");
    assert_eq!(files[0]["status"], "M");
    let hunks = files[0]["hunks"].as_array().unwrap();
    assert_eq!(hunks.len(), 1);
    assert_eq!(hunks[0]["added"], 1);
    assert_eq!(hunks[0]["deleted"], 0);

    assert_eq!(files[1]["path_new"], "b.txt");
    assert_eq!(files[1]["status"], "A");
    assert!(files[1]["path_old"].is_null());
    let hunks = files[1]["hunks"].as_array().unwrap();
    assert_eq!(hunks[0]["added"], 1);

    assert_eq!(data["omitted_files_count"], 0);
    assert_eq!(data["notes"], serde_json::json!([]));
    assert!(verify_checksum(&data).unwrap());
}

#[test]
fn two_runs_are_byte_identical() {
    let repo = TempDir::new().unwrap();
    init_repo(repo.path());

    fs::write(repo.path().join("a.txt"), "one\ntwo\n").unwrap();
    let good = commit_all(repo.path(), "base");
    fs::write(repo.path().join("a.txt"), "one\nthree\n").unwrap();
    let cand = commit_all(repo.path(), "change");

    let config = config_for(repo.path(), &good, &cand);
    let first = run(&config).to_canonical_json().unwrap();
    let second = run(&config).to_canonical_json().unwrap();
    assert_eq!(first, second);
}

#[test]
fn crlf_only_change_sets_both_flags() {
    let repo = TempDir::new().unwrap();
    init_repo(repo.path());

    fs::write(repo.path().join("f.txt"), "abc\r\n").unwrap();
    let good = commit_all(repo.path(), "crlf");
    fs::write(repo.path().join("f.txt"), "abc\n").unwrap();
    let cand = commit_all(repo.path(), "lf");

    let data = run_ok(&config_for(repo.path(), &good, &cand));
    let file = &data["files"][0];
    assert_eq!(file["eol_only_change"], true);
    assert_eq!(file["whitespace_only_change"], true);
    assert_eq!(file["hunks"].as_array().unwrap().len(), 1);
}

#[test]
fn pure_rename_has_no_hunks() {
    let repo = TempDir::new().unwrap();
    init_repo(repo.path());

    fs::write(
        repo.path().join("foo.txt"),
        "line one\nline two\nline three\nline four\n",
    )
    .unwrap();
    let good = commit_all(repo.path(), "base");

    git(repo.path(), &["mv", "foo.txt", "ren.txt"]);
    let cand = commit_all(repo.path(), "rename");

    let data = run_ok(&config_for(repo.path(), &good, &cand));
    let file = &data["files"][0];
    assert_eq!(file["status"], "R");
    assert_eq!(file["path_old"], "foo.txt");
    assert_eq!(file["path_new"], "ren.txt");
    assert_eq!(file["rename_score"], 100);
    assert!(file.get("rename_tiebreaker").is_none());
    assert!(file.get("hunks").is_none());
    assert!(file.get("eol_only_change").is_none());
}

#[test]
fn oversized_lockfile_is_summarized_with_a_note() {
    let repo = TempDir::new().unwrap();
    init_repo(repo.path());

    fs::write(repo.path().join("package-lock.json"), "{}\n").unwrap();
    let good = commit_all(repo.path(), "base");

    let mut body = String::from("{\n");
    for i in 0..400 {
        body.push_str(&format!("  \"dependency-{i}\": \"{i}.0.0\",\n"));
    }
    body.push_str("}\n");
    fs::write(repo.path().join("package-lock.json"), body).unwrap();
    let cand = commit_all(repo.path(), "lock churn");

    let mut config = config_for(repo.path(), &good, &cand);
    config.cap_file = 500;
    config.cap_total = 800_000;

    let data = run_ok(&config);
    let file = &data["files"][0];
    assert_eq!(file["summarized"], true);
    assert!(file.get("hunks").is_none());
    assert!(data["notes"]
        .as_array()
        .unwrap()
        .contains(&serde_json::json!("summarized lockfile: package-lock.json")));
}

#[test]
fn binary_files_carry_no_hunks() {
    let repo = TempDir::new().unwrap();
    init_repo(repo.path());

    fs::write(repo.path().join("img.bin"), [0u8, 159, 146, 150, 0, 1]).unwrap();
    let good = commit_all(repo.path(), "base");
    fs::write(repo.path().join("img.bin"), [0u8, 7, 7, 7, 0, 2, 3]).unwrap();
    let cand = commit_all(repo.path(), "change");

    let data = run_ok(&config_for(repo.path(), &good, &cand));
    let file = &data["files"][0];
    assert_eq!(file["is_binary"], true);
    assert!(file.get("hunks").is_none());
}

#[test]
fn submodule_change_carries_shas_and_no_hunks() {
    let repo = TempDir::new().unwrap();
    init_repo(repo.path());

    fs::write(repo.path().join("a.txt"), "hello\n").unwrap();
    commit_all(repo.path(), "base");

    // Register a gitlink directly in the index; commit objects behind
    // gitlinks are not validated, so no real submodule is needed.
    let old_sha = "1111111111111111111111111111111111111111";
    let new_sha = "2222222222222222222222222222222222222222";
    git(
        repo.path(),
        &[
            "update-index",
            "--add",
            "--cacheinfo",
            &format!("160000,{old_sha},vendor/dep"),
        ],
    );
    git(repo.path(), &["commit", "-q", "-m", "add gitlink"]);
    let good = rev_parse(repo.path());

    git(
        repo.path(),
        &[
            "update-index",
            "--add",
            "--cacheinfo",
            &format!("160000,{new_sha},vendor/dep"),
        ],
    );
    git(repo.path(), &["commit", "-q", "-m", "bump gitlink"]);
    let cand = rev_parse(repo.path());

    let data = run_ok(&config_for(repo.path(), &good, &cand));
    let file = &data["files"][0];
    assert_eq!(file["path_new"], "vendor/dep");
    assert_eq!(file["is_submodule"], true);
    assert_eq!(file["is_binary"], false);
    assert_eq!(file["submodule"]["old_sha"], old_sha);
    assert_eq!(file["submodule"]["new_sha"], new_sha);
    assert!(file.get("hunks").is_none());
}

#[test]
fn empty_change_set_is_still_a_valid_payload() {
    let repo = TempDir::new().unwrap();
    init_repo(repo.path());

    fs::write(repo.path().join("a.txt"), "hello\n").unwrap();
    let good = commit_all(repo.path(), "base");

    let data = run_ok(&config_for(repo.path(), &good, &good));
    assert_eq!(data["files"], serde_json::json!([]));
    assert_eq!(data["omitted_files_count"], 0);
    assert!(verify_checksum(&data).unwrap());
}

#[test]
fn global_cap_omits_later_files_but_keeps_metadata() {
    let repo = TempDir::new().unwrap();
    init_repo(repo.path());

    for name in ["a.txt", "b.txt", "c.txt"] {
        fs::write(repo.path().join(name), "seed\n").unwrap();
    }
    let good = commit_all(repo.path(), "base");

    for name in ["a.txt", "b.txt", "c.txt"] {
        let mut body = String::from("seed\n");
        for i in 0..40 {
            body.push_str(&format!("{name} content line {i}\n"));
        }
        fs::write(repo.path().join(name), body).unwrap();
    }
    let cand = commit_all(repo.path(), "grow");

    let mut config = config_for(repo.path(), &good, &cand);
    // Each patch is several hundred bytes; allow roughly two of them.
    config.cap_file = 2_000;
    config.cap_total = 2_000;

    let data = run_ok(&config);
    let files = data["files"].as_array().unwrap();
    assert_eq!(files.len(), 3);
    assert_eq!(data["omitted_files_count"].as_u64().unwrap(), 1);

    let omitted: Vec<&Value> = files.iter().filter(|f| f.get("hunks").is_none()).collect();
    assert_eq!(omitted.len(), 1);
    assert_eq!(omitted[0]["path_new"], "c.txt");

    let total: usize = files
        .iter()
        .filter_map(|f| f.get("hunks"))
        .flat_map(|h| h.as_array().unwrap())
        .map(|h| h["patch"].as_str().unwrap().len())
        .sum();
    assert!(total <= 2_000);
}

#[test]
fn missing_commit_produces_an_error_envelope() {
    let repo = TempDir::new().unwrap();
    init_repo(repo.path());

    fs::write(repo.path().join("a.txt"), "hello\n").unwrap();
    let good = commit_all(repo.path(), "base");

    let config = config_for(
        repo.path(),
        &good,
        "0123456789abcdef0123456789abcdef01234567",
    );
    let envelope = run(&config);
    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["code"], "COMMIT_NOT_FOUND");
    assert_eq!(
        value["error"]["details"]["missing_commits"][0],
        "0123456789abcdef0123456789abcdef01234567"
    );
}

#[test]
fn invalid_caps_fail_before_any_git_work() {
    let mut config = DiffConfig::new("/nonexistent/repo", "a", "b");
    config.cap_total = 1_000;
    config.cap_file = 2_000;

    let envelope = run(&config);
    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["code"], "CAPS_INVALID");
}
