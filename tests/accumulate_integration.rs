//! Integration tests for the accumulation run
//!
//! These drive the compiled binary end to end with a replay client:
//! - Plain, follow-up and seeded runs
//! - Per-species failure recording
//! - Resuming an interrupted run
//! - Run-fatal configuration errors
//! - The summary and prompts commands

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

const LEAF: &str = r#"[{"characteristic": "leaf shape", "value": "ovate"}]"#;
const HABIT: &str = r#"[{"characteristic": "habit", "value": "tree"}]"#;

/// Helper to get the desc2matrix binary path
fn desc2matrix_binary() -> PathBuf {
    // When running tests, the binary is in target/debug/desc2matrix
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test binary name
    path.pop(); // Remove deps
    path.push("desc2matrix");
    path
}

/// Helper to run desc2matrix with an isolated config and data directory
fn run_d2m(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(desc2matrix_binary())
        .env("D2M_DIR", dir)
        .env("XDG_DATA_HOME", dir.join("data"))
        .env_remove("D2M_CONFIG")
        .env_remove("RUST_LOG")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("Failed to execute desc2matrix")
}

/// Scratch directory with a config file and a TSV of descriptions
fn setup(descriptions: &[&str]) -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("desc2matrix.yaml"), "log_level: debug\n").unwrap();

    let mut tsv = String::from("coreid\tdescription\n");
    for (i, desc) in descriptions.iter().enumerate() {
        tsv.push_str(&format!("wfo-{}\t{}\n", i + 1, desc));
    }
    fs::write(temp.path().join("descs.tsv"), tsv).unwrap();
    temp
}

/// Write a replay file; `Err` entries become transport failures
fn write_replay(dir: &Path, name: &str, responses: &[Result<&str, &str>]) -> PathBuf {
    let entries: Vec<Value> = responses
        .iter()
        .map(|r| match r {
            Ok(text) => serde_json::json!({ "text": text }),
            Err(error) => serde_json::json!({ "error": error }),
        })
        .collect();
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();
    path
}

fn read_artifact(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn assert_success(output: &std::process::Output) {
    assert!(
        output.status.success(),
        "desc2matrix failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_plain_run_records_success_and_invalid_json() {
    let temp = setup(&["Desc A", "Desc B"]);
    let replay = write_replay(temp.path(), "replay.json", &[Ok(LEAF), Ok("oops")]);

    let output = run_d2m(
        temp.path(),
        &["run", "descs.tsv", "out.json", "--replay", replay.to_str().unwrap(), "-q"],
    );
    assert_success(&output);

    let artifact = read_artifact(&temp.path().join("out.json"));
    assert_eq!(artifact["metadata"]["mode"], "desc2json_accum_plain");
    assert_eq!(artifact["charlist_len_history"], serde_json::json!([1, 1]));
    assert_eq!(artifact["charlist_history"][0], serde_json::json!(["leaf shape"]));

    let data = artifact["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["coreid"], "wfo-1");
    assert_eq!(data[0]["status"], "success");
    assert_eq!(data[0]["char_json"][0]["value"], "ovate");
    assert!(data[0].get("failed_str").is_none());
    assert_eq!(data[1]["status"], "invalid_json");
    assert_eq!(data[1]["failed_str"], "oops");
    assert!(data[1].get("char_json").is_none());
}

#[test]
fn test_followup_recovers_failed_species() {
    let temp = setup(&["Petals red"]);
    let replay = write_replay(
        temp.path(),
        "replay.json",
        &[Ok("not json"), Ok(r#"[{"characteristic": "petal colour", "value": "red"}]"#)],
    );

    let output = run_d2m(
        temp.path(),
        &["run", "descs.tsv", "out.json", "--followup", "--replay", replay.to_str().unwrap(), "-q"],
    );
    assert_success(&output);

    let artifact = read_artifact(&temp.path().join("out.json"));
    assert_eq!(artifact["metadata"]["mode"], "desc2json_accum_plain_followup");
    assert_eq!(artifact["metadata"]["completion_calls"], 2);
    assert_eq!(artifact["data"][0]["status"], "success");
    assert_eq!(artifact["charlist_history"][0], serde_json::json!(["petal colour"]));
}

#[test]
fn test_transport_failure_is_recorded_per_species() {
    let temp = setup(&["a", "b", "c"]);
    let replay = write_replay(temp.path(), "replay.json", &[Ok(LEAF), Err("connection refused"), Ok(HABIT)]);

    let output = run_d2m(
        temp.path(),
        &["run", "descs.tsv", "out.json", "--replay", replay.to_str().unwrap(), "-q"],
    );
    assert_success(&output);

    let artifact = read_artifact(&temp.path().join("out.json"));
    assert_eq!(artifact["data"][1]["status"], "exception_thrown");
    assert_eq!(artifact["data"][1]["failed_str"], "connection refused");
    assert_eq!(artifact["data"][2]["status"], "success");
    assert_eq!(artifact["charlist_len_history"], serde_json::json!([1, 1, 2]));
}

#[test]
fn test_single_seed_adds_history_entry() {
    let temp = setup(&["Tree"]);
    let replay = write_replay(temp.path(), "replay.json", &[Ok(HABIT), Ok(LEAF)]);

    let output = run_d2m(
        temp.path(),
        &[
            "run",
            "descs.tsv",
            "out.json",
            "--seed-strategy",
            "single",
            "--replay",
            replay.to_str().unwrap(),
            "-q",
        ],
    );
    assert_success(&output);

    let artifact = read_artifact(&temp.path().join("out.json"));
    assert_eq!(artifact["metadata"]["mode"], "desc2json_accum");
    assert_eq!(artifact["metadata"]["seed"]["status"], "success");
    assert_eq!(artifact["charlist_len_history"], serde_json::json!([1, 2]));
    assert_eq!(artifact["data"].as_array().unwrap().len(), 1);
}

#[test]
fn test_resume_matches_uninterrupted_run() {
    let temp = setup(&["a", "b", "c"]);
    let responses = [Ok(LEAF), Ok("oops"), Ok(HABIT)];
    let replay = write_replay(temp.path(), "replay.json", &responses);
    let replay = replay.to_str().unwrap();

    let output = run_d2m(temp.path(), &["run", "descs.tsv", "full.json", "--replay", replay, "-q"]);
    assert_success(&output);

    // Interrupted after two species
    let output = run_d2m(
        temp.path(),
        &["run", "descs.tsv", "partial.json", "--replay", replay, "--spnum", "2", "-q"],
    );
    assert_success(&output);
    assert_eq!(read_artifact(&temp.path().join("partial.json"))["data"].as_array().unwrap().len(), 2);

    let output = run_d2m(
        temp.path(),
        &["run", "descs.tsv", "partial.json", "--replay", replay, "--resume", "-q"],
    );
    assert_success(&output);

    let full = read_artifact(&temp.path().join("full.json"));
    let resumed = read_artifact(&temp.path().join("partial.json"));
    for key in ["charlist_history", "charlist_len_history", "data"] {
        assert_eq!(full[key], resumed[key], "{} differs", key);
    }
    assert_eq!(resumed["metadata"]["completion_calls"], 3);
}

#[test]
fn test_resume_rejects_other_mode() {
    let temp = setup(&["a"]);
    let replay = write_replay(temp.path(), "replay.json", &[Ok(LEAF), Ok(LEAF)]);
    let replay = replay.to_str().unwrap();

    assert_success(&run_d2m(temp.path(), &["run", "descs.tsv", "out.json", "--replay", replay, "-q"]));

    let output = run_d2m(
        temp.path(),
        &["run", "descs.tsv", "out.json", "--replay", replay, "--resume", "--followup", "-q"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Cannot resume"));
}

#[test]
fn test_resume_rejects_different_start() {
    let temp = setup(&["a", "b", "c"]);
    let replay = write_replay(temp.path(), "replay.json", &[Ok(LEAF), Ok(HABIT), Ok(LEAF)]);
    let replay = replay.to_str().unwrap();

    assert_success(&run_d2m(
        temp.path(),
        &["run", "descs.tsv", "out.json", "--replay", replay, "--spnum", "1", "-q"],
    ));

    let output = run_d2m(
        temp.path(),
        &["run", "descs.tsv", "out.json", "--replay", replay, "--resume", "--start", "1", "-q"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Cannot resume"));
    assert!(stderr.contains("start offset"));
    assert_eq!(read_artifact(&temp.path().join("out.json"))["data"].as_array().unwrap().len(), 1);
}

#[test]
fn test_resume_rejects_changed_descriptions() {
    let temp = setup(&["a", "b"]);
    let replay = write_replay(temp.path(), "replay.json", &[Ok(LEAF), Ok(HABIT)]);
    let replay = replay.to_str().unwrap();

    assert_success(&run_d2m(
        temp.path(),
        &["run", "descs.tsv", "out.json", "--replay", replay, "--spnum", "1", "-q"],
    ));
    fs::write(temp.path().join("descs.tsv"), "coreid\tdescription\nwfo-9\tz\nwfo-2\tb\n").unwrap();

    let output = run_d2m(
        temp.path(),
        &["run", "descs.tsv", "out.json", "--replay", replay, "--resume", "-q"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Description 1 differs"));
}

#[test]
fn test_missing_template_is_fatal() {
    let temp = setup(&["a"]);
    let replay = write_replay(temp.path(), "replay.json", &[Ok(LEAF)]);

    let output = run_d2m(
        temp.path(),
        &[
            "run",
            "descs.tsv",
            "out.json",
            "--prompt",
            "missing.txt",
            "--replay",
            replay.to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
    assert!(!temp.path().join("out.json").exists());
}

#[test]
fn test_template_without_placeholder_is_fatal() {
    let temp = setup(&["a"]);
    let replay = write_replay(temp.path(), "replay.json", &[Ok(LEAF)]);
    fs::write(temp.path().join("fprompt.txt"), "Tell me more.").unwrap();

    let output = run_d2m(
        temp.path(),
        &[
            "run",
            "descs.tsv",
            "out.json",
            "--followup",
            "--fprompt",
            "fprompt.txt",
            "--replay",
            replay.to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("[MISSING_WORDS]"));
    assert!(!temp.path().join("out.json").exists());
}

#[test]
fn test_missing_description_file_is_fatal() {
    let temp = setup(&[]);
    let output = run_d2m(temp.path(), &["run", "nope.tsv", "out.json", "--replay", "replay.json"]);
    assert!(!output.status.success());
}

#[test]
fn test_empty_input_writes_empty_artifact() {
    let temp = setup(&[]);
    let replay = write_replay(temp.path(), "replay.json", &[]);

    let output = run_d2m(
        temp.path(),
        &["run", "descs.tsv", "out.json", "--replay", replay.to_str().unwrap(), "-q"],
    );
    assert_success(&output);

    let artifact = read_artifact(&temp.path().join("out.json"));
    assert_eq!(artifact["data"], serde_json::json!([]));
    assert_eq!(artifact["charlist_history"], serde_json::json!([]));
}

#[test]
fn test_summary_reports_statuses() {
    let temp = setup(&["Tree", "Herb"]);
    let replay = write_replay(temp.path(), "replay.json", &[Ok(HABIT), Err("down")]);

    assert_success(&run_d2m(
        temp.path(),
        &["run", "descs.tsv", "out.json", "--replay", replay.to_str().unwrap(), "-q"],
    ));

    let output = run_d2m(temp.path(), &["summary", "out.json", "-o", "json"]);
    assert_success(&output);

    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["species"], 2);
    assert_eq!(summary["statuses"]["success"], 1);
    assert_eq!(summary["statuses"]["exception_thrown"], 1);
    assert_eq!(summary["registry_size"], 1);
}

#[test]
fn test_prompts_show_builtin() {
    let temp = setup(&[]);
    let output = run_d2m(temp.path(), &["prompts", "show", "followup"]);
    assert_success(&output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("[MISSING_WORDS]"));

    let output = run_d2m(temp.path(), &["prompts", "show", "nope"]);
    assert!(!output.status.success());
}

#[test]
fn test_config_show_json() {
    let temp = setup(&[]);
    let output = run_d2m(temp.path(), &["config", "show", "-o", "json"]);
    assert_success(&output);

    let config: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["log_level"], "debug");
    assert_eq!(config["llm"]["model"], "llama3");
}
