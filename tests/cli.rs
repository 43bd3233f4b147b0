use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::tempdir;

fn bin(store: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("diarist"));
    cmd.env_remove("DIARIST_STORE")
        .env_remove("DIARIST_USER")
        .arg("--store")
        .arg(store)
        .arg("--user")
        .arg("u1");
    cmd
}

fn signup(store: &Path) {
    bin(store)
        .arg("signup")
        .arg("u1@example.com")
        .assert()
        .success()
        .stdout(predicate::str::contains("account 'u1' created"));
}

#[test]
fn signup_creates_store_file() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("journal.json");

    signup(&store);

    assert!(store.exists());
    let raw = std::fs::read_to_string(&store).unwrap();
    assert!(raw.contains("encryptionKey"));
}

#[test]
fn signup_twice_fails() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("journal.json");

    signup(&store);

    bin(&store)
        .arg("signup")
        .arg("u1@example.com")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already registered"));
}

#[test]
fn write_and_show_roundtrip() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("journal.json");

    signup(&store);

    bin(&store)
        .arg("write")
        .arg("--date")
        .arg("2024-01-15")
        .arg("Today was good.")
        .assert()
        .success()
        .stdout(predicate::str::contains("for 2024-01-15"));

    bin(&store)
        .arg("show")
        .arg("2024-01-15")
        .assert()
        .success()
        .stdout(predicate::str::contains("Today was good."));

    // plaintext never reaches the file
    let raw = std::fs::read_to_string(&store).unwrap();
    assert!(!raw.contains("Today was good."));
}

#[test]
fn write_reads_piped_stdin() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("journal.json");

    signup(&store);

    bin(&store)
        .arg("write")
        .arg("--date")
        .arg("2024-01-16")
        .write_stdin("from a pipe\n")
        .assert()
        .success();

    bin(&store)
        .arg("show")
        .arg("2024-01-16")
        .assert()
        .success()
        .stdout(predicate::str::contains("from a pipe"));
}

#[test]
fn blank_entry_is_rejected() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("journal.json");

    signup(&store);

    bin(&store)
        .arg("write")
        .arg("   ")
        .assert()
        .failure()
        .stderr(predicate::str::contains("entry cannot be empty"));
}

#[test]
fn same_day_write_overwrites() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("journal.json");

    signup(&store);

    for text in ["first draft", "final words"] {
        bin(&store)
            .arg("write")
            .arg("--date")
            .arg("2024-01-15")
            .arg(text)
            .assert()
            .success();
    }

    bin(&store)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("final words"))
        .stdout(predicate::str::contains("first draft").not())
        .stdout(predicate::str::contains("Monday, January 15, 2024"));
}

#[test]
fn search_finds_by_content_and_date() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("journal.json");

    signup(&store);

    for (date, text) in [("2024-01-15", "Went hiking"), ("2024-01-16", "Quiet day")] {
        bin(&store)
            .arg("write")
            .arg("--date")
            .arg(date)
            .arg(text)
            .assert()
            .success();
    }

    bin(&store)
        .arg("search")
        .arg("HIKING")
        .assert()
        .success()
        .stdout(predicate::str::contains("(1 entry)"))
        .stdout(predicate::str::contains("Went hiking"));

    bin(&store)
        .arg("search")
        .arg("tuesday")
        .assert()
        .success()
        .stdout(predicate::str::contains("Quiet day"))
        .stdout(predicate::str::contains("Went hiking").not());
}

#[test]
fn delete_entry_works() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("journal.json");

    signup(&store);

    let output = bin(&store)
        .arg("write")
        .arg("--date")
        .arg("2024-01-15")
        .arg("to be removed")
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    let id = stdout.split_whitespace().nth(2).unwrap().to_string();

    bin(&store)
        .arg("delete")
        .arg(&id)
        .assert()
        .success()
        .stdout(predicate::str::contains("removed"));

    bin(&store)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No entries yet."));
}

#[test]
fn chat_history_starts_empty_and_clears() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("journal.json");

    signup(&store);

    bin(&store)
        .arg("chat")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("No chat history."));

    bin(&store)
        .arg("chat")
        .arg("clear")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat history cleared"));

    bin(&store)
        .arg("chat")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("No chat history."));
}

#[test]
fn unknown_user_fails() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("journal.json");

    signup(&store);

    Command::new(assert_cmd::cargo::cargo_bin!("diarist"))
        .env_remove("DIARIST_STORE")
        .env("DIARIST_USER", "ghost")
        .arg("--store")
        .arg(&store)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no encryption key stored for user 'ghost'"));
}

#[test]
fn actions_fail_if_store_not_exists() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("journal.json");

    bin(&store)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("store does not exist"));
}

fn tamper_entries(store: &Path) {
    let raw = std::fs::read_to_string(store).unwrap();
    let mut doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let entries = doc["collections"]["entries"].as_object_mut().unwrap();
    for record in entries.values_mut() {
        record["encryptedData"]["value"] = "AAAAAAAAAAAAAAAAAAAAAAAA".into();
    }
    std::fs::write(store, serde_json::to_vec(&doc).unwrap()).unwrap();
}

#[test]
fn tampered_entry_is_an_error_not_a_miss() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("journal.json");

    signup(&store);

    bin(&store)
        .arg("write")
        .arg("--date")
        .arg("2024-01-15")
        .arg("my secret plans")
        .assert()
        .success();

    tamper_entries(&store);

    bin(&store)
        .arg("show")
        .arg("2024-01-15")
        .assert()
        .failure()
        .stdout(predicate::str::contains("no entry").not())
        .stderr(predicate::str::contains("authentication failed"));

    bin(&store)
        .arg("search")
        .arg("secret")
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not read entry"))
        .stderr(predicate::str::contains("1 entry could not be read"));

    bin(&store)
        .arg("list")
        .assert()
        .failure()
        .stdout(predicate::str::contains("No entries yet.").not())
        .stderr(predicate::str::contains("could not read entry"));

    bin(&store)
        .arg("show")
        .arg("2024-01-16")
        .assert()
        .success()
        .stdout(predicate::str::contains("no entry for 2024-01-16"));
}

#[test]
fn log_output_has_no_color_codes_when_piped() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("journal.json");

    signup(&store);

    bin(&store)
        .env("RUST_LOG", "info")
        .arg("list")
        .assert()
        .success()
        .stderr(predicate::str::contains("signed in"))
        .stderr(predicate::str::contains("\u{1b}[").not());
}
