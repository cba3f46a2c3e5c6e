//! Integration tests for the offline CLI commands.

#![allow(clippy::panic)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cmd() -> Command {
    let mut cmd =
        Command::cargo_bin("contract-qa").unwrap_or_else(|e| panic!("binary not built: {e}"));
    cmd.env_remove("CONTRACT_QA_DB_PATH")
        .env_remove("CONTRACT_QA_PROMPT_DIR")
        .env_remove("RUST_LOG");
    cmd
}

fn sample_db(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("contracts.db");
    let conn = rusqlite::Connection::open(&path).unwrap_or_else(|e| panic!("open failed: {e}"));
    conn.execute_batch(
        "CREATE TABLE contract_asmd (
            project_id TEXT NOT NULL,
            reference_doc_id TEXT NOT NULL,
            contract_type TEXT
        );
        INSERT INTO contract_asmd VALUES ('p1', 'r1', 'Service Agreement');",
    )
    .unwrap_or_else(|e| panic!("seed failed: {e}"));
    path
}

#[test]
fn check_sql_accepts_scoped_select() {
    cmd()
        .args([
            "check-sql",
            "SELECT contract_type FROM contract_asmd WHERE project_id = 'p1' LIMIT 10",
        ])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("accepted"))
        .stdout(predicate::str::contains("LIMIT 10"));
}

#[test]
fn check_sql_lowers_oversized_limit() {
    cmd()
        .args([
            "check-sql",
            "SELECT * FROM contract_asmd LIMIT 5000",
            "--limit-ceiling",
            "100",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("LIMIT 100"))
        .stdout(predicate::str::contains("5000").not());
}

#[test]
fn check_sql_rejects_mutation() {
    cmd()
        .args(["check-sql", "DELETE FROM contract_asmd WHERE 1 = 1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rejected"));
}

#[test]
fn check_sql_missing_scope_rejected_or_injected() {
    cmd()
        .args(["check-sql", "SELECT * FROM contract_asmd"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing_scope"));

    cmd()
        .args([
            "check-sql",
            "SELECT * FROM contract_asmd",
            "--inject-missing-limit",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("LIMIT 1000"));
}

#[test]
fn check_sql_json_output() {
    cmd()
        .args([
            "--format",
            "json",
            "check-sql",
            "SELECT * FROM contract_asmd LIMIT 5000",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"accepted\": true"))
        .stdout(predicate::str::contains("\"rewritten\": true"));
}

#[test]
fn tools_lists_agent_tools() {
    cmd()
        .arg("tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("execute_sql_query"))
        .stdout(predicate::str::contains("hybrid_search").not());

    cmd()
        .args(["tools", "--agent", "search"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hybrid_search"))
        .stdout(predicate::str::contains("search_similar_documents"))
        .stdout(predicate::str::contains("compare_filtered_documents"));
}

#[test]
fn schema_prints_tables() {
    let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
    let db = sample_db(dir.path());
    cmd()
        .arg("--db-path")
        .arg(&db)
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE TABLE contract_asmd"));
}

#[test]
fn schema_requires_database() {
    cmd()
        .arg("schema")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--db-path"));
}

#[test]
fn init_prompts_writes_templates_once() {
    let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
    let target = dir.path().join("prompts");

    cmd()
        .arg("init-prompts")
        .arg("--dir")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 2 prompt template(s)"));
    assert!(target.join("metadata.md").exists());
    assert!(target.join("search.md").exists());

    cmd()
        .arg("init-prompts")
        .arg("--dir")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("already exist"));
}

#[test]
fn ask_without_api_key_fails_cleanly() {
    cmd()
        .env_remove("OPENAI_API_KEY")
        .env_remove("CONTRACT_QA_API_KEY")
        .args(["ask", "How many contracts?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key missing"));
}
