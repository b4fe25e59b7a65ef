mod common;

use common::cli::{ImvWorkspace, run_imv};
use predicates::prelude::*;

/// Two scopes, a maintainer `alice` in both, and `P1#1` with a label, a
/// scope-implicit reference and two notes.
fn seeded() -> ImvWorkspace {
    let workspace = ImvWorkspace::initialized();
    for args in [
        vec!["user", "add", "alice", "--name", "Alice"],
        vec!["scope", "add", "P1"],
        vec!["scope", "add", "P2"],
        vec!["scope", "grant", "P1", "alice", "maintainer"],
        vec!["scope", "grant", "P2", "alice", "reporter"],
        vec![
            "issue", "create", "P1", "--title", "Crash on start", "-d",
            "Regression of #3, see !4", "--label", "bug", "--actor", "alice",
        ],
        vec!["note", "add", "P1#1", "First look", "--actor", "alice"],
        vec!["note", "add", "P1#1", "changed the description", "--system"],
    ] {
        let run = run_imv(&workspace, &args);
        assert!(run.status.success(), "{args:?} failed: {}", run.stderr);
    }
    workspace
}

#[test]
fn e2e_move_carries_issue_and_notes() {
    let _log = common::test_log("e2e_move_carries_issue_and_notes");
    let workspace = seeded();

    let moved = run_imv(&workspace, ["move", "P1#1", "--to", "P2", "--json", "--actor", "alice"]);
    assert!(moved.status.success(), "move failed: {}", moved.stderr);
    let outcome = moved.json();
    assert_eq!(outcome["issue"]["iid"], 1);
    assert_eq!(outcome["issue"]["state"], "opened");
    assert_eq!(
        outcome["issue"]["description"],
        "Regression of P1#3, see P1!4"
    );
    assert!(outcome["issue"].get("label_ids").is_none());
    assert_eq!(outcome["source"]["state"], "closed");
    assert_eq!(outcome["carried_notes"], 2);

    let shown = run_imv(&workspace, ["show", "P2#1", "--json"]);
    assert!(shown.status.success(), "show failed: {}", shown.stderr);
    let details = shown.json();
    let notes = details["notes"].as_array().unwrap();
    let bodies: Vec<&str> = notes.iter().map(|n| n["body"].as_str().unwrap()).collect();
    assert_eq!(
        bodies,
        ["First look", "changed the description", "Moved from P1#1"]
    );
    assert_eq!(notes[0]["author"], "alice");
    assert_eq!(notes[1]["system"], true);
    assert_eq!(details["author"], "alice");

    let source = run_imv(&workspace, ["show", "P1#1"]);
    assert!(source.status.success());
    assert!(source.stdout.contains("[closed]"));
    assert!(source.stdout.contains("Moved to: P2#1"));
}

#[test]
fn e2e_move_text_output() {
    let workspace = seeded();
    let moved = run_imv(&workspace, ["move", "P1#1", "--to", "P2"]);
    assert!(moved.status.success(), "move failed: {}", moved.stderr);
    assert!(
        predicate::str::contains("Moved P1#1 to P2#1 (2 notes carried)").eval(&moved.stdout),
        "unexpected stdout: {}",
        moved.stdout
    );
}

#[test]
fn e2e_check_reports_without_moving() {
    let workspace = seeded();

    let ok = run_imv(&workspace, ["move", "P1#1", "--to", "P2", "--check", "--json"]);
    assert!(ok.status.success());
    assert_eq!(ok.json()["movable"], true);

    let same = run_imv(&workspace, ["move", "P1#1", "--to", "P1", "--check", "--json"]);
    assert!(same.status.success());
    let verdict = same.json();
    assert_eq!(verdict["movable"], false);
    assert_eq!(verdict["reason"], "same_scope");

    let shown = run_imv(&workspace, ["show", "P1#1", "--json"]);
    assert_eq!(shown.json()["issue"]["state"], "opened");
}

#[test]
fn e2e_rejected_move_is_structured_error() {
    let workspace = seeded();

    let same = run_imv(&workspace, ["move", "P1#1", "--to", "P1", "--json"]);
    assert!(!same.status.success());
    assert_eq!(same.status.code(), Some(5));
    let error = same.stderr_json();
    assert_eq!(error["error"]["code"], "MOVE_REJECTED");
    assert_eq!(error["error"]["retryable"], false);

    let missing = run_imv(&workspace, ["move", "P1#1", "--json"]);
    assert_eq!(missing.status.code(), Some(5));
    assert_eq!(missing.stderr_json()["error"]["code"], "MOVE_REJECTED");

    let unknown = run_imv(&workspace, ["move", "P1#1", "--to", "NOPE", "--json"]);
    assert!(!unknown.status.success());
    assert_eq!(unknown.stderr_json()["error"]["code"], "SCOPE_NOT_FOUND");
}

#[test]
fn e2e_move_needs_access_in_both_scopes() {
    let workspace = seeded();
    let bob = run_imv(&workspace, ["user", "add", "bob"]);
    assert!(bob.status.success());
    let grant = run_imv(&workspace, ["scope", "grant", "P1", "bob", "maintainer"]);
    assert!(grant.status.success());

    let denied = run_imv(&workspace, ["move", "P1#1", "--to", "P2", "--json", "--actor", "bob"]);
    assert_eq!(denied.status.code(), Some(5));
    let error = denied.stderr_json();
    assert_eq!(error["error"]["code"], "MOVE_REJECTED");
    assert!(error["error"]["message"].as_str().unwrap().contains("P2"));
}

#[test]
fn e2e_ghost_purge_after_move() {
    let workspace = seeded();
    let moved = run_imv(&workspace, ["move", "P1#1", "--to", "P2"]);
    assert!(moved.status.success(), "move failed: {}", moved.stderr);

    let purged = run_imv(&workspace, ["ghost", "alice", "--json"]);
    assert!(purged.status.success(), "ghost failed: {}", purged.stderr);
    let report = purged.json();
    assert_eq!(report["user"], "alice");
    assert_eq!(report["ghost"], "ghost");

    let shown = run_imv(&workspace, ["show", "P2#1", "--json"]);
    assert!(shown.status.success(), "show failed: {}", shown.stderr);
    let details = shown.json();
    assert_eq!(details["author"], "ghost");
    assert_eq!(details["notes"][0]["author"], "ghost");
}

#[test]
fn e2e_commands_need_a_workspace() {
    let workspace = ImvWorkspace::new();
    let run = run_imv(&workspace, ["show", "P1#1", "--json"]);
    assert_eq!(run.status.code(), Some(2));
    assert_eq!(run.stderr_json()["error"]["code"], "NOT_INITIALIZED");
}

#[test]
fn e2e_init_twice_needs_force() {
    let workspace = ImvWorkspace::initialized();
    let again = run_imv(&workspace, ["init", "--json"]);
    assert_eq!(again.status.code(), Some(2));
    assert_eq!(again.stderr_json()["error"]["code"], "ALREADY_INITIALIZED");

    let forced = run_imv(&workspace, ["init", "--force"]);
    assert!(forced.status.success(), "init --force failed: {}", forced.stderr);
}
