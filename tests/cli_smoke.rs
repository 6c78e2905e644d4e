mod support;

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;

use support::TestDb;

#[test]
fn lvlup_help_works() {
    Command::cargo_bin("lvlup")
        .expect("binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("a to-do list with nested subtasks"));
}

#[test]
fn subcommand_help_works() {
    for cmd in ["add", "edit", "list", "show", "done", "rm", "stats", "watch"] {
        Command::cargo_bin("lvlup")
            .expect("binary")
            .arg(cmd)
            .arg("--help")
            .assert()
            .success();
    }
}

#[test]
fn add_then_list_round_trips() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    let id = db.add(&["Buy milk", "--priority", "high", "--due", "2099-01-01 09:30"]);
    assert!(id > 0);

    let value = db.json(&["list"]);
    assert_eq!(value["schema_version"], "lvlup.v1");
    assert_eq!(value["command"], "list");
    assert_eq!(value["status"], "success");
    assert_eq!(value["data"]["total"], 1);
    let task = &value["data"]["tasks"][0];
    assert_eq!(task["id"], id);
    assert_eq!(task["title"], "Buy milk");
    assert_eq!(task["priority"], "high");
    assert_eq!(task["depth"], 0);
    assert!(task["due_date"].is_i64());
    Ok(())
}

#[test]
fn add_with_future_due_reports_scheduled_reminder() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    let value = db.json(&["add", "Renew passport", "--due", "2099-06-01"]);
    assert_eq!(value["data"]["reminder"]["state"], "scheduled");
    assert_eq!(value["data"]["event"]["kind"], "upserted");

    let undated = db.json(&["add", "Someday"]);
    assert_eq!(undated["data"]["reminder"]["state"], "unscheduled");
    Ok(())
}

#[test]
fn scheduled_reminder_notes_that_watch_delivers_it() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    db.cmd()
        .args(["add", "Renew passport", "--due", "2099-06-01"])
        .assert()
        .success()
        .stdout(contains("Reminder: scheduled"))
        .stdout(contains("note: reminders fire only while `lvlup watch` is running"));

    let value = db.json(&["add", "Book visa", "--due", "2099-06-02"]);
    assert_eq!(value["data"]["reminder"]["state"], "scheduled");
    assert!(value["notes"][0]
        .as_str()
        .unwrap_or_default()
        .contains("lvlup watch"));

    let undated = db.json(&["add", "Someday"]);
    assert!(undated.get("notes").is_none());
    Ok(())
}

#[test]
fn tree_nests_subtasks_and_views_keep_ancestors() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    let parent = db.add(&["Plan trip"]);
    let child = db.add(&["Book flights", "--parent", &parent.to_string()]);
    db.add(&["Water plants"]);

    db.cmd().args(["done", &child.to_string()]).assert().success();

    let tree = db.json(&["list", "--tree"]);
    let forest = tree["data"]["forest"].as_array().expect("forest");
    assert_eq!(forest.len(), 2);
    assert_eq!(tree["data"]["total"], 3);
    let trip = forest
        .iter()
        .find(|node| node["task"]["id"] == parent)
        .expect("parent root");
    assert_eq!(trip["sub_tasks"][0]["task"]["id"], child);

    let done = db.json(&["list", "--tree", "--view", "done"]);
    let forest = done["data"]["forest"].as_array().expect("forest");
    assert_eq!(forest.len(), 1);
    assert_eq!(forest[0]["task"]["id"], parent);
    assert_eq!(forest[0]["task"]["is_completed"], false);
    assert_eq!(forest[0]["sub_tasks"][0]["task"]["id"], child);

    let ongoing = db.json(&["list", "--view", "ongoing"]);
    let ids: Vec<i64> = ongoing["data"]["tasks"]
        .as_array()
        .expect("tasks")
        .iter()
        .filter_map(|task| task["id"].as_i64())
        .collect();
    assert!(ids.contains(&parent));
    assert!(!ids.contains(&child));
    Ok(())
}

#[test]
fn human_tree_output_indents_children() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    let parent = db.add(&["Parent"]);
    db.add(&["Child", "--parent", &parent.to_string()]);

    db.cmd()
        .args(["list", "--tree"])
        .assert()
        .success()
        .stdout(contains("- [ ] #1 Parent (medium)"))
        .stdout(contains("-   [ ] #2 Child (medium)"));
    Ok(())
}

#[test]
fn done_toggles_and_stats_follow() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    let first = db.add(&["One"]);
    db.add(&["Two"]);
    db.add(&["Three"]);
    db.add(&["Four"]);

    let toggled = db.json(&["done", &first.to_string()]);
    assert_eq!(toggled["data"]["task"]["is_completed"], true);
    assert_eq!(toggled["data"]["event"]["kind"], "completion_toggled");

    let stats = db.json(&["stats", "--widget", "detailed"]);
    assert_eq!(stats["data"]["total"], 4);
    assert_eq!(stats["data"]["completed"], 1);
    assert_eq!(stats["data"]["pending"], 3);
    assert_eq!(stats["data"]["widget"], "detailed");
    assert_eq!(
        stats["data"]["lines"],
        serde_json::json!(["25%", "Total Tasks: 4", "Completed: 1", "Pending: 3"])
    );

    let reopened = db.json(&["done", &first.to_string()]);
    assert_eq!(reopened["data"]["task"]["is_completed"], false);

    db.cmd()
        .args(["stats"])
        .assert()
        .success()
        .stdout(contains("0%"));
    Ok(())
}

#[test]
fn stats_on_empty_database_is_zero() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    let stats = db.json(&["stats"]);
    assert_eq!(stats["data"]["total"], 0);
    assert_eq!(stats["data"]["completion_rate"], 0.0);
    assert_eq!(stats["data"]["lines"], serde_json::json!(["0%"]));
    Ok(())
}

#[test]
fn rm_cascades_to_subtasks() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    let parent = db.add(&["Parent"]);
    let child = db.add(&["Child", "--parent", &parent.to_string()]);
    let grandchild = db.add(&["Grandchild", "--parent", &child.to_string()]);
    let other = db.add(&["Other"]);

    let removed = db.json(&["rm", &parent.to_string()]);
    assert_eq!(
        removed["data"]["removed"],
        serde_json::json!([parent, child, grandchild])
    );

    let list = db.json(&["list"]);
    assert_eq!(list["data"]["total"], 1);
    assert_eq!(list["data"]["tasks"][0]["id"], other);
    Ok(())
}

#[test]
fn edit_changes_fields_and_clears_due() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    let id = db.add(&["Draft", "--due", "2099-03-03"]);

    let edited = db.json(&[
        "edit",
        &id.to_string(),
        "--title",
        "Final",
        "--priority",
        "low",
        "--clear-due",
    ]);
    assert_eq!(edited["data"]["task"]["title"], "Final");
    assert_eq!(edited["data"]["task"]["priority"], "low");
    assert!(edited["data"]["task"].get("due_date").is_none());
    assert_eq!(edited["data"]["reminder"]["state"], "unscheduled");

    let shown = db.json(&["show", &id.to_string()]);
    assert_eq!(shown["data"]["task"]["title"], "Final");
    Ok(())
}

#[test]
fn edit_rejects_cycles() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    let parent = db.add(&["Parent"]);
    let child = db.add(&["Child", "--parent", &parent.to_string()]);

    let output = db
        .cmd()
        .args(["edit", &parent.to_string(), "--parent", &child.to_string(), "--json"])
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output)?;
    assert_eq!(value["status"], "error");
    assert_eq!(value["error"]["kind"], "user_error");
    Ok(())
}

#[test]
fn validation_errors_exit_with_user_error() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;

    let output = db
        .cmd()
        .args(["add", "   ", "--json"])
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output)?;
    assert_eq!(value["command"], "add");
    assert_eq!(value["error"]["code"], 2);
    assert!(value["error"]["message"]
        .as_str()
        .unwrap_or_default()
        .contains("Title cannot be empty"));

    db.cmd()
        .args(["add", "Too late", "--due", "2000-01-01"])
        .assert()
        .code(2)
        .stderr(contains("in the past"));

    db.cmd()
        .args(["add", "Orphan", "--parent", "404"])
        .assert()
        .code(2)
        .stderr(contains("Parent task not found: 404"));

    db.cmd()
        .args(["add", "Bad date", "--due", "next tuesday"])
        .assert()
        .code(2);

    db.cmd()
        .args(["add", "Bad priority", "--priority", "urgent"])
        .assert()
        .code(2);

    let list = db.json(&["list"]);
    assert_eq!(list["data"]["total"], 0);
    Ok(())
}

#[test]
fn missing_task_exits_with_user_error() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    for cmd in ["show", "done", "rm"] {
        db.cmd()
            .args([cmd, "99"])
            .assert()
            .code(2)
            .stderr(contains("Task not found: 99"))
            .stderr(contains("hint: lvlup list"));
    }
    Ok(())
}

#[test]
fn events_are_mirrored_to_file() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    let events = db.path().join("events.jsonl");
    let events_arg = events.to_string_lossy().to_string();

    db.cmd()
        .args(["--events", &events_arg, "add", "Evented"])
        .assert()
        .success();
    db.cmd()
        .args(["--events", &events_arg, "done", "1"])
        .assert()
        .success();

    let contents = std::fs::read_to_string(&events)?;
    let lines: Vec<Value> = contents
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["schema_version"], "lvlup.event.v1");
    assert_eq!(lines[0]["kind"], "upserted");
    assert_eq!(lines[1]["kind"], "completion_toggled");
    assert_eq!(lines[1]["task_id"], 1);
    Ok(())
}

#[test]
fn events_to_stdout_suppress_human_output() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    let output = db
        .cmd()
        .args(["--events", "-", "add", "Streamed", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1);
    let event: Value = serde_json::from_str(lines[0])?;
    assert_eq!(event["kind"], "upserted");
    Ok(())
}

#[test]
fn invalid_config_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    db.write_config("[watch]\nresync_secs = 0\n")?;
    db.cmd()
        .args(["list"])
        .assert()
        .code(2)
        .stderr(contains("watch.resync_secs"));
    Ok(())
}

#[test]
fn watch_refuses_when_reminders_disabled() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    db.write_config("[reminders]\nenabled = false\n")?;
    db.cmd().args(["watch", "--timeout", "1"]).assert().code(3);
    Ok(())
}

#[test]
fn watch_stops_after_timeout() -> Result<(), Box<dyn std::error::Error>> {
    let db = TestDb::init()?;
    db.add(&["Far away", "--due", "2099-12-31"]);

    let value = db.json(&["watch", "--timeout", "1"]);
    assert_eq!(value["command"], "watch");
    assert!(value["data"]["syncs"].as_u64().unwrap_or(0) >= 1);
    assert_eq!(value["data"]["last_sync"]["scheduled"], serde_json::json!([1]));
    assert_eq!(value["data"]["delivered"], 0);
    Ok(())
}
