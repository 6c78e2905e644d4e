#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

/// A throwaway database and config file for driving the binary.
pub struct TestDb {
    dir: TempDir,
}

impl TestDb {
    pub fn init() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("lvlup.toml"), "")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("tasks.db")
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("lvlup.toml")
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<()> {
        fs::write(self.config_path(), contents)
    }

    /// `lvlup` pointed at this database and config.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("lvlup").expect("binary");
        cmd.env_remove("LVLUP_DB")
            .env_remove("LVLUP_CONFIG")
            .env_remove("RUST_LOG")
            .arg("--db")
            .arg(self.db_path())
            .arg("--config")
            .arg(self.config_path());
        cmd
    }

    /// Run a command with `--json` and return the parsed envelope.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self
            .cmd()
            .args(args)
            .arg("--json")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&output).expect("json envelope")
    }

    /// `lvlup add` and return the new id.
    pub fn add(&self, args: &[&str]) -> i64 {
        let mut full = vec!["add"];
        full.extend_from_slice(args);
        let value = self.json(&full);
        value["data"]["task"]["id"].as_i64().expect("task id")
    }
}
