//! A scripted driver for the scenario tests.
//!
//! Records every statement it executes and replays the rows staged by the
//! test, in order. A write with no staged outcome is auto-confirmed: every
//! variable in the insert statement is reported back, carrying the id
//! visible in the statement when there is one. The happy path therefore
//! needs no staging at all.

use async_trait::async_trait;
use graft_driver::{DriverResult, GraphDriver, WriteBatch, WriteOutcome};
use regex_lite::Regex;
use serde_json::Value as Json;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeDriver {
    staged_reads: Mutex<VecDeque<Vec<Json>>>,
    staged_writes: Mutex<VecDeque<WriteOutcome>>,
    read_log: Mutex<Vec<String>>,
    write_log: Mutex<Vec<WriteBatch>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage the rows the next read returns.
    pub fn stage_read(&self, rows: Vec<Json>) {
        self.staged_reads.lock().unwrap().push_back(rows);
    }

    /// Stage the outcome of the next write instead of auto-confirming it.
    pub fn stage_write(&self, outcome: WriteOutcome) {
        self.staged_writes.lock().unwrap().push_back(outcome);
    }

    /// Every read statement executed so far.
    pub fn reads(&self) -> Vec<String> {
        self.read_log.lock().unwrap().clone()
    }

    /// Every write batch executed so far.
    pub fn writes(&self) -> Vec<WriteBatch> {
        self.write_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphDriver for FakeDriver {
    async fn read(&self, statement: &str) -> DriverResult<Vec<Json>> {
        self.read_log.lock().unwrap().push(statement.to_string());
        Ok(self
            .staged_reads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn write(&self, batch: &WriteBatch) -> DriverResult<WriteOutcome> {
        self.write_log.lock().unwrap().push(batch.clone());
        let staged = self.staged_writes.lock().unwrap().pop_front();
        Ok(staged.unwrap_or_else(|| confirm(batch)))
    }
}

/// Confirm every insert variable, reading the id it inserts when one is
/// visible in the statement.
fn confirm(batch: &WriteBatch) -> WriteOutcome {
    let mut outcome = WriteOutcome::default();
    if let Some(delete) = &batch.delete {
        outcome.deleted = body_lines(delete, "delete").count();
    }
    let Some(insert) = &batch.insert else {
        return outcome;
    };
    let var = Regex::new(r"^\$([A-Za-z0-9_]+)").unwrap();
    let id = Regex::new("has id \"([^\"]+)\"").unwrap();
    for line in body_lines(insert, "insert") {
        let Some(name) = var
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
        else {
            continue;
        };
        let backend_id = id
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| format!("{name}-gen"));
        outcome.inserted.insert(name, backend_id);
    }
    outcome
}

fn body_lines<'a>(statement: &'a str, verb: &str) -> impl Iterator<Item = &'a str> {
    let verb = verb.to_string();
    statement
        .lines()
        .skip_while(move |line| *line != verb)
        .skip(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_confirm_reads_ids_from_the_statement() {
        let batch = WriteBatch {
            delete: None,
            insert: Some(
                "match\n$n1 isa Space, has id \"s1\";\ninsert\n$n0 isa User, has id \"u1\", has name \"Ann\";\n$e2 (users: $n0, spaces: $n1);"
                    .to_string(),
            ),
        };
        let outcome = confirm(&batch);

        assert_eq!(outcome.inserted.get("n0").map(String::as_str), Some("u1"));
        assert_eq!(
            outcome.inserted.get("e2").map(String::as_str),
            Some("e2-gen")
        );
        // Variables in the match clause are not insert effects.
        assert!(outcome.inserted.get("n1").is_none());
    }

    #[test]
    fn test_delete_bodies_are_counted() {
        let batch = WriteBatch {
            delete: Some("match\n$n0 isa User;\ndelete\n$n0 isa User;".to_string()),
            insert: None,
        };
        assert_eq!(confirm(&batch).deleted, 1);
    }
}
