//! bootcfg comment command implementation
//!
//! Annotations are `### name: value` lines kept at the top of the file.

use serde::Serialize;

use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::transaction::{CommitOutcome, ConfigTransaction};

use super::value::push_commit_summary;

#[derive(Serialize)]
struct CommentReport<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a str>,
    present: bool,
}

#[derive(Serialize)]
struct CommentSetReport<'a> {
    name: &'a str,
    value: &'a str,
    commit: CommitOutcome,
}

pub fn run_get(tx: &mut ConfigTransaction, name: &str, value: &str, output: OutputOptions) -> Result<()> {
    let present = tx.get_config_comment(name, value)?;
    tx.commit()?;

    let mut human = HumanOutput::new(format!("bootcfg comment get: {name}"));
    human.push_summary("present", present.to_string());

    let report = CommentReport {
        name,
        value: Some(value),
        present,
    };
    emit_success(output, "comment get", &report, Some(&human))
}

pub fn run_has(tx: &mut ConfigTransaction, name: &str, output: OutputOptions) -> Result<()> {
    let present = tx.has_config_comment(name)?;
    tx.commit()?;

    let mut human = HumanOutput::new(format!("bootcfg comment has: {name}"));
    human.push_summary("present", present.to_string());

    let report = CommentReport {
        name,
        value: None,
        present,
    };
    emit_success(output, "comment has", &report, Some(&human))
}

pub fn run_set(tx: &mut ConfigTransaction, name: &str, value: &str, output: OutputOptions) -> Result<()> {
    tx.set_config_comment(name, value)?;
    let commit = tx.commit()?;

    let mut human = HumanOutput::new(format!("bootcfg comment set: {name}"));
    human.push_summary("value", value);
    push_commit_summary(&mut human, &commit);

    let report = CommentSetReport {
        name,
        value,
        commit,
    };
    emit_success(output, "comment set", &report, Some(&human))
}
