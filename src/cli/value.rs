//! bootcfg get/set/unset command implementation

use serde::Serialize;

use crate::accessor::Lookup;
use crate::document::Filter;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::transaction::{CommitOutcome, ConfigTransaction};

/// Options for `bootcfg get`
pub struct GetOptions {
    pub name: String,
    pub filter: Filter,
    pub fallback: bool,
    pub ignore_comments: bool,
}

#[derive(Serialize)]
struct GetReport<'a> {
    name: &'a str,
    section: String,
    lookup: Lookup,
}

#[derive(Serialize)]
struct SetReport<'a> {
    name: &'a str,
    value: Option<&'a str>,
    section: String,
    commit: CommitOutcome,
}

pub fn run_get(tx: &mut ConfigTransaction, options: GetOptions, output: OutputOptions) -> Result<()> {
    let lookup = tx.get_config_value(
        &options.name,
        &options.filter,
        options.fallback,
        options.ignore_comments,
    )?;
    tx.commit()?;

    let mut human = HumanOutput::new(format!("bootcfg get: {}", options.name));
    match &lookup {
        Lookup::Found(value) => human.push_summary("value", value.as_str()),
        Lookup::Missing => human.push_summary("value", "<not set>"),
        Lookup::NoContent => human.push_warning(format!("{} has no content", tx.path().display())),
    }

    let report = GetReport {
        name: &options.name,
        section: options.filter.to_string(),
        lookup,
    };
    emit_success(output, "get", &report, Some(&human))
}

pub fn run_set(
    tx: &mut ConfigTransaction,
    name: &str,
    value: Option<&str>,
    filter: &Filter,
    output: OutputOptions,
) -> Result<()> {
    tx.set_config_value(name, value, filter)?;
    let commit = tx.commit()?;

    let command = if value.is_some() { "set" } else { "unset" };
    let mut human = HumanOutput::new(format!("bootcfg {command}: {name}"));
    human.push_summary("value", value.unwrap_or("<disabled>"));
    push_commit_summary(&mut human, &commit);

    let report = SetReport {
        name,
        value,
        section: filter.to_string(),
        commit,
    };
    emit_success(output, command, &report, Some(&human))
}

/// Describe how the transaction ended
pub(super) fn push_commit_summary(human: &mut HumanOutput, commit: &CommitOutcome) {
    match commit {
        CommitOutcome::Committed => human.push_summary("commit", "written"),
        CommitOutcome::NoChanges => human.push_summary("commit", "no changes"),
        CommitOutcome::DryRun(staged) => {
            human.push_summary("commit", format!("dry run, staged at {}", staged.display()));
            human.push_warning("dry run: the target was not modified");
        }
    }
}
