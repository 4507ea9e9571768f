//! bootcfg check/noobs/copy-to/copy-from command implementation

use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::transaction::{CommitOutcome, ConfigTransaction};

use super::value::push_commit_summary;

#[derive(Serialize)]
struct CheckReport {
    corrupt: bool,
    commit: CommitOutcome,
}

#[derive(Serialize)]
struct NoobsReport {
    removed: bool,
    reboot_required: bool,
    commit: CommitOutcome,
}

#[derive(Serialize)]
struct CopyReport<'a> {
    from: &'a Path,
    to: &'a Path,
    commit: CommitOutcome,
}

pub fn run_check(tx: &mut ConfigTransaction, output: OutputOptions) -> Result<()> {
    let corrupt = tx.check_corrupt_config()?;
    let commit = tx.commit()?;

    let mut human = HumanOutput::new("bootcfg check");
    human.push_summary("corrupt", corrupt.to_string());
    if corrupt {
        human.push_warning("config looked corrupt and was replaced with the default");
    }
    push_commit_summary(&mut human, &commit);

    emit_success(output, "check", &CheckReport { corrupt, commit }, Some(&human))
}

pub fn run_noobs(tx: &mut ConfigTransaction, output: OutputOptions) -> Result<()> {
    let removed = tx.remove_noobs_defaults()?;
    let commit = tx.commit()?;
    let reboot_required = removed && commit == CommitOutcome::Committed;

    let mut human = HumanOutput::new("bootcfg noobs");
    human.push_summary("removed", removed.to_string());
    if reboot_required {
        human.push_warning("reboot required for the change to take effect");
    }
    push_commit_summary(&mut human, &commit);

    let report = NoobsReport {
        removed,
        reboot_required,
        commit,
    };
    emit_success(output, "noobs", &report, Some(&human))
}

pub fn run_copy_to(tx: &mut ConfigTransaction, dest: &Path, output: OutputOptions) -> Result<()> {
    tx.copy_to(dest)?;
    let commit = tx.commit()?;

    let mut human = HumanOutput::new(format!("bootcfg copy-to: {}", dest.display()));
    human.push_summary("from", tx.path().display().to_string());

    let report = CopyReport {
        from: tx.path(),
        to: dest,
        commit,
    };
    emit_success(output, "copy-to", &report, Some(&human))
}

pub fn run_copy_from(tx: &mut ConfigTransaction, src: &Path, output: OutputOptions) -> Result<()> {
    tx.copy_from(src)?;
    let commit = tx.commit()?;

    let mut human = HumanOutput::new(format!("bootcfg copy-from: {}", src.display()));
    human.push_summary("to", tx.path().display().to_string());
    push_commit_summary(&mut human, &commit);

    let report = CopyReport {
        from: src,
        to: tx.path(),
        commit,
    };
    emit_success(output, "copy-from", &report, Some(&human))
}
