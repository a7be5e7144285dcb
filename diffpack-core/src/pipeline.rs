//! The run orchestration: discovery, extraction, capping, serialization.
//!
//! `run` is a pure function of its configuration plus repository state;
//! for identical inputs it emits identical bytes. Errors are translated
//! into the failure envelope at this boundary, never half-emitted.

use serde_json::Value;
use tracing::{debug, info};

use crate::caps::apply_caps;
use crate::config::DiffConfig;
use crate::discover::discover;
use crate::error::Result;
use crate::git::{self, GitDriver};
use crate::hunks;
use crate::models::{Envelope, Payload};
use crate::policy::PolicyTable;
use crate::serialize;

/// Executes one diff run and wraps the outcome in an envelope.
pub fn run(config: &DiffConfig) -> Envelope {
    match run_inner(config) {
        Ok(payload) => Envelope::success(payload),
        Err(err) => {
            info!(code = err.code(), "diff run failed: {err}");
            Envelope::failure(&err)
        }
    }
}

fn run_inner(config: &DiffConfig) -> Result<Value> {
    config.validate()?;
    let git_version = git::detect_version()?;
    let driver = GitDriver::ensure_workspace(config)?;
    debug!(workdir = %driver.workdir().display(), "workspace ready");

    let mut records = discover(&driver, config)?;

    let mut notes = Vec::new();
    for record in &mut records {
        if record.is_binary || record.is_submodule {
            continue;
        }
        let patch = driver.unified_patch(record.path_old.as_deref(), record.path_new.as_deref())?;
        if patch.is_empty() {
            continue;
        }
        let extraction = hunks::extract(record.effective_path(), &patch);
        record.hunks = extraction.hunks;
        record.eol_only_change = extraction.eol_only_change;
        record.whitespace_only_change = extraction.whitespace_only_change;
        notes.extend(extraction.notes);
    }

    let outcome = apply_caps(records, &PolicyTable::default(), config);
    notes.extend(outcome.notes);

    let payload = Payload {
        provenance: config.provenance(&git_version),
        files: outcome.files,
        omitted_files_count: outcome.omitted_files_count,
        notes,
    };
    let value = serialize::finalize(payload)?;

    driver.finish();
    Ok(value)
}
