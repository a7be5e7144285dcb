//! Byte-budget enforcement over extracted hunks.
//!
//! Runs after extraction for every file, so both the per-file and the
//! global pass see complete costs. Only diff bodies count against caps;
//! file metadata and provenance are free.

use tracing::debug;

use crate::config::DiffConfig;
use crate::models::{FileRecord, Hunk};
use crate::policy::PolicyTable;

#[derive(Debug)]
pub struct CapOutcome {
    pub files: Vec<FileRecord>,
    pub omitted_files_count: u64,
    pub notes: Vec<String>,
}

fn hunk_cost(hunk: &Hunk) -> u64 {
    hunk.patch.len() as u64
}

fn file_cost(hunks: &[Hunk]) -> u64 {
    hunks.iter().map(hunk_cost).sum()
}

/// Applies the per-file cap, lockfile summarization, and the global cap,
/// in that order. Files stay in the order discovery fixed; the global
/// walk is an order-dependent running sum.
pub fn apply_caps(
    mut files: Vec<FileRecord>,
    policies: &PolicyTable,
    config: &DiffConfig,
) -> CapOutcome {
    let mut notes = Vec::new();

    for file in &mut files {
        if file.hunks.is_empty() {
            continue;
        }
        if policies.matches(file.effective_path()) && file_cost(&file.hunks) > config.cap_file {
            debug!(path = file.effective_path(), "summarizing lockfile");
            file.summarized = true;
            file.hunks.clear();
            notes.push(format!("summarized lockfile: {}", file.effective_path()));
            continue;
        }
        apply_file_cap(file, config.cap_file);
    }

    let mut omitted_files_count = 0u64;
    let mut running = 0u64;
    for file in &mut files {
        if file.hunks.is_empty() {
            continue;
        }
        let cost = file_cost(&file.hunks);
        if running + cost <= config.cap_total {
            running += cost;
        } else {
            // Best-effort admission: keep walking, a later smaller file
            // may still fit under the remaining budget.
            debug!(path = file.effective_path(), cost, "dropping hunks over global cap");
            file.hunks.clear();
            omitted_files_count += 1;
        }
    }

    if omitted_files_count > 0 {
        notes.push(format!(
            "{omitted_files_count} files omitted due to global capacity limit"
        ));
    }

    CapOutcome {
        files,
        omitted_files_count,
        notes,
    }
}

/// Per-file admission with first/last-hunk preservation.
///
/// Hunks are admitted in order while they fit. On the first overflow the
/// file is truncated and the engine guarantees the first admitted hunk
/// stays; middle hunks are evicted from the back until the last extracted
/// hunk fits as well. A lone hunk larger than the cap is kept in full.
fn apply_file_cap(file: &mut FileRecord, cap_file: u64) {
    let total = file.hunks.len();
    let mut admitted: Vec<usize> = Vec::new();
    let mut running = 0u64;
    let mut overflowed = false;

    for (index, hunk) in file.hunks.iter().enumerate() {
        let cost = hunk_cost(hunk);
        if running + cost <= cap_file {
            admitted.push(index);
            running += cost;
        } else {
            overflowed = true;
            break;
        }
    }

    if !overflowed {
        return;
    }
    file.truncated = true;

    if admitted.is_empty() {
        // Even the first hunk alone exceeds the cap; keep it whole so the
        // file never loses its entire diff body.
        admitted.push(0);
        running = hunk_cost(&file.hunks[0]);
    }

    let last = total - 1;
    if admitted.last() != Some(&last) {
        let last_cost = hunk_cost(&file.hunks[last]);
        while admitted.len() > 1 && running + last_cost > cap_file {
            if let Some(evicted) = admitted.pop() {
                running -= hunk_cost(&file.hunks[evicted]);
            }
        }
        if running + last_cost <= cap_file {
            admitted.push(last);
        }
    }

    file.omitted_hunks_count = Some((total - admitted.len()) as u64);

    let mut kept = Vec::with_capacity(admitted.len());
    for (index, hunk) in file.hunks.drain(..).enumerate() {
        if admitted.contains(&index) {
            kept.push(hunk);
        }
    }
    file.hunks = kept;
}
