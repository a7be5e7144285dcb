//! Turns raw name-status records into ordered file change records.
//!
//! Discovery fixes the output order of the whole payload: a stable sort
//! by (effective path, status letter) that nothing downstream recomputes.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::DiffConfig;
use crate::error::{DiffError, Result};
use crate::git::{GitDriver, RawChange, TreeEntry, GITLINK_MODE};
use crate::models::{ChangeStatus, FileRecord, RenameTiebreaker, SubmoduleRef};

pub fn discover(driver: &GitDriver, config: &DiffConfig) -> Result<Vec<FileRecord>> {
    let raw = driver.name_status()?;
    let raw = downgrade_low_scores(raw, config.find_renames_threshold);

    let mut records = Vec::with_capacity(raw.len());
    for change in raw {
        records.push(enrich(driver, change)?);
    }

    resolve_rename_ties(&mut records);
    sort_records(&mut records);
    debug!(files = records.len(), "discovered change set");
    Ok(records)
}

/// Renames and copies scored below the configured threshold are never
/// emitted as R/C; they fall apart into the plain statuses Git would
/// have reported without rename detection.
fn downgrade_low_scores(raw: Vec<RawChange>, threshold: u8) -> Vec<RawChange> {
    let mut out = Vec::with_capacity(raw.len());
    for change in raw {
        let below = matches!(change.status, 'R' | 'C')
            && change.score.map_or(false, |score| score < threshold);
        if !below {
            out.push(change);
            continue;
        }
        if change.status == 'R' {
            out.push(RawChange {
                status: 'D',
                score: None,
                path_a: change.path_a,
                path_b: None,
            });
        }
        if let Some(path_b) = change.path_b {
            out.push(RawChange {
                status: 'A',
                score: None,
                path_a: path_b,
                path_b: None,
            });
        }
    }
    out
}

fn enrich(driver: &GitDriver, change: RawChange) -> Result<FileRecord> {
    let status = ChangeStatus::from_letter(change.status).ok_or_else(|| {
        DiffError::Internal(format!("unexpected status letter {:?}", change.status))
    })?;

    let (path_old, path_new) = match status {
        ChangeStatus::Added => (None, Some(change.path_a)),
        ChangeStatus::Deleted => (Some(change.path_a), None),
        ChangeStatus::Modified | ChangeStatus::TypeChanged => {
            (Some(change.path_a.clone()), Some(change.path_a))
        }
        ChangeStatus::Renamed | ChangeStatus::Copied => {
            let path_b = change.path_b.ok_or_else(|| {
                DiffError::Internal(format!(
                    "rename record for {} is missing its target path",
                    change.path_a
                ))
            })?;
            (Some(change.path_a), Some(path_b))
        }
    };

    let entry_old = match &path_old {
        Some(path) => driver.tree_entry(driver.good(), path)?,
        None => None,
    };
    let entry_new = match &path_new {
        Some(path) => driver.tree_entry(driver.candidate(), path)?,
        None => None,
    };

    let is_submodule = is_gitlink(entry_old.as_ref()) || is_gitlink(entry_new.as_ref());
    let submodule = if is_submodule {
        Some(SubmoduleRef {
            old_sha: entry_old.as_ref().map(|e| e.oid.clone()),
            new_sha: entry_new.as_ref().map(|e| e.oid.clone()),
        })
    } else {
        None
    };

    let effective = path_new.as_deref().or(path_old.as_deref()).unwrap_or("");
    let is_binary = if is_submodule {
        false
    } else {
        driver.is_binary(effective)?
    };

    Ok(FileRecord {
        status,
        rename_score: change.score,
        rename_tiebreaker: None,
        mode_old: entry_old.as_ref().map(|e| e.mode.clone()),
        mode_new: entry_new.as_ref().map(|e| e.mode.clone()),
        size_old: entry_old.as_ref().and_then(|e| e.size),
        size_new: entry_new.as_ref().and_then(|e| e.size),
        path_old,
        path_new,
        is_binary,
        is_submodule,
        eol_only_change: false,
        whitespace_only_change: false,
        summarized: false,
        truncated: false,
        omitted_hunks_count: None,
        submodule,
        hunks: Vec::new(),
    })
}

fn is_gitlink(entry: Option<&TreeEntry>) -> bool {
    entry.map_or(false, |e| {
        e.mode == GITLINK_MODE || e.object_type == "commit"
    })
}

/// When several sources claim the same rename target with scores within
/// one percentage point of the best, exactly one wins. The rules run in
/// order: path similarity, then size delta, then lexicographically
/// smallest old path. Losing rename sources become plain deletions;
/// losing copy sources keep their status, since the source file exists.
pub(crate) fn resolve_rename_ties(records: &mut [FileRecord]) {
    let mut by_target: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        let scored_rename = matches!(
            record.status,
            ChangeStatus::Renamed | ChangeStatus::Copied
        ) && record.rename_score.is_some();
        if scored_rename {
            if let Some(target) = &record.path_new {
                by_target.entry(target.clone()).or_default().push(index);
            }
        }
    }

    let mut demoted = Vec::new();
    for (target, members) in by_target {
        if members.len() < 2 {
            continue;
        }
        let best = members
            .iter()
            .filter_map(|&i| records[i].rename_score)
            .max()
            .unwrap_or(0);
        let near: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&i| {
                records[i]
                    .rename_score
                    .map_or(false, |score| best.saturating_sub(score) <= 1)
            })
            .collect();

        let (winner, rule) = if near.len() < 2 {
            (near.first().copied().unwrap_or(members[0]), None)
        } else {
            let (winner, rule) = pick_winner(records, &near);
            (winner, Some(rule))
        };

        debug!(target = %target, winner, "resolved rename candidates");
        records[winner].rename_tiebreaker = rule;
        for &index in &members {
            if index != winner {
                demoted.push(index);
            }
        }
    }

    for index in demoted {
        demote_loser(&mut records[index]);
    }
}

fn pick_winner(records: &[FileRecord], near: &[usize]) -> (usize, RenameTiebreaker) {
    let distances: Vec<u64> = near
        .iter()
        .map(|&i| {
            path_distance(
                records[i].path_old.as_deref().unwrap_or(""),
                records[i].path_new.as_deref().unwrap_or(""),
            )
        })
        .collect();
    if let Some(winner) = unique_minimum(near, &distances) {
        return (winner, RenameTiebreaker::Path);
    }

    let min_distance = distances.iter().copied().min().unwrap_or(0);
    let contenders: Vec<usize> = near
        .iter()
        .zip(&distances)
        .filter(|(_, &d)| d == min_distance)
        .map(|(&i, _)| i)
        .collect();

    let gaps: Vec<u64> = contenders
        .iter()
        .map(|&i| {
            let old = records[i].size_old.unwrap_or(0);
            let new = records[i].size_new.unwrap_or(0);
            old.abs_diff(new)
        })
        .collect();
    if let Some(winner) = unique_minimum(&contenders, &gaps) {
        return (winner, RenameTiebreaker::Size);
    }

    let min_gap = gaps.iter().copied().min().unwrap_or(0);
    let winner = contenders
        .iter()
        .zip(&gaps)
        .filter(|(_, &g)| g == min_gap)
        .map(|(&i, _)| i)
        .min_by(|&a, &b| {
            records[a]
                .path_old
                .cmp(&records[b].path_old)
                .then(a.cmp(&b))
        })
        .unwrap_or(contenders[0]);
    (winner, RenameTiebreaker::Lex)
}

/// Index whose key is the strict minimum, or None on a tie.
fn unique_minimum(indices: &[usize], keys: &[u64]) -> Option<usize> {
    let min = keys.iter().copied().min()?;
    let mut winners = indices.iter().zip(keys).filter(|(_, &k)| k == min);
    let (&winner, _) = winners.next()?;
    if winners.next().is_some() {
        None
    } else {
        Some(winner)
    }
}

/// Edit distance over `/`-separated path components.
fn path_distance(a: &str, b: &str) -> u64 {
    let xs: Vec<&str> = a.split('/').collect();
    let ys: Vec<&str> = b.split('/').collect();

    let mut prev: Vec<u64> = (0..=ys.len() as u64).collect();
    let mut row = vec![0u64; ys.len() + 1];
    for (i, x) in xs.iter().enumerate() {
        row[0] = i as u64 + 1;
        for (j, y) in ys.iter().enumerate() {
            let substitution = prev[j] + u64::from(x != y);
            row[j + 1] = substitution.min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[ys.len()]
}

/// A losing rename source is gone, so it falls back to a deletion. A
/// losing copy source still exists untouched, so it only sheds its
/// rename bookkeeping.
fn demote_loser(record: &mut FileRecord) {
    record.rename_score = None;
    record.rename_tiebreaker = None;
    if record.status == ChangeStatus::Renamed {
        record.status = ChangeStatus::Deleted;
        record.path_new = None;
        record.mode_new = None;
        record.size_new = None;
    }
}

/// Stable sort by effective path, then status letter (`A < C < D < M < R < T`).
pub(crate) fn sort_records(records: &mut [FileRecord]) {
    records.sort_by(|a, b| {
        a.effective_path()
            .cmp(b.effective_path())
            .then_with(|| a.status.as_str().cmp(b.status.as_str()))
    });
}
