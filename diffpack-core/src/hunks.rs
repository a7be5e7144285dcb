//! Splits unified-diff text into structured hunks and classifies
//! line-ending-only and whitespace-only changes.

use tracing::debug;

use crate::models::Hunk;

/// Result of extracting one file's patch text.
#[derive(Debug, Default)]
pub struct Extraction {
    pub hunks: Vec<Hunk>,
    pub eol_only_change: bool,
    pub whitespace_only_change: bool,
    pub notes: Vec<String>,
}

/// Parses the unified diff for one file.
///
/// A hunk whose header numbers disagree with its body fails the file, not
/// the run: the extraction comes back with no hunks and a diagnostic note.
pub fn extract(path: &str, patch_text: &str) -> Extraction {
    let hunks = split_into_hunks(patch_text);
    debug!(path, hunks = hunks.len(), "extracted hunks");

    for hunk in &hunks {
        if !accounting_matches(hunk) {
            return Extraction {
                hunks: Vec::new(),
                eol_only_change: false,
                whitespace_only_change: false,
                notes: vec![format!("hunk accounting mismatch: {path}")],
            };
        }
    }

    let eol_only_change = detect_eol_only(&hunks);
    let whitespace_only_change = detect_whitespace_only(&hunks);

    Extraction {
        hunks,
        eol_only_change,
        whitespace_only_change,
        notes: Vec::new(),
    }
}

/// Splits on `\n` without discarding `\r`, which `str::lines` would strip;
/// carriage returns are significant for EOL classification.
fn split_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

fn split_into_hunks(patch_text: &str) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let mut current: Option<(String, HunkSpan, Vec<&str>)> = None;

    for line in split_lines(patch_text) {
        if let Some(span) = parse_hunk_header(line) {
            if let Some((header, span, body)) = current.take() {
                hunks.push(build_hunk(header, span, &body));
            }
            current = Some((line.to_string(), span, Vec::new()));
        } else if let Some((_, _, body)) = current.as_mut() {
            body.push(line);
        }
        // Lines before the first @@ are the file header; skipped.
    }

    if let Some((header, span, body)) = current.take() {
        hunks.push(build_hunk(header, span, &body));
    }

    hunks
}

#[derive(Debug, Clone, Copy)]
struct HunkSpan {
    old_start: u64,
    old_lines: u64,
    new_start: u64,
    new_lines: u64,
}

/// Accepts exactly `@@ -o[,ol] +n[,nl] @@`, with an optional trailing
/// section heading after the closing `@@`.
fn parse_hunk_header(line: &str) -> Option<HunkSpan> {
    let rest = line.strip_prefix("@@ -")?;
    let (old_part, rest) = rest.split_once(" +")?;
    let (new_part, _heading) = rest.split_once(" @@")?;
    let (old_start, old_lines) = parse_range(old_part)?;
    let (new_start, new_lines) = parse_range(new_part)?;
    Some(HunkSpan {
        old_start,
        old_lines,
        new_start,
        new_lines,
    })
}

/// `o,ol` or bare `o` (line count defaults to 1).
fn parse_range(text: &str) -> Option<(u64, u64)> {
    match text.split_once(',') {
        Some((start, lines)) => Some((start.parse().ok()?, lines.parse().ok()?)),
        None => Some((text.parse().ok()?, 1)),
    }
}

fn build_hunk(header: String, span: HunkSpan, body: &[&str]) -> Hunk {
    let mut added = 0;
    let mut deleted = 0;
    let mut patch = header.clone();

    for line in body {
        match line.as_bytes().first() {
            Some(b'+') => added += 1,
            Some(b'-') => deleted += 1,
            // Context lines and the `\ No newline at end of file` marker
            // are retained verbatim but counted elsewhere or not at all.
            _ => {}
        }
        patch.push('\n');
        patch.push_str(line);
    }

    Hunk {
        header,
        old_start: span.old_start,
        old_lines: span.old_lines,
        new_start: span.new_start,
        new_lines: span.new_lines,
        added,
        deleted,
        patch,
    }
}

/// Header numbers must match the body: `old_lines` = context + deleted,
/// `new_lines` = context + added.
fn accounting_matches(hunk: &Hunk) -> bool {
    let mut context = 0;
    for line in split_lines(&hunk.patch).into_iter().skip(1) {
        match line.as_bytes().first() {
            Some(b'+') | Some(b'-') | Some(b'\\') => {}
            _ => context += 1,
        }
    }
    hunk.old_lines == context + hunk.deleted && hunk.new_lines == context + hunk.added
}

/// Paired removed/added line contents of one hunk, sign stripped.
fn change_lines(hunk: &Hunk) -> (Vec<&str>, Vec<&str>) {
    let mut removed = Vec::new();
    let mut added = Vec::new();
    for line in split_lines(&hunk.patch).into_iter().skip(1) {
        match line.as_bytes().first() {
            Some(b'-') => removed.push(&line[1..]),
            Some(b'+') => added.push(&line[1..]),
            _ => {}
        }
    }
    (removed, added)
}

/// True when every change pairs up positionally and the only difference
/// within each pair is a trailing carriage return (CRLF vs LF).
fn detect_eol_only(hunks: &[Hunk]) -> bool {
    let mut any_pair = false;
    for hunk in hunks {
        let (removed, added) = change_lines(hunk);
        if removed.len() != added.len() {
            return false;
        }
        for (old, new) in removed.iter().copied().zip(added.iter().copied()) {
            any_pair = true;
            if old == new {
                // Identical text means the delta is something other than
                // a line-ending conversion (e.g. a final-newline change).
                return false;
            }
            let old_stem = old.strip_suffix('\r').unwrap_or(old);
            let new_stem = new.strip_suffix('\r').unwrap_or(new);
            if old_stem != new_stem {
                return false;
            }
        }
    }
    any_pair
}

/// True when every change pairs up positionally and each pair is equal
/// once all ASCII whitespace is removed.
fn detect_whitespace_only(hunks: &[Hunk]) -> bool {
    let mut any_pair = false;
    let mut any_difference = false;
    for hunk in hunks {
        let (removed, added) = change_lines(hunk);
        if removed.len() != added.len() {
            return false;
        }
        for (old, new) in removed.iter().copied().zip(added.iter().copied()) {
            any_pair = true;
            if strip_ascii_whitespace(old) != strip_ascii_whitespace(new) {
                return false;
            }
            if old != new {
                any_difference = true;
            }
        }
    }
    any_pair && any_difference
}

fn strip_ascii_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}
