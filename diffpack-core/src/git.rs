//! Subprocess driver for the Git CLI.
//!
//! Every invocation runs under a locked environment so output bytes are
//! reproducible across platforms and locales: `LC_ALL=C`, color off,
//! CRLF conversion off, global and system config masked out. The
//! process-global environment is never mutated.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use crate::config::DiffConfig;
use crate::error::{DiffError, Result, REQUIRED_GIT_VERSION};

const MIN_GIT_MAJOR: u32 = 2;
const MIN_GIT_MINOR: u32 = 30;

/// Transport deadline for clone and fetch; each gets exactly one retry.
const NETWORK_TIMEOUT: Duration = Duration::from_secs(300);

/// Tree entry mode marking a gitlink.
pub const GITLINK_MODE: &str = "160000";

#[cfg(windows)]
const NULL_DEVICE: &str = "NUL";
#[cfg(not(windows))]
const NULL_DEVICE: &str = "/dev/null";

/// One entry of `git diff --name-status` output, unvalidated beyond the
/// status letter.
#[derive(Debug, Clone)]
pub struct RawChange {
    pub status: char,
    pub score: Option<u8>,
    pub path_a: String,
    pub path_b: Option<String>,
}

/// One `ls-tree -l` row for a path at a commit.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub mode: String,
    pub object_type: String,
    pub oid: String,
    pub size: Option<u64>,
}

enum NetworkResult {
    Completed { status: ExitStatus, stderr: String },
    TimedOut,
}

/// Detects the Git CLI version, failing below the supported minimum.
pub fn detect_version() -> Result<String> {
    let output = Command::new("git")
        .arg("--version")
        .output()
        .map_err(|_| unsupported("unavailable"))?;
    if !output.status.success() {
        return Err(unsupported("unavailable"));
    }

    let line = String::from_utf8_lossy(&output.stdout);
    let version = parse_version_line(&line).ok_or_else(|| unsupported("unknown"))?;
    if !version_supported(&version) {
        return Err(unsupported(&version));
    }
    Ok(version)
}

fn unsupported(detected: &str) -> DiffError {
    DiffError::GitVersionUnsupported {
        detected: detected.to_string(),
        required: REQUIRED_GIT_VERSION.to_string(),
    }
}

/// Extracts `X.Y[.Z]` from a `git version X.Y.Z[.suffix]` line.
fn parse_version_line(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix("git version ")?;
    let version: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let version = version.trim_end_matches('.').to_string();
    if version.split('.').take(2).all(|p| p.parse::<u32>().is_ok())
        && version.contains('.')
    {
        Some(version)
    } else {
        None
    }
}

fn version_supported(version: &str) -> bool {
    let mut parts = version.split('.');
    let major: u32 = match parts.next().and_then(|p| p.parse().ok()) {
        Some(n) => n,
        None => return false,
    };
    let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    major > MIN_GIT_MAJOR || (major == MIN_GIT_MAJOR && minor >= MIN_GIT_MINOR)
}

/// Parses one tab-separated name-status line. Unknown status letters are
/// rejected here rather than leaking downstream.
pub(crate) fn parse_name_status_line(line: &str) -> Result<Option<RawChange>> {
    let mut parts = line.split('\t');
    let status_part = match parts.next() {
        Some(p) if !p.is_empty() => p,
        _ => return Ok(None),
    };
    let status = match status_part.chars().next() {
        Some(c) => c,
        None => return Ok(None),
    };
    if !matches!(status, 'A' | 'C' | 'D' | 'M' | 'R' | 'T') {
        return Err(DiffError::Internal(format!(
            "unexpected status letter {status:?} in git name-status output"
        )));
    }

    let score: Option<u8> = status_part[1..].parse().ok();
    let path_a = match parts.next() {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => return Ok(None),
    };
    let path_b = parts.next().filter(|p| !p.is_empty()).map(str::to_string);

    Ok(Some(RawChange {
        status,
        score,
        path_a,
        path_b,
    }))
}

/// Injects `GIT_USERNAME` / `GIT_AUTH_TOKEN` as userinfo on http(s) URLs
/// for the clone only; the credentials never reach the payload.
fn authenticated_url(repo_url: &str) -> String {
    let (Ok(username), Ok(token)) = (
        std::env::var("GIT_USERNAME"),
        std::env::var("GIT_AUTH_TOKEN"),
    ) else {
        return repo_url.to_string();
    };
    for scheme in ["https://", "http://"] {
        if let Some(rest) = repo_url.strip_prefix(scheme) {
            if !rest.contains('@') {
                return format!("{scheme}{username}:{token}@{rest}");
            }
        }
    }
    repo_url.to_string()
}

/// A cloned repository in an ephemeral workspace, with both commits
/// guaranteed present and resolved to full SHAs.
pub struct GitDriver {
    workdir: PathBuf,
    tmp: Option<TempDir>,
    repo_url: String,
    branch_name: Option<String>,
    context_lines: u32,
    find_renames_threshold: u8,
    keep_workdir: bool,
    keep_on_error: bool,
    resolved_good: String,
    resolved_candidate: String,
}

impl GitDriver {
    /// Clones the repository into a fresh directory and ensures both
    /// commits are reachable, fetching them explicitly if needed.
    pub fn ensure_workspace(config: &DiffConfig) -> Result<Self> {
        let tmp = tempfile::Builder::new()
            .prefix("diffpack_")
            .tempdir()
            .map_err(|e| DiffError::Internal(format!("failed to create workspace: {e}")))?;

        let mut driver = GitDriver {
            workdir: tmp.path().to_path_buf(),
            tmp: Some(tmp),
            repo_url: config.repo_url.clone(),
            branch_name: config.branch_name.clone(),
            context_lines: config.context_lines,
            find_renames_threshold: config.find_renames_threshold,
            keep_workdir: config.keep_workdir,
            keep_on_error: config.keep_on_error,
            resolved_good: String::new(),
            resolved_candidate: String::new(),
        };
        driver.clone_repo()?;
        driver.ensure_commits(&config.commit_good, &config.commit_candidate)?;
        Ok(driver)
    }

    /// Full SHA of the baseline commit.
    pub fn good(&self) -> &str {
        &self.resolved_good
    }

    /// Full SHA of the candidate commit.
    pub fn candidate(&self) -> &str {
        &self.resolved_candidate
    }

    fn range(&self) -> String {
        format!("{}..{}", self.resolved_good, self.resolved_candidate)
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-c")
            .arg("core.autocrlf=false")
            .arg("-c")
            .arg("color.ui=false")
            .current_dir(&self.workdir)
            .env("LC_ALL", "C")
            .env("GIT_CONFIG_GLOBAL", NULL_DEVICE)
            .env("GIT_CONFIG_SYSTEM", NULL_DEVICE)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ASKPASS", "echo")
            .env("SSH_ASKPASS", "echo")
            .env("GCM_INTERACTIVE", "never");
        cmd
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(?args, "running git");
        let mut cmd = self.base_command();
        cmd.args(args);
        cmd.output().map_err(|e| {
            DiffError::Internal(format!(
                "failed to run git {}: {e}",
                args.first().copied().unwrap_or("")
            ))
        })
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(DiffError::Internal(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or(""),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    /// Runs a network-bound git command under the transport deadline.
    fn run_with_deadline(&self, args: &[&str]) -> Result<NetworkResult> {
        debug!(?args, "running git (network)");
        let mut child = self
            .base_command()
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DiffError::Internal(format!("failed to spawn git: {e}")))?;

        match child
            .wait_timeout(NETWORK_TIMEOUT)
            .map_err(|e| DiffError::Internal(format!("failed to wait for git: {e}")))?
        {
            Some(status) => {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                Ok(NetworkResult::Completed { status, stderr })
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Ok(NetworkResult::TimedOut)
            }
        }
    }

    fn clone_repo(&self) -> Result<()> {
        let url = authenticated_url(&self.repo_url);
        let mut args = vec![
            "clone".to_string(),
            "--no-checkout".to_string(),
            "--filter=blob:none".to_string(),
        ];
        if let Some(branch) = &self.branch_name {
            args.push("--branch".to_string());
            args.push(branch.clone());
        }
        args.push(url);
        args.push(".".to_string());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        for attempt in 0..2 {
            match self.run_with_deadline(&args)? {
                NetworkResult::Completed { status, stderr } => {
                    if status.success() {
                        return Ok(());
                    }
                    return Err(DiffError::CloneFailed {
                        repo_url: self.repo_url.clone(),
                        reason: stderr.trim().to_string(),
                    });
                }
                NetworkResult::TimedOut => {
                    warn!(attempt, "git clone timed out");
                    self.reset_workdir()?;
                }
            }
        }
        Err(DiffError::NetworkTimeout {
            operation: "clone".to_string(),
            timeout_seconds: NETWORK_TIMEOUT.as_secs(),
        })
    }

    /// Clears a partial clone so the retry starts from an empty target.
    fn reset_workdir(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.workdir)? {
            let path = entry?.path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn ensure_commits(&mut self, good: &str, candidate: &str) -> Result<()> {
        let mut resolved_good = self.resolve_commit(good)?;
        let mut resolved_candidate = self.resolve_commit(candidate)?;

        if resolved_good.is_none() || resolved_candidate.is_none() {
            let mut wanted = Vec::new();
            if resolved_good.is_none() {
                wanted.push(good.to_string());
            }
            if resolved_candidate.is_none() {
                wanted.push(candidate.to_string());
            }
            self.fetch_commits(&wanted)?;

            resolved_good = self.resolve_commit(good)?;
            resolved_candidate = self.resolve_commit(candidate)?;

            let mut still_missing = Vec::new();
            if resolved_good.is_none() {
                still_missing.push(good.to_string());
            }
            if resolved_candidate.is_none() {
                still_missing.push(candidate.to_string());
            }
            if !still_missing.is_empty() {
                return Err(DiffError::CommitNotFound {
                    missing: still_missing,
                    repo_url: self.repo_url.clone(),
                });
            }
        }

        // Both resolved at this point; the guards above returned otherwise.
        self.resolved_good = resolved_good.unwrap_or_default();
        self.resolved_candidate = resolved_candidate.unwrap_or_default();
        Ok(())
    }

    fn fetch_commits(&self, shas: &[String]) -> Result<()> {
        let mut args = vec!["fetch", "origin"];
        args.extend(shas.iter().map(String::as_str));

        for attempt in 0..2 {
            match self.run_with_deadline(&args)? {
                NetworkResult::Completed { status, stderr } => {
                    if !status.success() {
                        // The missing-commit re-check reports the outcome.
                        debug!(stderr = stderr.trim(), "git fetch failed");
                    }
                    return Ok(());
                }
                NetworkResult::TimedOut => warn!(attempt, "git fetch timed out"),
            }
        }
        Err(DiffError::NetworkTimeout {
            operation: "fetch".to_string(),
            timeout_seconds: NETWORK_TIMEOUT.as_secs(),
        })
    }

    /// Resolves a possibly-abbreviated SHA to a full commit id.
    fn resolve_commit(&self, sha: &str) -> Result<Option<String>> {
        let spec = format!("{sha}^{{commit}}");
        let output = self.run(&["rev-parse", "--verify", "--quiet", &spec])?;
        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            Ok(None)
        }
    }

    /// Ordered raw change records between the two commits.
    pub fn name_status(&self) -> Result<Vec<RawChange>> {
        let renames = format!("--find-renames={}%", self.find_renames_threshold);
        let range = self.range();
        let output = self.run_checked(&[
            "diff",
            "--name-status",
            &renames,
            "--diff-algorithm=myers",
            "--no-color",
            &range,
        ])?;

        let text = String::from_utf8_lossy(&output.stdout);
        let mut changes = Vec::new();
        for line in text.lines() {
            if let Some(change) = parse_name_status_line(line)? {
                changes.push(change);
            }
        }
        debug!(changes = changes.len(), "listed name-status records");
        Ok(changes)
    }

    /// Mode, object type, object id, and blob size for a path at a commit.
    pub fn tree_entry(&self, commit: &str, path: &str) -> Result<Option<TreeEntry>> {
        let output = self.run(&["ls-tree", "-l", commit, "--", path])?;
        if !output.status.success() {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let line = match text.lines().next() {
            Some(line) if !line.is_empty() => line,
            _ => return Ok(None),
        };

        // "<mode> <type> <object> <size>\t<path>"; size is "-" for gitlinks.
        let meta = line.split('\t').next().unwrap_or("");
        let mut fields = meta.split_whitespace();
        let (mode, object_type, oid) = match (fields.next(), fields.next(), fields.next()) {
            (Some(mode), Some(object_type), Some(oid)) => (mode, object_type, oid),
            _ => return Ok(None),
        };
        let size = fields.next().and_then(|s| s.parse().ok());

        Ok(Some(TreeEntry {
            mode: mode.to_string(),
            object_type: object_type.to_string(),
            oid: oid.to_string(),
            size,
        }))
    }

    /// Binary according to Git's own numstat classification.
    pub fn is_binary(&self, path: &str) -> Result<bool> {
        let range = self.range();
        let output = self.run(&["diff", "--numstat", "--no-color", &range, "--", path])?;
        if !output.status.success() {
            return Ok(false);
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text
            .lines()
            .next()
            .map_or(false, |line| line.starts_with("-\t-\t")))
    }

    /// Unified patch text for one file; empty when content is unchanged.
    ///
    /// Invalid byte sequences are replaced with U+FFFD here, at the only
    /// point where patch bytes enter the pipeline.
    pub fn unified_patch(&self, path_old: Option<&str>, path_new: Option<&str>) -> Result<String> {
        let unified = format!("--unified={}", self.context_lines);
        let renames = format!("--find-renames={}%", self.find_renames_threshold);
        let range = self.range();
        let mut args = vec![
            "diff",
            unified.as_str(),
            "--diff-algorithm=myers",
            "--no-color",
            "--no-prefix",
            renames.as_str(),
            range.as_str(),
            "--",
        ];
        if let Some(path) = path_old {
            args.push(path);
        }
        if let Some(path) = path_new {
            if Some(path) != path_old {
                args.push(path);
            }
        }

        let output = self.run(&args)?;
        if !output.status.success() {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "git diff returned non-zero for patch"
            );
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// The workspace path, exposed for diagnostics.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Releases the workspace after a successful run.
    pub fn finish(mut self) {
        if let Some(tmp) = self.tmp.take() {
            if self.keep_workdir {
                let path = tmp.into_path();
                info!(path = %path.display(), "workspace kept");
            }
        }
    }
}

impl Drop for GitDriver {
    /// Runs only when `finish` was not reached, i.e. on a failed run.
    fn drop(&mut self) {
        if let Some(tmp) = self.tmp.take() {
            if self.keep_on_error || self.keep_workdir {
                let path = tmp.into_path();
                warn!(path = %path.display(), "workspace kept after failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_line_parses() {
        assert_eq!(
            parse_version_line("git version 2.39.5").as_deref(),
            Some("2.39.5")
        );
        assert_eq!(
            parse_version_line("git version 2.39.5 (Apple Git-154)").as_deref(),
            Some("2.39.5")
        );
        assert_eq!(parse_version_line("git version 2.30").as_deref(), Some("2.30"));
        assert!(parse_version_line("not git").is_none());
    }

    #[test]
    fn version_floor_is_enforced() {
        assert!(version_supported("2.30.0"));
        assert!(version_supported("2.45.1"));
        assert!(version_supported("3.0"));
        assert!(!version_supported("2.29.2"));
        assert!(!version_supported("1.9"));
    }

    #[test]
    fn name_status_lines_parse() {
        let change = parse_name_status_line("M\tsrc/lib.rs").unwrap().unwrap();
        assert_eq!(change.status, 'M');
        assert_eq!(change.score, None);
        assert_eq!(change.path_a, "src/lib.rs");
        assert_eq!(change.path_b, None);

        let change = parse_name_status_line("R090\told.rs\tnew.rs")
            .unwrap()
            .unwrap();
        assert_eq!(change.status, 'R');
        assert_eq!(change.score, Some(90));
        assert_eq!(change.path_a, "old.rs");
        assert_eq!(change.path_b.as_deref(), Some("new.rs"));

        assert!(parse_name_status_line("").unwrap().is_none());
    }

    #[test]
    fn unknown_status_letter_is_a_driver_error() {
        let err = parse_name_status_line("X\tweird.bin").unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn credentials_only_apply_to_clean_http_urls() {
        // Credential env vars are unset in the test environment, so the
        // URL passes through untouched.
        assert_eq!(
            authenticated_url("https://example.com/repo.git"),
            "https://example.com/repo.git"
        );
        assert_eq!(authenticated_url("/srv/repo.git"), "/srv/repo.git");
    }
}
