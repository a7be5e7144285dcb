use serde::{Deserialize, Serialize};

use crate::error::{DiffError, Result};
use crate::models::{CapSettings, EnvLocks, Provenance, RenameDetection};

pub const DEFAULT_CAP_TOTAL: u64 = 800_000;
pub const DEFAULT_CAP_FILE: u64 = 64_000;
pub const DEFAULT_CONTEXT_LINES: u32 = 3;
pub const DEFAULT_FIND_RENAMES_THRESHOLD: u8 = 90;

/// The only diff algorithm the pipeline ever requests from Git.
pub const DIFF_ALGORITHM: &str = "myers";

/// Immutable configuration for one diff run.
///
/// Doubles as the request body of the HTTP surface; optional fields fall
/// back to the documented defaults during deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    pub repo_url: String,
    pub commit_good: String,
    pub commit_candidate: String,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default = "default_cap_total")]
    pub cap_total: u64,
    #[serde(default = "default_cap_file")]
    pub cap_file: u64,
    #[serde(default = "default_context_lines")]
    pub context_lines: u32,
    #[serde(default = "default_find_renames_threshold")]
    pub find_renames_threshold: u8,
    #[serde(default)]
    pub keep_workdir: bool,
    #[serde(default)]
    pub keep_on_error: bool,
}

fn default_cap_total() -> u64 {
    DEFAULT_CAP_TOTAL
}

fn default_cap_file() -> u64 {
    DEFAULT_CAP_FILE
}

fn default_context_lines() -> u32 {
    DEFAULT_CONTEXT_LINES
}

fn default_find_renames_threshold() -> u8 {
    DEFAULT_FIND_RENAMES_THRESHOLD
}

impl DiffConfig {
    pub fn new(
        repo_url: impl Into<String>,
        commit_good: impl Into<String>,
        commit_candidate: impl Into<String>,
    ) -> Self {
        Self {
            repo_url: repo_url.into(),
            commit_good: commit_good.into(),
            commit_candidate: commit_candidate.into(),
            branch_name: None,
            cap_total: DEFAULT_CAP_TOTAL,
            cap_file: DEFAULT_CAP_FILE,
            context_lines: DEFAULT_CONTEXT_LINES,
            find_renames_threshold: DEFAULT_FIND_RENAMES_THRESHOLD,
            keep_workdir: false,
            keep_on_error: false,
        }
    }

    /// Checks the cap invariants before any Git work happens.
    ///
    /// `cap_total >= cap_file >= 0` and the rename threshold in `[0, 100]`.
    pub fn validate(&self) -> Result<()> {
        if self.cap_file > self.cap_total {
            return Err(DiffError::CapsInvalid {
                reason: "cap_file cannot exceed cap_total".to_string(),
            });
        }
        if self.find_renames_threshold > 100 {
            return Err(DiffError::CapsInvalid {
                reason: "find_renames_threshold must be between 0 and 100".to_string(),
            });
        }
        Ok(())
    }

    /// Projects the configuration into the payload's provenance block.
    ///
    /// The checksum starts blank; the serializer fills it in last.
    pub fn provenance(&self, git_version: &str) -> Provenance {
        Provenance {
            repo_url: self.repo_url.clone(),
            commit_good: self.commit_good.clone(),
            commit_candidate: self.commit_candidate.clone(),
            branch_name: self.branch_name.clone(),
            caps: CapSettings {
                total_bytes: self.cap_total,
                per_file_bytes: self.cap_file,
                context_lines: self.context_lines,
            },
            rename_detection: RenameDetection {
                enabled: true,
                threshold_pct: self.find_renames_threshold,
            },
            diff_algorithm: DIFF_ALGORITHM.to_string(),
            env_locks: EnvLocks::default(),
            git_version: git_version.to_string(),
            checksum: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DiffConfig::new("https://example.com/repo.git", "abc", "def");
        assert_eq!(config.cap_total, 800_000);
        assert_eq!(config.cap_file, 64_000);
        assert_eq!(config.context_lines, 3);
        assert_eq!(config.find_renames_threshold, 90);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cap_file_above_cap_total_is_rejected() {
        let mut config = DiffConfig::new("repo", "a", "b");
        config.cap_total = 1_000;
        config.cap_file = 2_000;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "CAPS_INVALID");
    }

    #[test]
    fn threshold_above_hundred_is_rejected() {
        let mut config = DiffConfig::new("repo", "a", "b");
        config.find_renames_threshold = 101;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "CAPS_INVALID");
    }

    #[test]
    fn zero_caps_are_allowed() {
        let mut config = DiffConfig::new("repo", "a", "b");
        config.cap_total = 0;
        config.cap_file = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn request_body_applies_defaults() {
        let config: DiffConfig = serde_json::from_str(
            r#"{"repo_url":"repo","commit_good":"a","commit_candidate":"b"}"#,
        )
        .unwrap();
        assert_eq!(config.cap_total, DEFAULT_CAP_TOTAL);
        assert_eq!(config.find_renames_threshold, DEFAULT_FIND_RENAMES_THRESHOLD);
        assert!(!config.keep_workdir);
    }

    #[test]
    fn provenance_locks_environment() {
        let config = DiffConfig::new("repo", "a", "b");
        let provenance = config.provenance("2.39.5");
        assert_eq!(provenance.diff_algorithm, "myers");
        assert_eq!(provenance.git_version, "2.39.5");
        assert_eq!(provenance.env_locks.lc_all, "C");
        assert_eq!(provenance.caps.total_bytes, 800_000);
        assert!(provenance.checksum.is_empty());
    }
}
