use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{DiffError, ErrorBody, Result};

/// Canonical change statuses reported by Git's name-status output.
///
/// The set is closed; the driver rejects any other letter instead of
/// passing it through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Copied,
    Deleted,
    Modified,
    Renamed,
    TypeChanged,
}

impl ChangeStatus {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'A' => Some(ChangeStatus::Added),
            'C' => Some(ChangeStatus::Copied),
            'D' => Some(ChangeStatus::Deleted),
            'M' => Some(ChangeStatus::Modified),
            'R' => Some(ChangeStatus::Renamed),
            'T' => Some(ChangeStatus::TypeChanged),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Added => "A",
            ChangeStatus::Copied => "C",
            ChangeStatus::Deleted => "D",
            ChangeStatus::Modified => "M",
            ChangeStatus::Renamed => "R",
            ChangeStatus::TypeChanged => "T",
        }
    }
}

impl Serialize for ChangeStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Which rule resolved a near-tie between rename candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenameTiebreaker {
    Path,
    Size,
    Lex,
}

/// One contiguous block of a unified diff under a single `@@` header.
#[derive(Debug, Clone, Serialize)]
pub struct Hunk {
    pub header: String,
    pub old_start: u64,
    pub old_lines: u64,
    pub new_start: u64,
    pub new_lines: u64,
    pub added: u64,
    pub deleted: u64,
    pub patch: String,
}

/// Gitlink endpoints for a changed submodule.
#[derive(Debug, Clone, Serialize)]
pub struct SubmoduleRef {
    pub old_sha: Option<String>,
    pub new_sha: Option<String>,
}

/// One entry of the change set, frozen once the cap engine completes.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub status: ChangeStatus,
    pub path_old: Option<String>,
    pub path_new: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename_tiebreaker: Option<RenameTiebreaker>,
    pub mode_old: Option<String>,
    pub mode_new: Option<String>,
    pub size_old: Option<u64>,
    pub size_new: Option<u64>,
    pub is_binary: bool,
    pub is_submodule: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub eol_only_change: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub whitespace_only_change: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub summarized: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omitted_hunks_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submodule: Option<SubmoduleRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hunks: Vec<Hunk>,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl FileRecord {
    /// `path_new` if present, else `path_old`; the ordering key.
    pub fn effective_path(&self) -> &str {
        self.path_new
            .as_deref()
            .or(self.path_old.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CapSettings {
    pub total_bytes: u64,
    pub per_file_bytes: u64,
    pub context_lines: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameDetection {
    pub enabled: bool,
    pub threshold_pct: u8,
}

/// The fixed environment the Git driver runs under, echoed for consumers.
#[derive(Debug, Clone, Serialize)]
pub struct EnvLocks {
    #[serde(rename = "LC_ALL")]
    pub lc_all: String,
    pub color: String,
    #[serde(rename = "core.autocrlf")]
    pub core_autocrlf: String,
}

impl Default for EnvLocks {
    fn default() -> Self {
        EnvLocks {
            lc_all: "C".to_string(),
            color: "off".to_string(),
            core_autocrlf: "false".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    pub repo_url: String,
    pub commit_good: String,
    pub commit_candidate: String,
    pub branch_name: Option<String>,
    pub caps: CapSettings,
    pub rename_detection: RenameDetection,
    pub diff_algorithm: String,
    pub env_locks: EnvLocks,
    pub git_version: String,
    pub checksum: String,
}

/// The complete successful output of one run.
#[derive(Debug, Clone, Serialize)]
pub struct Payload {
    pub provenance: Provenance,
    pub files: Vec<FileRecord>,
    pub omitted_files_count: u64,
    pub notes: Vec<String>,
}

/// Every output is an envelope: `{ok:true, data}` or `{ok:false, error}`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Envelope {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(err: &DiffError) -> Self {
        Envelope {
            ok: false,
            data: None,
            error: Some(ErrorBody::from(err)),
        }
    }

    /// Encodes the envelope under the canonical serialization rules.
    pub fn to_canonical_json(&self) -> Result<String> {
        let value = serde_json::to_value(self)
            .map_err(|e| DiffError::Internal(format!("envelope serialization failed: {e}")))?;
        let bytes = crate::serialize::canonical_bytes(&value)?;
        String::from_utf8(bytes)
            .map_err(|e| DiffError::Internal(format!("envelope is not valid UTF-8: {e}")))
    }
}
