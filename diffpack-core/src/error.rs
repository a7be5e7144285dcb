use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiffError>;

/// Minimum Git version the pipeline supports, as `major.minor`.
pub const REQUIRED_GIT_VERSION: &str = "2.30";

#[derive(Error, Debug)]
pub enum DiffError {
    #[error("git version {detected} is not supported, minimum required: {required}")]
    GitVersionUnsupported { detected: String, required: String },

    #[error("failed to clone repository: {reason}")]
    CloneFailed { repo_url: String, reason: String },

    #[error("commits not found: {}", missing.join(", "))]
    CommitNotFound { missing: Vec<String>, repo_url: String },

    #[error("invalid capacity configuration: {reason}")]
    CapsInvalid { reason: String },

    #[error("network timeout during {operation} after {timeout_seconds}s")]
    NetworkTimeout { operation: String, timeout_seconds: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl DiffError {
    /// Stable machine-readable code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            DiffError::GitVersionUnsupported { .. } => "GIT_VERSION_UNSUPPORTED",
            DiffError::CloneFailed { .. } => "CLONE_FAILED",
            DiffError::CommitNotFound { .. } => "COMMIT_NOT_FOUND",
            DiffError::CapsInvalid { .. } => "CAPS_INVALID",
            DiffError::NetworkTimeout { .. } => "NETWORK_TIMEOUT",
            DiffError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Structured details emitted alongside code and message.
    pub fn details(&self) -> Value {
        match self {
            DiffError::GitVersionUnsupported { detected, required } => json!({
                "detected_version": detected,
                "required_version": required,
            }),
            DiffError::CloneFailed { repo_url, reason } => json!({
                "repo_url": repo_url,
                "reason": reason,
            }),
            DiffError::CommitNotFound { missing, repo_url } => json!({
                "missing_commits": missing,
                "repo_url": repo_url,
            }),
            DiffError::CapsInvalid { reason } => json!({ "reason": reason }),
            DiffError::NetworkTimeout {
                operation,
                timeout_seconds,
            } => json!({
                "operation": operation,
                "timeout_seconds": timeout_seconds,
            }),
            DiffError::Internal(reason) => json!({ "reason": reason }),
        }
    }
}

impl From<std::io::Error> for DiffError {
    fn from(err: std::io::Error) -> Self {
        DiffError::Internal(err.to_string())
    }
}

/// The `error` member of a failure envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub details: Value,
}

impl From<&DiffError> for ErrorBody {
    fn from(err: &DiffError) -> Self {
        ErrorBody {
            code: err.code().to_string(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = DiffError::CapsInvalid {
            reason: "cap_file cannot exceed cap_total".to_string(),
        };
        assert_eq!(err.code(), "CAPS_INVALID");

        let err = DiffError::CommitNotFound {
            missing: vec!["abc123".to_string()],
            repo_url: "https://example.com/repo.git".to_string(),
        };
        assert_eq!(err.code(), "COMMIT_NOT_FOUND");
        assert!(err.to_string().contains("abc123"));
    }

    #[test]
    fn details_carry_missing_commits() {
        let err = DiffError::CommitNotFound {
            missing: vec!["abc123".to_string(), "def456".to_string()],
            repo_url: "https://example.com/repo.git".to_string(),
        };
        let details = err.details();
        assert_eq!(details["missing_commits"][1], "def456");
        assert_eq!(details["repo_url"], "https://example.com/repo.git");
    }

    #[test]
    fn error_body_from_error() {
        let err = DiffError::GitVersionUnsupported {
            detected: "2.19.0".to_string(),
            required: REQUIRED_GIT_VERSION.to_string(),
        };
        let body = ErrorBody::from(&err);
        assert_eq!(body.code, "GIT_VERSION_UNSUPPORTED");
        assert_eq!(body.details["detected_version"], "2.19.0");
    }
}
