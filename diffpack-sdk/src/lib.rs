//! # diffpack-sdk
//!
//! Client for automated analyzers that drive a diffpack server.
//!
//! ## Example
//!
//! ```no_run
//! use diffpack_sdk::{DiffRequest, DiffpackClient};
//!
//! let client = DiffpackClient::new("http://localhost:8000");
//!
//! let envelope = client
//!     .diff(&DiffRequest::new(
//!         "https://github.com/user/repo.git",
//!         "ba7765dd48c0ba51f4fd12cde48fd100aecdb743",
//!         "d7a39abec5a282b9955afdd1649a5f1bafae35f7",
//!     ))
//!     .unwrap();
//!
//! assert_eq!(envelope["ok"], true);
//! ```

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone)]
pub struct DiffpackClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

/// Body of `POST /diff`; unset fields take the server's defaults.
#[derive(Debug, Clone, Serialize)]
pub struct DiffRequest {
    pub repo_url: String,
    pub commit_good: String,
    pub commit_candidate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cap_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cap_file: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_lines: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub find_renames_threshold: Option<u8>,
}

impl DiffRequest {
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
            cap_total: None,
            cap_file: None,
            context_lines: None,
            find_renames_threshold: None,
        }
    }

    pub fn with_branch(mut self, branch_name: impl Into<String>) -> Self {
        self.branch_name = Some(branch_name.into());
        self
    }

    pub fn with_caps(mut self, cap_total: u64, cap_file: u64) -> Self {
        self.cap_total = Some(cap_total);
        self.cap_file = Some(cap_file);
        self
    }
}

impl DiffpackClient {
    /// Create a new client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the diffpack server (e.g., "http://localhost:8000")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    /// Request a deterministic diff; returns the envelope as-is.
    pub fn diff(&self, request: &DiffRequest) -> Result<Value> {
        self.client
            .post(format!("{}/diff", self.base_url))
            .json(request)
            .send()
            .context("failed to reach diffpack server")?
            .json()
            .context("diff response was not valid JSON")
    }

    pub fn health(&self) -> Result<Value> {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .context("failed to reach diffpack server")?
            .json()
            .context("health response was not valid JSON")
    }

    pub fn version(&self) -> Result<Value> {
        self.client
            .get(format!("{}/version", self.base_url))
            .send()
            .context("failed to reach diffpack server")?
            .json()
            .context("version response was not valid JSON")
    }
}
