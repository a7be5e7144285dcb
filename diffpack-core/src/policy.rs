/// Path patterns whose diffs are mechanically produced and low-signal.
///
/// Fixed names match the basename exactly (case-sensitive); patterns
/// starting with `*` match any basename with that suffix.
pub const DEFAULT_POLICY_PATTERNS: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "npm-shrinkwrap.json",
    "poetry.lock",
    "Pipfile.lock",
    "gradle.lockfile",
    "Gemfile.lock",
    "composer.lock",
    "Cargo.lock",
    "go.sum",
    "Package.resolved",
    "mix.lock",
    "packages.lock.json",
    "*.min.js",
    "*.map",
];

/// Classifies paths as lockfile/generated.
///
/// The table is data: callers can supply their own pattern list in place
/// of the shipped defaults.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    patterns: Vec<String>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        PolicyTable::new(
            DEFAULT_POLICY_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        )
    }
}

impl PolicyTable {
    pub fn new(patterns: Vec<String>) -> Self {
        PolicyTable { patterns }
    }

    /// True when the path's basename matches any configured pattern.
    pub fn matches(&self, path: &str) -> bool {
        let basename = path.rsplit('/').next().unwrap_or(path);
        self.patterns.iter().any(|pattern| {
            match pattern.strip_prefix('*') {
                Some(suffix) => basename.ends_with(suffix),
                None => basename == pattern,
            }
        })
    }
}
