//! Settings profiles.
//!
//! A profile is a named configuration bundle: annotation template, pattern
//! sets, substitution rules, API pacing, and capture flags. Several profiles
//! may live in one TOML file; exactly one is active at a time. The orchestrator
//! receives an immutable snapshot per invocation, so switching the active
//! profile mid-run never affects an in-flight pass.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rewrite::SubstitutionRule;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse profile file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("profile '{0}' not found in profile file")]
    UnknownProfile(String),
}

/// One named settings bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// `strftime` format used for the `{date}` placeholder in labels.
    pub date_format: String,
    /// Annotation label template; `{date}` is substituted at insertion time.
    pub archive_label: String,

    /// URLs matching any of these are never archived.
    pub url_ignore_patterns: Vec<String>,
    /// When non-empty, only URLs matching one of these are archived.
    pub url_include_patterns: Vec<String>,
    /// When non-empty, only documents whose path matches are eligible.
    pub path_include_patterns: Vec<String>,
    /// When non-empty, only documents containing one of these (literal) are eligible.
    pub content_include_patterns: Vec<String>,

    /// Applied in order to each URL before submission.
    pub substitutions: Vec<SubstitutionRule>,

    /// Unconditional delay before every external archival call, in seconds.
    pub pacing_secs: u64,
    /// Status checks per job before giving up.
    pub max_poll_retries: u32,
    /// Annotations younger than this many days are left alone.
    pub freshness_days: u32,

    pub capture_screenshot: bool,
    pub capture_all: bool,
    pub capture_outlinks: bool,
    pub force_get: bool,
    /// JS execution timeout passed to the capture, when set.
    pub js_timeout_secs: Option<u32>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
            archive_label: "(archived {date})".to_string(),
            url_ignore_patterns: Vec::new(),
            url_include_patterns: Vec::new(),
            path_include_patterns: Vec::new(),
            content_include_patterns: Vec::new(),
            substitutions: Vec::new(),
            pacing_secs: 5,
            max_poll_retries: 12,
            freshness_days: 90,
            capture_screenshot: false,
            capture_all: false,
            capture_outlinks: false,
            force_get: false,
            js_timeout_secs: None,
        }
    }
}

impl Profile {
    /// Render the annotation label for the given wall-clock time.
    #[must_use]
    pub fn render_label(&self, now: DateTime<Utc>) -> String {
        self.archive_label
            .replace("{date}", &now.format(&self.date_format).to_string())
    }

    /// A profile suitable for tests: no pacing, a short poll budget.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            pacing_secs: 0,
            max_poll_retries: 2,
            ..Self::default()
        }
    }
}

/// On-disk shape of the profile file: an optional `active` selector plus a
/// `[profiles.<name>]` table per bundle.
#[derive(Debug, Default, Deserialize)]
struct ProfileFile {
    active: Option<String>,
    #[serde(default)]
    profiles: BTreeMap<String, Profile>,
}

/// Load the active profile from a TOML profile file.
///
/// `name_override` wins over the file's own `active` selector; with neither
/// present the profile named `default` is used.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the selected
/// profile does not exist.
pub fn load_active(path: &Path, name_override: Option<&str>) -> Result<Profile, ProfileError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut file: ProfileFile = toml::from_str(&raw).map_err(|source| ProfileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let name = name_override
        .map(str::to_string)
        .or(file.active.clone())
        .unwrap_or_else(|| "default".to_string());

    file.profiles
        .remove(&name)
        .ok_or(ProfileError::UnknownProfile(name))
}
