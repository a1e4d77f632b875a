//! Save Page Now client.
//!
//! Drives one URL through the archival state machine: submit, poll the job
//! until it settles, and fall back to the newest existing snapshot when the
//! service rate-limits or reports a duplicate capture. Every external call is
//! preceded by the same unconditional pacing delay; this is pacing to respect
//! provider limits, not backoff.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::constants::{
    ARCHIVAL_USER_AGENT, CDX_SEARCH_URL, SNAPSHOT_URL_PREFIX, SPN_STATUS_URL, SPN_SUBMIT_URL,
};
use crate::freshness;
use crate::profile::Profile;
use crate::rewrite;

/// Service message marking a capture that was declined because the same page
/// was snapshotted moments ago. Treated like a rate limit, not a failure.
const DUPLICATE_CAPTURE_MARKER: &str = "same snapshot had been made";

/// Terminal result of attempting to archive one URL.
///
/// `RateLimited` still carries an insertable snapshot URL: the newest known
/// capture, or the wildcard lookup URL when none exists. Only `Failed` ends
/// up in the failure ledger.
#[derive(Debug, Clone)]
pub enum ArchiveOutcome {
    Archived { snapshot_url: String },
    RateLimited { snapshot_url: String },
    Failed { error: String },
}

impl ArchiveOutcome {
    /// The archive URL to insert, when the attempt produced one.
    #[must_use]
    pub fn snapshot_url(&self) -> Option<&str> {
        match self {
            Self::Archived { snapshot_url } | Self::RateLimited { snapshot_url } => {
                Some(snapshot_url)
            }
            Self::Failed { .. } => None,
        }
    }
}

/// Endpoint set, overridable for tests.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub submit: String,
    pub status: String,
    pub cdx: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            submit: SPN_SUBMIT_URL.to_string(),
            status: SPN_STATUS_URL.to_string(),
            cdx: CDX_SEARCH_URL.to_string(),
        }
    }
}

/// Paced Save Page Now client.
pub struct WaybackClient {
    client: Client,
    credentials: Credentials,
    endpoints: Endpoints,
    /// Unconditional delay before every external call.
    pacing: Duration,
    max_poll_retries: u32,
}

impl WaybackClient {
    /// Create a new client with pacing and retry knobs taken from the profile.
    #[must_use]
    pub fn new(credentials: Credentials, profile: &Profile) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(ARCHIVAL_USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            credentials,
            endpoints: Endpoints::default(),
            pacing: Duration::from_secs(profile.pacing_secs),
            max_poll_retries: profile.max_poll_retries,
        }
    }

    /// Point the client at different endpoints (tests).
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Submit a URL for archiving and drive the job to a terminal outcome.
    ///
    /// Substitution rules are applied first; the snapshot URL in the outcome
    /// refers to the rewritten target, since that is what gets captured.
    pub async fn submit(&self, url: &str, profile: &Profile) -> ArchiveOutcome {
        let target = rewrite::apply_rules(url, &profile.substitutions);
        if target != url {
            debug!(url = %url, target = %target, "Applied substitution rules");
        }

        self.pace().await;
        debug!(url = %target, "Submitting URL for capture");

        let mut form: Vec<(&str, String)> = vec![
            ("url", target.clone()),
            ("capture_outlinks", flag(profile.capture_outlinks)),
            ("capture_screenshot", flag(profile.capture_screenshot)),
            ("force_get", flag(profile.force_get)),
            ("capture_all", flag(profile.capture_all)),
            ("skip_first_archive", "1".to_string()),
        ];
        if let Some(timeout) = profile.js_timeout_secs {
            form.push(("js_behavior_timeout", timeout.to_string()));
        }
        if profile.freshness_days > 0 {
            let window_secs = u64::from(profile.freshness_days) * 86_400;
            form.push(("if_not_archived_within", window_secs.to_string()));
        }

        let response = match self
            .client
            .post(&self.endpoints.submit)
            .header(AUTHORIZATION, self.auth_header())
            .form(&form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return ArchiveOutcome::Failed {
                    error: format!("submission request failed: {e}"),
                }
            }
        };

        if response.status().as_u16() == 429 {
            warn!(url = %target, "Rate limited on submission");
            return self.rate_limited(&target).await;
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                return ArchiveOutcome::Failed {
                    error: format!("unreadable submission response: {e}"),
                }
            }
        };

        if let Some(job_id) = body.get("job_id").and_then(Value::as_str) {
            debug!(url = %target, job_id = %job_id, "Capture job accepted");
            return self.poll(job_id, &target).await;
        }

        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if message
            .to_lowercase()
            .contains(DUPLICATE_CAPTURE_MARKER)
        {
            info!(url = %target, "Duplicate capture declined by service");
            return self.rate_limited(&target).await;
        }

        ArchiveOutcome::Failed {
            error: if message.is_empty() {
                "submission response carried no job id".to_string()
            } else {
                message.to_string()
            },
        }
    }

    /// Poll the status endpoint until the job settles or the retry budget is
    /// spent. Transient transport failures count against the same budget.
    async fn poll(&self, job_id: &str, target: &str) -> ArchiveOutcome {
        let status_url = format!("{}{job_id}", self.endpoints.status);
        let mut attempts = 0u32;

        loop {
            self.pace().await;

            let body = match self
                .client
                .get(&status_url)
                .header(AUTHORIZATION, self.auth_header())
                .send()
                .await
            {
                Ok(response) => response.json::<Value>().await.ok(),
                Err(e) => {
                    debug!(job_id = %job_id, error = %e, "Transient status check failure");
                    None
                }
            };

            if let Some(body) = body {
                match body.get("status").and_then(Value::as_str) {
                    Some("success") => {
                        let timestamp = body
                            .get("timestamp")
                            .and_then(Value::as_str)
                            .map_or_else(
                                || freshness::format_stamp(chrono::Utc::now()),
                                str::to_string,
                            );
                        let original = body
                            .get("original_url")
                            .and_then(Value::as_str)
                            .unwrap_or(target);
                        let snapshot_url =
                            format!("{SNAPSHOT_URL_PREFIX}{timestamp}/{original}");
                        info!(url = %target, snapshot = %snapshot_url, "Snapshot created");
                        return ArchiveOutcome::Archived { snapshot_url };
                    }
                    Some("error") => {
                        let detail = body
                            .get("status_ext")
                            .or_else(|| body.get("message"))
                            .and_then(Value::as_str)
                            .unwrap_or("capture failed");
                        warn!(url = %target, detail = %detail, "Capture job failed");
                        return ArchiveOutcome::Failed {
                            error: detail.to_string(),
                        };
                    }
                    _ => {} // still pending
                }
            }

            attempts += 1;
            if attempts > self.max_poll_retries {
                return ArchiveOutcome::Failed {
                    error: format!(
                        "job {job_id} still pending after {} status checks",
                        self.max_poll_retries
                    ),
                };
            }
        }
    }

    /// Downgrade a rate limit or duplicate capture to a usable outcome: the
    /// newest existing snapshot if one is known, the wildcard lookup URL
    /// otherwise. The link still gets an annotation either way.
    async fn rate_limited(&self, target: &str) -> ArchiveOutcome {
        let snapshot_url = match self.latest_snapshot(target).await {
            Some(timestamp) => format!("{SNAPSHOT_URL_PREFIX}{timestamp}/{target}"),
            None => format!("{SNAPSHOT_URL_PREFIX}*/{target}"),
        };
        ArchiveOutcome::RateLimited { snapshot_url }
    }

    /// Most recent known snapshot timestamp for a URL, via the CDX query API.
    ///
    /// Read-only and best-effort: any parse or network problem yields `None`.
    pub async fn latest_snapshot(&self, url: &str) -> Option<String> {
        self.pace().await;

        let query = format!(
            "{}?url={}&output=json&fl=timestamp&filter=statuscode:200&limit=1&sort=reverse",
            self.endpoints.cdx,
            urlencoding::encode(url)
        );

        let response = self.client.get(&query).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }

        // Tabular JSON: row one is the field header, row two the newest capture.
        let rows: Vec<Vec<String>> = response.json().await.ok()?;
        rows.get(1)?.first().cloned().filter(|t| !t.is_empty())
    }

    async fn pace(&self) {
        if !self.pacing.is_zero() {
            sleep(self.pacing).await;
        }
    }

    fn auth_header(&self) -> String {
        format!(
            "LOW {}:{}",
            self.credentials.access_key, self.credentials.secret_key
        )
    }
}

fn flag(on: bool) -> String {
    String::from(if on { "1" } else { "0" })
}
