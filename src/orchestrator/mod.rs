//! Link-archival orchestration.
//!
//! Coordinates the grammar, filters, relocation resolver, archival client,
//! freshness policy, and a short-lived result cache to process one selection,
//! one document, or a whole vault. Links are resolved strictly sequentially:
//! by the time link N's patch is applied, link N-1's patch has already
//! landed, so relocation against current content is well-defined.

mod retry;

use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use url::Url;

use crate::filter;
use crate::freshness::{self, Decision};
use crate::grammar::{self, AdjacentAnnotation, LinkFormat, LinkMatch};
use crate::ledger::{FailedArchive, FailureLedger};
use crate::locate;
use crate::notify::{LogNotifier, Notifier};
use crate::profile::Profile;
use crate::store::DocumentStore;
use crate::wayback::{ArchiveOutcome, WaybackClient};

/// Normal runs respect the freshness policy; force runs re-archive every
/// eligible link and replace any existing annotation on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Force,
}

/// Per-run counters. Ignored, non-matching, already-fresh, and
/// deleted-during-processing links all collapse into `skipped`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub archived: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    fn merge(&mut self, other: Self) {
        self.archived += other.archived;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} archived, {} failed, {} skipped",
            self.archived, self.failed, self.skipped
        )
    }
}

/// Cached result of a previous attempt within this invocation.
///
/// Keyed by the original URL as found in the document; never persisted and
/// never consulted across invocations.
struct CacheEntry {
    snapshot_url: String,
    rate_limited: bool,
    cached_at: DateTime<Utc>,
}

type ResultCache = HashMap<String, CacheEntry>;

enum LinkResult {
    Archived,
    Failed,
    Skipped,
}

/// The archival orchestrator. Holds the client, the active profile snapshot,
/// and the durable failure ledger (of which it is the single writer).
pub struct Orchestrator {
    client: WaybackClient,
    profile: Profile,
    ledger: FailureLedger,
    notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(client: WaybackClient, profile: Profile, ledger: FailureLedger) -> Self {
        Self {
            client,
            profile,
            ledger,
            notifier: Arc::new(LogNotifier),
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    /// Consume the orchestrator, handing the ledger back to the caller.
    #[must_use]
    pub fn into_ledger(self) -> FailureLedger {
        self.ledger
    }

    /// Archive every link in one document.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be read or written; remaining
    /// links in the document are abandoned for this pass.
    pub async fn archive_document(
        &mut self,
        store: &dyn DocumentStore,
        path: &Path,
        mode: Mode,
    ) -> Result<RunSummary> {
        let mut cache = ResultCache::new();
        let summary = self.archive_scope(store, path, None, mode, &mut cache).await?;
        self.notifier
            .notify(&format!("{}: {summary}", path.display()));
        Ok(summary)
    }

    /// Archive every link inside a byte range of one document (an editor
    /// selection).
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be read or written.
    pub async fn archive_selection(
        &mut self,
        store: &dyn DocumentStore,
        path: &Path,
        selection: Range<usize>,
        mode: Mode,
    ) -> Result<RunSummary> {
        let mut cache = ResultCache::new();
        let summary = self
            .archive_scope(store, path, Some(selection), mode, &mut cache)
            .await?;
        self.notifier
            .notify(&format!("{} (selection): {summary}", path.display()));
        Ok(summary)
    }

    /// Archive every link across the vault.
    ///
    /// Documents are first narrowed by the path-include and content-include
    /// patterns (a document must satisfy all configured include dimensions),
    /// then processed sequentially. A document that fails to read or write is
    /// reported and skipped; the rest of the vault continues.
    ///
    /// # Errors
    ///
    /// Returns an error when the vault cannot be enumerated at all.
    pub async fn archive_vault(
        &mut self,
        store: &dyn DocumentStore,
        mode: Mode,
    ) -> Result<RunSummary> {
        let documents = store
            .list_documents()
            .await
            .context("Failed to enumerate vault documents")?;
        info!(count = documents.len(), "Vault scan started");

        let mut cache = ResultCache::new();
        let mut total = RunSummary::default();

        for path in documents {
            let path_str = path.to_string_lossy();
            if !self.profile.path_include_patterns.is_empty()
                && !filter::matches_any(&path_str, &self.profile.path_include_patterns)
            {
                debug!(path = %path_str, "Document path not included");
                continue;
            }
            if !self.profile.content_include_patterns.is_empty() {
                let text = match store.read(&path).await {
                    Ok(text) => text,
                    Err(e) => {
                        self.notifier
                            .notify(&format!("Skipping {path_str}: {e:#}"));
                        continue;
                    }
                };
                if !filter::contains_any(&text, &self.profile.content_include_patterns) {
                    debug!(path = %path_str, "Document content not included");
                    continue;
                }
            }

            match self.archive_scope(store, &path, None, mode, &mut cache).await {
                Ok(summary) => total.merge(summary),
                Err(e) => {
                    self.notifier
                        .notify(&format!("Skipping {path_str}: {e:#}"));
                }
            }
        }

        self.notifier.notify(&format!("Vault run complete: {total}"));
        Ok(total)
    }

    /// The shared inner algorithm for all scopes and modes.
    async fn archive_scope(
        &mut self,
        store: &dyn DocumentStore,
        path: &Path,
        selection: Option<Range<usize>>,
        mode: Mode,
        cache: &mut ResultCache,
    ) -> Result<RunSummary> {
        let text = store.read(path).await?;
        let (scope_text, base) = match selection {
            Some(range) => {
                let start = grammar::floor_char_boundary(&text, range.start.min(text.len()));
                let end = grammar::floor_char_boundary(&text, range.end.min(text.len()));
                (&text[start..end.max(start)], start)
            }
            None => (text.as_str(), 0),
        };

        // Discovery offsets go stale the moment the first patch lands; they
        // are only ever used as relocation hints.
        let matches: Vec<LinkMatch> = grammar::find_links(scope_text).collect();
        debug!(path = %path.display(), links = matches.len(), "Scanned scope");

        let mut summary = RunSummary::default();
        for m in matches {
            let discovered_at = base + m.start;
            let result = self
                .process_link(store, path, &text, &m, discovered_at, mode, cache)
                .await?;
            match result {
                LinkResult::Archived => summary.archived += 1,
                LinkResult::Failed => summary.failed += 1,
                LinkResult::Skipped => summary.skipped += 1,
            }
        }
        Ok(summary)
    }

    /// Resolve one link to archived/failed/skipped, patching the document on
    /// success.
    #[allow(clippy::too_many_arguments)]
    async fn process_link(
        &mut self,
        store: &dyn DocumentStore,
        path: &Path,
        discovery_text: &str,
        m: &LinkMatch,
        discovered_at: usize,
        mode: Mode,
        cache: &mut ResultCache,
    ) -> Result<LinkResult> {
        if !is_archivable(&m.url) {
            debug!(url = %m.url, "Not an archivable URL");
            return Ok(LinkResult::Skipped);
        }
        if filter::matches_any(&m.url, &self.profile.url_ignore_patterns) {
            debug!(url = %m.url, "URL matches ignore pattern");
            return Ok(LinkResult::Skipped);
        }
        if !self.profile.url_include_patterns.is_empty()
            && !filter::matches_any(&m.url, &self.profile.url_include_patterns)
        {
            debug!(url = %m.url, "URL not in include patterns");
            return Ok(LinkResult::Skipped);
        }

        // Freshness gate against the text the link was discovered in.
        let after = &discovery_text[discovered_at + m.text.len()..];
        if mode == Mode::Normal {
            let adjacent = grammar::adjacent_annotation(after);
            let decision =
                freshness::evaluate(adjacent.as_ref(), self.profile.freshness_days, Utc::now());
            if !decision.should_process {
                debug!(url = %m.url, "Existing annotation is fresh");
                return Ok(LinkResult::Skipped);
            }
        }

        let (snapshot_url, rate_limited) = match self.resolve_snapshot(&m.url, cache).await {
            Ok(resolved) => resolved,
            Err(error) => {
                warn!(url = %m.url, error = %error, "Archival failed");
                self.ledger.record(FailedArchive {
                    url: m.url.clone(),
                    file_path: path.to_string_lossy().into_owned(),
                    timestamp: Utc::now().to_rfc3339(),
                    error,
                    retry_count: 0,
                });
                self.ledger.save().await?;
                return Ok(LinkResult::Failed);
            }
        };

        // The document may have been edited during the network wait:
        // re-read, re-locate, and re-check before patching.
        let live = store.read(path).await?;
        let Some(live_match) = locate::locate_match(&live, &m.url, discovered_at) else {
            info!(url = %m.url, "Link deleted during processing");
            return Ok(LinkResult::Skipped);
        };

        let adjacent = grammar::adjacent_annotation(&live[live_match.end()..]);
        let decision = match mode {
            Mode::Normal => {
                freshness::evaluate(adjacent.as_ref(), self.profile.freshness_days, Utc::now())
            }
            Mode::Force => Decision::REPLACE,
        };
        if !decision.should_process {
            debug!(url = %m.url, "Annotation became fresh during processing");
            return Ok(LinkResult::Skipped);
        }

        let label = self.profile.render_label(Utc::now());
        let annotation = render_annotation(live_match.format, &label, &snapshot_url);
        let patched = splice_annotation(
            &live,
            &live_match,
            &annotation,
            adjacent.as_ref().filter(|_| decision.replace_existing),
        );
        store.write(path, &patched).await?;

        if rate_limited {
            info!(url = %m.url, snapshot = %snapshot_url, "Annotated with existing snapshot (rate limited)");
        } else {
            info!(url = %m.url, snapshot = %snapshot_url, "Annotated with new snapshot");
        }
        Ok(LinkResult::Archived)
    }

    /// Consult the per-invocation cache, then the archival client. Failures
    /// are returned as `Err(detail)` and are never cached.
    async fn resolve_snapshot(
        &mut self,
        url: &str,
        cache: &mut ResultCache,
    ) -> Result<(String, bool), String> {
        let now = Utc::now();
        if let Some(entry) = cache.get(url) {
            let age = now.signed_duration_since(entry.cached_at);
            if age < Duration::days(i64::from(self.profile.freshness_days)) {
                debug!(url = %url, "Reusing cached archival result");
                return Ok((entry.snapshot_url.clone(), entry.rate_limited));
            }
            cache.remove(url);
        }

        match self.client.submit(url, &self.profile).await {
            ArchiveOutcome::Archived { snapshot_url } => {
                cache.insert(
                    url.to_string(),
                    CacheEntry {
                        snapshot_url: snapshot_url.clone(),
                        rate_limited: false,
                        cached_at: now,
                    },
                );
                Ok((snapshot_url, false))
            }
            ArchiveOutcome::RateLimited { snapshot_url } => {
                cache.insert(
                    url.to_string(),
                    CacheEntry {
                        snapshot_url: snapshot_url.clone(),
                        rate_limited: true,
                        cached_at: now,
                    },
                );
                Ok((snapshot_url, true))
            }
            ArchiveOutcome::Failed { error } => Err(error),
        }
    }
}

/// Whether the orchestrator should consider archiving this URL at all:
/// HTTP(S) only, and never a link into the archive itself (every annotation
/// we insert is one of those).
fn is_archivable(url: &str) -> bool {
    if grammar::is_snapshot_url(url) {
        return false;
    }
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Build the annotation text matching the link's syntactic form.
fn render_annotation(format: LinkFormat, label: &str, snapshot_url: &str) -> String {
    match format {
        LinkFormat::HtmlAnchor | LinkFormat::HtmlImage => {
            format!(
                " <a href=\"{}\">{label}</a>",
                snapshot_url.replace('"', "&quot;")
            )
        }
        LinkFormat::Markdown | LinkFormat::Plain => format!(" [{label}]({snapshot_url})"),
    }
}

/// Insert `annotation` right after the link span, removing the old
/// annotation first when one is being replaced.
fn splice_annotation(
    live: &str,
    at: &LinkMatch,
    annotation: &str,
    replace: Option<&AdjacentAnnotation>,
) -> String {
    let insert_at = at.end();
    let resume_at = insert_at + replace.map_or(0, |a| a.len);

    let mut out = String::with_capacity(live.len() + annotation.len());
    out.push_str(&live[..insert_at]);
    out.push_str(annotation);
    out.push_str(&live[resume_at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_archivable() {
        assert!(is_archivable("https://example.com/page"));
        assert!(is_archivable("http://example.com"));
        assert!(!is_archivable("ftp://example.com/file"));
        assert!(!is_archivable("mailto:someone@example.com"));
        assert!(!is_archivable("notes/relative.md"));
        assert!(!is_archivable(
            "https://web.archive.org/web/20240101000000/https://example.com"
        ));
    }

    #[test]
    fn test_render_annotation_markdown() {
        let rendered = render_annotation(
            LinkFormat::Markdown,
            "(archived 2026-01-01)",
            "https://web.archive.org/web/20260101000000/https://example.com",
        );
        assert_eq!(
            rendered,
            " [(archived 2026-01-01)](https://web.archive.org/web/20260101000000/https://example.com)"
        );
    }

    #[test]
    fn test_render_annotation_html_escapes_quotes() {
        let rendered = render_annotation(
            LinkFormat::HtmlAnchor,
            "archived",
            "https://web.archive.org/web/*/https://example.com/x?q=\"y\"",
        );
        assert!(rendered.starts_with(" <a href=\""));
        assert!(rendered.contains("&quot;y&quot;"));
    }

    #[test]
    fn test_splice_inserts_after_span() {
        let live = "before [x](https://example.com) after";
        let m = locate::locate_match(live, "https://example.com", 0).unwrap();
        let out = splice_annotation(live, &m, " [ann](https://web.archive.org/web/*/u)", None);
        assert_eq!(
            out,
            "before [x](https://example.com) [ann](https://web.archive.org/web/*/u) after"
        );
    }

    #[test]
    fn test_splice_replaces_old_annotation() {
        let live = "x [l](https://example.com) [old](https://web.archive.org/web/*/https://example.com) y";
        let m = locate::locate_match(live, "https://example.com", 0).unwrap();
        let old = grammar::adjacent_annotation(&live[m.end()..]).unwrap();
        let out = splice_annotation(live, &m, " [new](https://web.archive.org/web/20260101000000/https://example.com)", Some(&old));
        assert_eq!(
            out,
            "x [l](https://example.com) [new](https://web.archive.org/web/20260101000000/https://example.com) y"
        );
    }
}
