//! Relocation-aware retry of previously failed archive attempts.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::freshness;
use crate::grammar;
use crate::ledger::{self, FailedArchive, LedgerFormat};
use crate::locate;
use crate::store::DocumentStore;
use crate::wayback::ArchiveOutcome;

use super::{render_annotation, splice_annotation, Orchestrator, RunSummary};

impl Orchestrator {
    /// Replay a previously exported ledger snapshot.
    ///
    /// Entries are retried directly against the archival client (they already
    /// represent known failures, so no freshness gate applies), except that a
    /// non-force retry first drops entries whose document has meanwhile
    /// gained a fresh annotation - those are removed from the durable ledger
    /// too, without any service call. Successes are removed and the source
    /// document is patched best-effort; repeat failures stay with an
    /// incremented retry count. The snapshot is rewritten in the format it
    /// was read from, or deleted when nothing is left.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be read or parsed (nothing
    /// is modified in that case), or when persisting the updated ledger
    /// fails.
    pub async fn retry_failures(
        &mut self,
        store: &dyn DocumentStore,
        snapshot_path: &Path,
        force: bool,
    ) -> Result<RunSummary> {
        let raw = tokio::fs::read_to_string(snapshot_path)
            .await
            .with_context(|| format!("Failed to read ledger snapshot: {}", snapshot_path.display()))?;
        let format = LedgerFormat::detect(snapshot_path, &raw);
        let mut entries = ledger::decode(&raw, format)
            .with_context(|| format!("Malformed ledger snapshot: {}", snapshot_path.display()))?;
        info!(count = entries.len(), format = format.as_str(), "Retrying failed archives");

        if !force {
            let mut kept = Vec::with_capacity(entries.len());
            let mut dropped = 0usize;
            for entry in entries {
                if self.already_fresh(store, &entry).await {
                    debug!(url = %entry.url, "Annotation already fresh, dropping entry");
                    self.ledger.remove(&entry.url, &entry.file_path);
                    dropped += 1;
                } else {
                    kept.push(entry);
                }
            }
            if dropped > 0 {
                self.ledger.save().await?;
            }
            entries = kept;
        }

        let mut summary = RunSummary::default();
        let mut survivors = Vec::new();

        for entry in entries {
            // Pacing happens inside the client, before every external call.
            match self.client.submit(&entry.url, &self.profile).await {
                ArchiveOutcome::Archived { snapshot_url }
                | ArchiveOutcome::RateLimited { snapshot_url } => {
                    self.ledger.remove(&entry.url, &entry.file_path);
                    summary.archived += 1;
                    if let Err(e) = self.patch_after_retry(store, &entry, &snapshot_url).await {
                        warn!(
                            url = %entry.url,
                            file = %entry.file_path,
                            error = %e,
                            "Archived, but the document could not be annotated"
                        );
                    }
                }
                ArchiveOutcome::Failed { error } => {
                    warn!(url = %entry.url, error = %error, "Retry failed again");
                    let updated = FailedArchive {
                        timestamp: Utc::now().to_rfc3339(),
                        error,
                        retry_count: entry.retry_count + 1,
                        ..entry
                    };
                    self.ledger.record(updated.clone());
                    survivors.push(updated);
                    summary.failed += 1;
                }
            }
        }

        self.ledger.save().await?;

        if survivors.is_empty() {
            match tokio::fs::remove_file(snapshot_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to remove ledger snapshot: {}", snapshot_path.display())
                    })
                }
            }
        } else {
            let raw = ledger::encode(&survivors, format)?;
            tokio::fs::write(snapshot_path, raw).await.with_context(|| {
                format!("Failed to rewrite ledger snapshot: {}", snapshot_path.display())
            })?;
        }

        self.notifier.notify(&format!("Retry complete: {summary}"));
        Ok(summary)
    }

    /// Whether the entry's link already carries a fresh annotation in the
    /// target document (possibly added by a later, unrelated run).
    async fn already_fresh(&self, store: &dyn DocumentStore, entry: &FailedArchive) -> bool {
        let Ok(live) = store.read(Path::new(&entry.file_path)).await else {
            return false;
        };
        let Some(m) = locate::locate_match(&live, &entry.url, 0) else {
            return false;
        };
        let adjacent = grammar::adjacent_annotation(&live[m.end()..]);
        !freshness::evaluate(adjacent.as_ref(), self.profile.freshness_days, Utc::now())
            .should_process
    }

    /// Best-effort document patch after a successful retry. The ledger entry
    /// carries no offset, so relocation starts from the top of the document.
    async fn patch_after_retry(
        &self,
        store: &dyn DocumentStore,
        entry: &FailedArchive,
        snapshot_url: &str,
    ) -> Result<()> {
        let path = Path::new(&entry.file_path);
        let live = store.read(path).await?;
        let m = locate::locate_match(&live, &entry.url, 0)
            .ok_or_else(|| anyhow!("link no longer present in document"))?;

        let adjacent = grammar::adjacent_annotation(&live[m.end()..]);
        let label = self.profile.render_label(Utc::now());
        let annotation = render_annotation(m.format, &label, snapshot_url);
        let patched = splice_annotation(&live, &m, &annotation, adjacent.as_ref());
        store.write(path, &patched).await
    }
}
