//! User-facing notification boundary.
//!
//! Every terminal outcome (run summary, per-document skip, ledger parse
//! error) surfaces as a single human-readable notification through this
//! trait; the host UI decides how to show it.

use tracing::info;

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Default notifier: routes messages to the structured log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!("{message}");
    }
}
