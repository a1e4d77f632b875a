//! Document storage boundary.
//!
//! The orchestrator never touches the filesystem directly; it goes through
//! [`DocumentStore`] so the host environment (an editor, a sync layer, a test
//! harness) owns reads and writes. [`FsStore`] is the plain-directory
//! implementation used by the CLI and tests.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Read/write access to a collection of Markdown documents.
///
/// Paths handed out by `list_documents` are relative to the store root and
/// are accepted back by `read` and `write`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_documents(&self) -> Result<Vec<PathBuf>>;
    async fn read(&self, path: &Path) -> Result<String>;
    async fn write(&self, path: &Path, content: &str) -> Result<()>;
}

/// Filesystem-backed store rooted at a vault directory.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl DocumentStore for FsStore {
    /// Enumerate every `.md` file under the root, sorted for a stable
    /// processing order.
    async fn list_documents(&self) -> Result<Vec<PathBuf>> {
        // Async recursion is not allowed without boxing; use an explicit stack.
        let mut stack = vec![self.root.clone()];
        let mut documents = Vec::new();

        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    // Hidden directories (.git, .obsidian, ...) are not documents.
                    let hidden = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with('.'));
                    if !hidden {
                        stack.push(path);
                    }
                    continue;
                }

                if file_type.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some("md")
                {
                    let relative = path.strip_prefix(&self.root).unwrap_or(&path).to_path_buf();
                    documents.push(relative);
                }
            }
        }

        documents.sort();
        Ok(documents)
    }

    async fn read(&self, path: &Path) -> Result<String> {
        let full = self.resolve(path);
        tokio::fs::read_to_string(&full)
            .await
            .with_context(|| format!("Failed to read document: {}", full.display()))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        let full = self.resolve(path);
        tokio::fs::write(&full, content)
            .await
            .with_context(|| format!("Failed to write document: {}", full.display()))
    }
}
