//! Per-invocation working files.
//!
//! Every file an invocation creates is named `<invocation id>-<suffix>`, so
//! concurrent invocations sharing the same directories never collide. Tracked
//! files are removed when the workspace is dropped unless released first.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use uuid::Uuid;

/// Shared basename for one invocation.
///
/// A UTC timestamp keeps spool listings sortable; the random suffix makes the
/// name unique even for invocations started within the same second.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvocationId(String);

impl InvocationId {
    pub fn new() -> Self {
        Self(format!(
            "{}-{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scratch area for one invocation.
pub struct Workspace {
    id: InvocationId,
    base_path: PathBuf,
    created: Vec<PathBuf>,
}

impl Workspace {
    /// Create a workspace rooted at `base_path` with a fresh id.
    pub fn new(base_path: PathBuf) -> Self {
        Self::with_id(base_path, InvocationId::new())
    }

    pub fn with_id(base_path: PathBuf, id: InvocationId) -> Self {
        Self {
            id,
            base_path,
            created: Vec::new(),
        }
    }

    pub fn id(&self) -> &InvocationId {
        &self.id
    }

    /// Ensure the workspace directory exists.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.base_path).await
    }

    /// Path for a scratch file, e.g. `resolve_path("2.pdf")`.
    pub fn resolve_path(&self, suffix: &str) -> PathBuf {
        self.base_path.join(format!("{}-{}", self.id, suffix))
    }

    /// Write a scratch file and track it for cleanup.
    pub async fn write(&mut self, suffix: &str, content: &[u8]) -> io::Result<PathBuf> {
        let path = self.resolve_path(suffix);
        self.track(path.clone());
        fs::write(&path, content).await?;
        Ok(path)
    }

    /// Track a file some other process will create.
    pub fn track(&mut self, path: PathBuf) {
        self.created.push(path);
    }

    /// Stop tracking `path`; it outlives the workspace.
    pub fn release(&mut self, path: &Path) {
        self.created.retain(|p| p != path);
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.created
    }

    /// Remove every tracked file. Missing files are fine.
    pub fn cleanup(&mut self) {
        for path in self.created.drain(..) {
            remove_quietly(&path);
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove working file"),
    }
}
