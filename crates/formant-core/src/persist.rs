#![forbid(unsafe_code)]

//! State persistence: pluggable backends plus a dot-path provider.
//!
//! A [`PersistenceBackend`] stores one JSON document. A
//! [`PersistenceProvider`] owns a dot-delimited path into that document
//! and reads/writes only its own subtree, preserving siblings via
//! read-modify-write of the full document.
//!
//! # Design
//!
//! 1. Providers never own the document. Many providers share one backend
//!    and each touches only the node its path names.
//! 2. Writes may be coalesced: with a scheduler attached, consecutive
//!    writes within one flush collapse to a single backend commit.
//! 3. Backend failures are recoverable. Callers log and continue; a
//!    broken store must never take the owning model down with it.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use formant_reactive::Scheduler;
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::lifecycle::Destroy;

/// Storage for one JSON document.
pub trait PersistenceBackend {
    /// The whole document. Missing storage reads as an empty object.
    fn read_raw(&self) -> Result<serde_json::Value>;

    /// Replace the whole document.
    fn write_raw(&self, root: serde_json::Value) -> Result<()>;
}

/// In-memory backend, primarily for tests and ephemeral state.
#[derive(Default)]
pub struct MemoryBackend {
    root: RefCell<serde_json::Value>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: RefCell::new(serde_json::json!({})),
        }
    }
}

impl PersistenceBackend for MemoryBackend {
    fn read_raw(&self) -> Result<serde_json::Value> {
        Ok(self.root.borrow().clone())
    }

    fn write_raw(&self, root: serde_json::Value) -> Result<()> {
        *self.root.borrow_mut() = root;
        Ok(())
    }
}

/// JSON-file backend. The file is created on first write.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PersistenceBackend for FileBackend {
    fn read_raw(&self) -> Result<serde_json::Value> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(serde_json::json!({})),
            Err(e) => Err(e.into()),
        }
    }

    fn write_raw(&self, root: serde_json::Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&root)?)?;
        Ok(())
    }
}

enum PendingWrite {
    Set(serde_json::Value),
    Clear,
}

struct ProviderInner {
    backend: Rc<dyn PersistenceBackend>,
    path: Vec<String>,
    scheduler: Option<Scheduler>,
    pending: RefCell<Option<PendingWrite>>,
    scheduled: Cell<bool>,
}

impl ProviderInner {
    fn commit(&self, write: PendingWrite) -> Result<()> {
        let mut root = self.backend.read_raw().unwrap_or_else(|e| {
            warn!(path = %self.path.join("."), error = %e, "persist read failed; starting fresh");
            serde_json::json!({})
        });
        match write {
            PendingWrite::Set(v) => json_set(&mut root, &self.path, v),
            PendingWrite::Clear => json_unset(&mut root, &self.path),
        }
        self.backend.write_raw(root)
    }

    fn flush(&self) -> Result<()> {
        if let Some(write) = self.pending.borrow_mut().take() {
            self.commit(write)?;
        }
        Ok(())
    }
}

/// Read/write access to one dot-path within a shared JSON document.
pub struct PersistenceProvider {
    inner: Rc<ProviderInner>,
}

impl PersistenceProvider {
    /// Attach a scheduler to coalesce consecutive writes into one commit
    /// per flush. Without one, every write commits immediately.
    pub fn new(
        backend: Rc<dyn PersistenceBackend>,
        path: &str,
        scheduler: Option<Scheduler>,
    ) -> Result<Self> {
        let segments: Vec<String> = path
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return Err(CoreError::EmptyPersistPath);
        }
        Ok(Self {
            inner: Rc::new(ProviderInner {
                backend,
                path: segments,
                scheduler,
                pending: RefCell::new(None),
                scheduled: Cell::new(false),
            }),
        })
    }

    #[must_use]
    pub fn path(&self) -> String {
        self.inner.path.join(".")
    }

    /// The node at this provider's path, or `None` when absent.
    pub fn read(&self) -> Result<Option<serde_json::Value>> {
        let root = self.inner.backend.read_raw()?;
        Ok(json_get(&root, &self.inner.path).cloned())
    }

    pub fn write(&self, value: serde_json::Value) -> Result<()> {
        self.enqueue(PendingWrite::Set(value))
    }

    /// Remove this provider's node, leaving siblings intact.
    pub fn clear(&self) -> Result<()> {
        self.enqueue(PendingWrite::Clear)
    }

    fn enqueue(&self, write: PendingWrite) -> Result<()> {
        let Some(sched) = &self.inner.scheduler else {
            return self.inner.commit(write);
        };
        *self.inner.pending.borrow_mut() = Some(write);
        if !self.inner.scheduled.replace(true) {
            let weak: Weak<ProviderInner> = Rc::downgrade(&self.inner);
            sched.spawn(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.scheduled.set(false);
                    if let Err(e) = inner.flush() {
                        warn!(path = %inner.path.join("."), error = %e, "persist write failed");
                    }
                }
            });
        }
        Ok(())
    }

    /// Commit any coalesced write now.
    pub fn flush(&self) -> Result<()> {
        self.inner.flush()
    }
}

impl Destroy for PersistenceProvider {
    fn destroy(&self) {
        if let Err(e) = self.inner.flush() {
            warn!(path = %self.inner.path.join("."), error = %e, "persist flush on destroy failed");
        }
    }
}

impl std::fmt::Debug for PersistenceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceProvider")
            .field("path", &self.path())
            .field("coalesced", &self.inner.scheduler.is_some())
            .finish()
    }
}

fn json_get<'a>(root: &'a serde_json::Value, path: &[String]) -> Option<&'a serde_json::Value> {
    let mut node = root;
    for seg in path {
        node = node.as_object()?.get(seg)?;
    }
    Some(node)
}

/// Set the node at `path`, creating intermediate objects. Non-object
/// intermediates are replaced.
fn json_set(root: &mut serde_json::Value, path: &[String], value: serde_json::Value) {
    let mut node = root;
    let (last, parents) = path.split_last().expect("path is non-empty");
    for seg in parents {
        if !node.is_object() {
            *node = serde_json::json!({});
        }
        node = node
            .as_object_mut()
            .expect("just ensured object")
            .entry(seg.clone())
            .or_insert_with(|| serde_json::json!({}));
    }
    if !node.is_object() {
        *node = serde_json::json!({});
    }
    node.as_object_mut()
        .expect("just ensured object")
        .insert(last.clone(), value);
}

fn json_unset(root: &mut serde_json::Value, path: &[String]) {
    let (last, parents) = path.split_last().expect("path is non-empty");
    let mut node = root;
    for seg in parents {
        match node.get_mut(seg) {
            Some(next) => node = next,
            None => return,
        }
    }
    if let Some(map) = node.as_object_mut() {
        map.remove(last);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
