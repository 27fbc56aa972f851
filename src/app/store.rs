// EnrolSift - app/store.rs
//
// Hierarchical key-value persistence backend for saved configurations.
//
// Architecture:
//   - `Backend` is the seam: read / write / update / delete / subscribe on
//     slash-separated paths into one JSON tree.
//   - `JsonStore<P>` implements it over an in-memory `serde_json::Value`.
//     `P` decides durability: `Volatile` keeps everything in memory,
//     `JsonFile` saves the whole document atomically after every mutation.
//   - Subscribers receive the full snapshot at their path: once on subscribe,
//     then after every mutation touching that path (ancestor or descendant).
//   - Each `Subscription` carries an `Arc<AtomicBool>` active flag; cancel or
//     drop clears it and the subscriber is pruned on the next notification.
//
// Callbacks always run after the document lock is released, so a callback
// may call back into the store.

use crate::platform::fs;
use crate::util::constants::{FORBIDDEN_SEGMENT_CHARS, MAX_STORE_PATH_DEPTH};
use crate::util::error::PersistenceError;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

// =============================================================================
// Paths
// =============================================================================

/// A validated path into the store, e.g. `/staff/u1/savedFilterConfigs`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// The root of the document.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a slash-separated path. Leading/trailing slashes are ignored.
    pub fn parse(path: &str) -> Result<Self, PersistenceError> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(Self::root(), |acc, seg| acc.child(seg))
    }

    /// Append one segment.
    pub fn child(&self, segment: &str) -> Result<Self, PersistenceError> {
        if !is_valid_segment(segment) {
            return Err(PersistenceError::InvalidPath {
                path: format!("{self}/{segment}"),
                reason: "segment is empty or contains a reserved character",
            });
        }
        if self.segments.len() >= MAX_STORE_PATH_DEPTH {
            return Err(PersistenceError::InvalidPath {
                path: format!("{self}/{segment}"),
                reason: "path is too deep",
            });
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn starts_with(&self, prefix: &StorePath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// True when a change at one path can alter the snapshot at the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for seg in &self.segments {
            write!(f, "/{seg}")?;
        }
        Ok(())
    }
}

/// Whether `segment` can be used as a single path component.
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.trim().is_empty()
        && !segment.chars().any(|c| c.is_control() || FORBIDDEN_SEGMENT_CHARS.contains(&c))
}

// =============================================================================
// Backend trait
// =============================================================================

/// Callback receiving the full snapshot at a subscribed path
/// (`None` when nothing is stored there).
pub type ChangeCallback = Box<dyn Fn(Option<&Value>) + Send + Sync>;

/// A hierarchical JSON key-value store.
pub trait Backend: Send + Sync {
    /// Value at `path`, or `None` if absent.
    fn read(&self, path: &StorePath) -> Result<Option<Value>, PersistenceError>;

    /// Replace the value at `path`, creating intermediate objects.
    /// Writing `null` removes the node.
    fn write(&self, path: &StorePath, value: Value) -> Result<(), PersistenceError>;

    /// Merge `partial` into the object at `path`, key by key.
    fn update(&self, path: &StorePath, partial: Map<String, Value>)
        -> Result<(), PersistenceError>;

    /// Remove the node at `path`. Removing an absent node is not an error.
    fn delete(&self, path: &StorePath) -> Result<(), PersistenceError>;

    /// Receive full snapshots of `path` until the returned handle is
    /// cancelled or dropped.
    fn subscribe(
        &self,
        path: &StorePath,
        on_change: ChangeCallback,
    ) -> Result<Subscription, PersistenceError>;
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Handle for a live subscription. Dropping it unsubscribes.
#[derive(Debug)]
#[must_use = "dropping a Subscription cancels it immediately"]
pub struct Subscription {
    path: StorePath,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Build a handle around an externally managed active flag.
    pub fn new(path: StorePath, active: Arc<AtomicBool>) -> Self {
        Self { path, active }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop receiving updates. Equivalent to dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            tracing::debug!(path = %self.path, "Subscription cancelled");
        }
    }
}

struct Subscriber {
    path: StorePath,
    active: Arc<AtomicBool>,
    callback: Arc<dyn Fn(Option<&Value>) + Send + Sync>,
}

/// Snapshot ready to deliver once the lock is released.
type Pending = (Arc<AtomicBool>, Arc<dyn Fn(Option<&Value>) + Send + Sync>, Option<Value>);

fn deliver(pending: Vec<Pending>) {
    for (active, callback, snapshot) in pending {
        // Re-check: the handle may have been dropped while we were collecting.
        if active.load(Ordering::SeqCst) {
            callback(snapshot.as_ref());
        }
    }
}

// =============================================================================
// Durability policies
// =============================================================================

/// Where a `JsonStore` keeps its document between mutations.
pub trait Durability: Send + Sync {
    /// Persist the full document after a mutation.
    fn persist(&self, document: &Value) -> Result<(), PersistenceError>;
}

/// Memory only. Nothing survives the process.
#[derive(Debug, Default)]
pub struct Volatile;

impl Durability for Volatile {
    fn persist(&self, _document: &Value) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// A single JSON file written atomically after every mutation.
#[derive(Debug)]
pub struct JsonFile {
    path: PathBuf,
}

impl Durability for JsonFile {
    fn persist(&self, document: &Value) -> Result<(), PersistenceError> {
        fs::write_json_atomic(&self.path, document)
    }
}

// =============================================================================
// JsonStore
// =============================================================================

/// In-memory JSON tree with pluggable durability.
pub struct JsonStore<D: Durability> {
    document: Mutex<Value>,
    subscribers: Mutex<Vec<Subscriber>>,
    durability: D,
}

/// Store that lives only as long as the process.
pub type MemoryBackend = JsonStore<Volatile>;

/// Store backed by one JSON file on disk.
pub type FileBackend = JsonStore<JsonFile>;

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_document(Value::Object(Map::new()), Volatile)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FileBackend {
    /// Open the store at `path`. A missing file starts an empty document;
    /// the file itself is created on the first mutation.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let document = fs::read_json::<Value>(path)?.unwrap_or_else(|| Value::Object(Map::new()));
        if !document.is_object() {
            return Err(PersistenceError::NotAnObject {
                path: path.display().to_string(),
            });
        }
        tracing::info!(path = %path.display(), "File store opened");
        Ok(Self::with_document(
            document,
            JsonFile {
                path: path.to_path_buf(),
            },
        ))
    }

    pub fn file_path(&self) -> &Path {
        &self.durability.path
    }
}

impl<D: Durability> JsonStore<D> {
    fn with_document(document: Value, durability: D) -> Self {
        Self {
            document: Mutex::new(document),
            subscribers: Mutex::new(Vec::new()),
            durability,
        }
    }

    fn lock_document(&self) -> MutexGuard<'_, Value> {
        self.document.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `op` to a copy of the document, persist it, then publish it and
    /// notify subscribers. On any failure the live document is untouched.
    fn mutate<F>(&self, path: &StorePath, op: F) -> Result<(), PersistenceError>
    where
        F: FnOnce(&mut Value) -> Result<(), PersistenceError>,
    {
        let pending = {
            let mut document = self.lock_document();
            let mut next = document.clone();
            op(&mut next)?;
            self.durability.persist(&next)?;
            *document = next;
            self.collect_pending(path, &document)
        };
        deliver(pending);
        Ok(())
    }

    fn collect_pending(&self, changed: &StorePath, document: &Value) -> Vec<Pending> {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|s| s.active.load(Ordering::SeqCst));
        subscribers
            .iter()
            .filter(|s| s.path.overlaps(changed))
            .map(|s| {
                (
                    Arc::clone(&s.active),
                    Arc::clone(&s.callback),
                    get(document, s.path.segments()).cloned(),
                )
            })
            .collect()
    }

    /// Number of live subscribers (after pruning cancelled ones).
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|s| s.active.load(Ordering::SeqCst));
        subscribers.len()
    }
}

impl<D: Durability> Backend for JsonStore<D> {
    fn read(&self, path: &StorePath) -> Result<Option<Value>, PersistenceError> {
        Ok(get(&self.lock_document(), path.segments()).cloned())
    }

    fn write(&self, path: &StorePath, value: Value) -> Result<(), PersistenceError> {
        self.mutate(path, |doc| set(doc, path, value))
    }

    fn update(
        &self,
        path: &StorePath,
        partial: Map<String, Value>,
    ) -> Result<(), PersistenceError> {
        self.mutate(path, |doc| {
            for (key, value) in partial {
                set(doc, &path.child(&key)?, value)?;
            }
            Ok(())
        })
    }

    fn delete(&self, path: &StorePath) -> Result<(), PersistenceError> {
        self.mutate(path, |doc| set(doc, path, Value::Null))
    }

    fn subscribe(
        &self,
        path: &StorePath,
        on_change: ChangeCallback,
    ) -> Result<Subscription, PersistenceError> {
        let active = Arc::new(AtomicBool::new(true));
        let callback: Arc<dyn Fn(Option<&Value>) + Send + Sync> = Arc::from(on_change);

        let initial = {
            let document = self.lock_document();
            self.lock_subscribers().push(Subscriber {
                path: path.clone(),
                active: Arc::clone(&active),
                callback: Arc::clone(&callback),
            });
            get(&document, path.segments()).cloned()
        };

        tracing::debug!(path = %path, "Subscription started");
        deliver(vec![(Arc::clone(&active), callback, initial)]);
        Ok(Subscription::new(path.clone(), active))
    }
}

// =============================================================================
// Tree operations
// =============================================================================

fn get<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |node, seg| node.as_object()?.get(seg))
        .filter(|v| !v.is_null())
}

/// Set (or with `Value::Null`, remove) the node at `path`.
fn set(root: &mut Value, path: &StorePath, value: Value) -> Result<(), PersistenceError> {
    let Some((last, parents)) = path.segments().split_last() else {
        *root = if value.is_null() {
            Value::Object(Map::new())
        } else {
            value
        };
        return Ok(());
    };

    let mut node = root;
    for seg in parents {
        let map = node.as_object_mut().ok_or_else(|| PersistenceError::NotAnObject {
            path: path.to_string(),
        })?;
        if value.is_null() && !map.contains_key(seg) {
            // Removing beneath a node that does not exist: nothing to do.
            return Ok(());
        }
        node = map
            .entry(seg.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let map = node.as_object_mut().ok_or_else(|| PersistenceError::NotAnObject {
        path: path.to_string(),
    })?;
    if value.is_null() {
        map.remove(last);
    } else {
        map.insert(last.clone(), value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn p(s: &str) -> StorePath {
        StorePath::parse(s).unwrap()
    }

    #[test]
    fn test_path_parsing_and_validation() {
        assert_eq!(p("/a/b/c").to_string(), "/a/b/c");
        assert_eq!(p("a/b/").segments().len(), 2);
        assert_eq!(StorePath::root().to_string(), "/");
        assert!(StorePath::parse("/a/b.c").is_err());
        assert!(StorePath::root().child("x[1]").is_err());
        assert!(StorePath::root().child(" ").is_err());
        assert!(p("/a/b").overlaps(&p("/a")));
        assert!(p("/a").overlaps(&p("/a/b/c")));
        assert!(!p("/a/b").overlaps(&p("/a/c")));
    }

    #[test]
    fn test_write_read_update_delete() {
        let store = MemoryBackend::new();
        store.write(&p("/staff/u1/name"), json!("Ada")).unwrap();
        assert_eq!(store.read(&p("/staff/u1")).unwrap(), Some(json!({"name": "Ada"})));

        let mut partial = Map::new();
        partial.insert("role".to_string(), json!("teacher"));
        store.update(&p("/staff/u1"), partial).unwrap();
        assert_eq!(
            store.read(&p("/staff/u1")).unwrap(),
            Some(json!({"name": "Ada", "role": "teacher"}))
        );

        store.delete(&p("/staff/u1/name")).unwrap();
        assert_eq!(store.read(&p("/staff/u1/name")).unwrap(), None);
        store.delete(&p("/nothing/here")).unwrap();
        assert_eq!(store.read(&p("/nothing")).unwrap(), None);
    }

    #[test]
    fn test_write_under_scalar_fails_without_change() {
        let store = MemoryBackend::new();
        store.write(&p("/a"), json!(5)).unwrap();
        let result = store.write(&p("/a/b"), json!(1));
        assert!(matches!(result, Err(PersistenceError::NotAnObject { .. })));
        assert_eq!(store.read(&p("/a")).unwrap(), Some(json!(5)));
    }

    #[test]
    fn test_subscription_receives_initial_and_changes_until_cancelled() {
        let store = MemoryBackend::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = store
            .subscribe(
                &p("/staff/u1"),
                Box::new(move |v| sink.lock().unwrap().push(v.cloned())),
            )
            .unwrap();

        store.write(&p("/staff/u1/x"), json!(1)).unwrap();
        store.write(&p("/staff/u2/x"), json!(2)).unwrap();
        store.write(&p("/staff"), json!({"u1": {"x": 3}})).unwrap();
        assert!(sub.is_active());
        sub.cancel();
        store.write(&p("/staff/u1/x"), json!(4)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![None, Some(json!({"x": 1})), Some(json!({"x": 3}))],
            "unrelated paths must not notify; cancelled handles must not fire"
        );
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_callback_may_reenter_store() {
        let store = Arc::new(MemoryBackend::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (inner, counter) = (Arc::clone(&store), Arc::clone(&calls));
        let _sub = store
            .subscribe(
                &p("/a"),
                Box::new(move |_| {
                    let _ = inner.read(&p("/a"));
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        store.write(&p("/a"), json!(1)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_file_backend_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        {
            let store = FileBackend::open(&path).unwrap();
            assert!(!path.exists(), "file is created lazily on first write");
            store.write(&p("/staff/u1/name"), json!("Ada")).unwrap();
        }
        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.file_path(), path.as_path());
        assert_eq!(reopened.read(&p("/staff/u1/name")).unwrap(), Some(json!("Ada")));
    }

    #[test]
    fn test_file_backend_rejects_non_object_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"[1, 2, 3]").unwrap();
        assert!(matches!(
            FileBackend::open(&path),
            Err(PersistenceError::NotAnObject { .. })
        ));
    }
}
