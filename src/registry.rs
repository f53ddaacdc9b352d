//! Registry of shared root directories.
//!
//! The registry owns two things: a SQLite table holding every root that was
//! ever shared, and an in-memory snapshot of the roots that currently exist.
//! Readers clone the snapshot `Arc` under a short read lock; writers build a
//! fresh vector and swap it in, so a reader never sees a half-applied change.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rusqlite::{params, Connection};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{ApiError, StoreError};
use crate::guard::{normalize, PathGuard};

/// Immutable view of the shared roots at one point in time.
pub type Snapshot = Arc<Vec<PathBuf>>;

/// SQLite persistence for shared roots.
pub struct ShareStore {
    conn: Connection,
}

impl ShareStore {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS shared_folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Every persisted path. Rows that cannot be decoded are skipped.
    pub fn paths(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT path FROM shared_folders ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut paths = Vec::new();
        for row in rows {
            match row {
                Ok(path) => paths.push(path),
                Err(e) => warn!("Failed to scan shared folder row: {}", e),
            }
        }
        Ok(paths)
    }

    /// Inserts `path`; a duplicate is ignored.
    pub fn insert(&self, path: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO shared_folders (path) VALUES (?1)",
            params![path],
        )?;
        Ok(())
    }

    /// Deletes `path`; deleting an absent path is not an error.
    pub fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM shared_folders WHERE path = ?1", params![path])?;
        Ok(())
    }

    /// Number of persisted rows.
    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM shared_folders", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

struct Inner {
    // Held for the whole of a write, which also serializes snapshot swaps.
    store: Mutex<ShareStore>,
    roots: RwLock<Snapshot>,
}

impl Inner {
    fn snapshot(&self) -> Snapshot {
        self.roots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, roots: Vec<PathBuf>) {
        *self.roots.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(roots);
    }

    fn add_blocking(&self, path: PathBuf) -> Result<(), StoreError> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        // Registered paths always come from request strings.
        store.insert(&path.to_string_lossy())?;

        let current = self.snapshot();
        if current.iter().any(|p| *p == path) {
            debug!("Folder {} already shared", path.display());
            return Ok(());
        }
        let mut next = current.as_ref().clone();
        next.push(path.clone());
        self.replace(next);
        info!("Added shared folder: {}", path.display());
        Ok(())
    }

    fn remove_blocking(&self, path: PathBuf) -> Result<(), StoreError> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.delete(&path.to_string_lossy())?;

        let current = self.snapshot();
        if current.iter().any(|p| *p == path) {
            let next = current.iter().filter(|p| **p != path).cloned().collect();
            self.replace(next);
            info!("Removed shared folder: {}", path.display());
        }
        Ok(())
    }
}

/// Cheap-to-clone handle to the shared roots.
#[derive(Clone)]
pub struct ShareRegistry {
    inner: Arc<Inner>,
}

impl ShareRegistry {
    /// Builds the registry from `store`, keeping only persisted roots that
    /// still exist as directories. Unreadable or stale rows are logged and
    /// dropped from memory; their rows stay in the table.
    pub fn load(store: ShareStore) -> Self {
        let persisted = match store.paths() {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Failed to load shared folders: {}", e);
                Vec::new()
            }
        };

        let mut roots: Vec<PathBuf> = Vec::new();
        for raw in persisted {
            let path = normalize(Path::new(&raw));
            if !path.is_absolute() {
                warn!("Ignoring non-absolute shared folder: {}", raw);
                continue;
            }
            match std::fs::metadata(&path) {
                Ok(meta) if meta.is_dir() => {
                    if !roots.contains(&path) {
                        info!("Loaded shared folder: {}", path.display());
                        roots.push(path);
                    }
                }
                Ok(_) => warn!("Shared folder {} is no longer a directory", path.display()),
                Err(e) => warn!("Shared folder {} is unavailable: {}", path.display(), e),
            }
        }
        info!("Loaded {} shared folders", roots.len());

        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(store),
                roots: RwLock::new(Arc::new(roots)),
            }),
        }
    }

    /// Current shared roots.
    pub fn list(&self) -> Snapshot {
        self.inner.snapshot()
    }

    /// True iff `path` (normalized) is exactly one of the shared roots.
    pub fn is_root(&self, path: &Path) -> bool {
        self.list().iter().any(|root| root == path)
    }

    /// Registers `path` as a shared root.
    ///
    /// The path must be absolute and name an existing directory. Sharing the
    /// same directory twice is a no-op.
    pub async fn add(&self, path: &str) -> Result<PathBuf, ApiError> {
        let path = PathGuard::absolute(path)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                warn!("Refusing to share non-directory {}", path.display());
                return Err(ApiError::InvalidPath(path));
            }
            Err(e) => {
                warn!("Invalid path {}: {}", path.display(), e);
                return Err(ApiError::InvalidPath(path));
            }
        }

        let inner = self.inner.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || inner.add_blocking(target))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))??;
        Ok(path)
    }

    /// Unregisters `path`. Removing a path that was never shared succeeds.
    pub async fn remove(&self, path: &str) -> Result<PathBuf, ApiError> {
        let path = PathGuard::absolute(path)?;

        let inner = self.inner.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || inner.remove_blocking(target))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))??;
        Ok(path)
    }

    /// Number of rows in the backing table.
    pub fn persisted_count(&self) -> Result<usize, StoreError> {
        self.inner
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .count()
    }
}
