//! Database handle, transactions, buckets and cursors.

use crate::error::{StorageError, StorageResult};
use crate::file;
use crate::snapshot::{BucketMap, Snapshot};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long `open` waits for the exclusive file lock before failing.
const LOCK_TIMEOUT: Duration = Duration::from_secs(1);
/// Poll interval while waiting for the file lock.
const LOCK_RETRY: Duration = Duration::from_millis(50);

/// A single-file ordered key-value store.
///
/// The handle is cheap to clone and safe to share across threads. All
/// access goes through closure-scoped transactions: [`Database::select`]
/// for reads, [`Database::update`] for writes.
#[derive(Debug, Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    location: Location,
    /// The latest committed snapshot, shared with running readers.
    state: RwLock<Arc<Snapshot>>,
    /// Serializes write transactions: at most one in flight.
    writer: Mutex<()>,
}

#[derive(Debug)]
enum Location {
    File {
        path: PathBuf,
        /// Held for the lifetime of the handle; releasing it frees the
        /// store for other processes.
        _lock: File,
    },
    Memory,
}

impl Database {
    /// Opens or creates the store at `path`.
    ///
    /// Acquires an exclusive lock on a sibling `<path>.lock` file,
    /// waiting up to a bounded deadline for another process to release
    /// it.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Locked`] if another process holds the lock past
    ///   the deadline
    /// - [`StorageError::Corrupted`] if the existing file fails to parse
    /// - [`StorageError::Io`] for file-system failures
    pub fn open(path: &Path) -> StorageResult<Self> {
        let lock = acquire_lock(path)?;
        let snapshot = file::read_snapshot(path)?;
        debug!(path = %path.display(), buckets = snapshot.iter().count(), "store opened");

        Ok(Self {
            shared: Arc::new(Shared {
                location: Location::File {
                    path: path.to_path_buf(),
                    _lock: lock,
                },
                state: RwLock::new(Arc::new(snapshot)),
                writer: Mutex::new(()),
            }),
        })
    }

    /// Creates an ephemeral in-memory store, primarily for tests.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            shared: Arc::new(Shared {
                location: Location::Memory,
                state: RwLock::new(Arc::new(Snapshot::default())),
                writer: Mutex::new(()),
            }),
        }
    }

    /// Returns the store location (`:memory:` for ephemeral stores).
    #[must_use]
    pub fn location(&self) -> String {
        match &self.shared.location {
            Location::File { path, .. } => path.display().to_string(),
            Location::Memory => ":memory:".to_owned(),
        }
    }

    /// Runs a read-only transaction.
    ///
    /// The closure sees a consistent snapshot as of transaction start
    /// and never blocks, or is blocked by, the writer.
    ///
    /// # Errors
    ///
    /// Propagates whatever the closure returns.
    pub fn select<T, E>(&self, f: impl FnOnce(&Transaction) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let snapshot = (**self.shared.state.read()).clone();
        let tx = Transaction::new(snapshot, false);
        f(&tx)
    }

    /// Runs a read-write transaction.
    ///
    /// Writers are serialized: the call blocks until any previous write
    /// transaction commits or rolls back. On closure success the new
    /// snapshot is made durable and published atomically; on closure
    /// error nothing is applied.
    ///
    /// # Errors
    ///
    /// Propagates the closure's error, or the commit failure converted
    /// through `E::from`.
    pub fn update<T, E>(&self, f: impl FnOnce(&Transaction) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let _guard = self.shared.writer.lock();
        let snapshot = (**self.shared.state.read()).clone();
        let tx = Transaction::new(snapshot, true);
        let out = f(&tx)?;

        let snapshot = tx.into_snapshot();
        if let Location::File { path, .. } = &self.shared.location {
            file::write_snapshot(path, &snapshot).map_err(E::from)?;
        }
        *self.shared.state.write() = Arc::new(snapshot);
        Ok(out)
    }
}

/// An atomic view of the store, read-only or read-write.
///
/// Transactions are handed to the closures of [`Database::select`] and
/// [`Database::update`] and never outlive them.
#[derive(Debug)]
pub struct Transaction {
    snapshot: RefCell<Snapshot>,
    writable: bool,
}

impl Transaction {
    fn new(snapshot: Snapshot, writable: bool) -> Self {
        Self {
            snapshot: RefCell::new(snapshot),
            writable,
        }
    }

    fn into_snapshot(self) -> Snapshot {
        self.snapshot.into_inner()
    }

    /// Returns a handle to the bucket at the given path, e.g.
    /// `tx.bucket(&["Data", "User"])`.
    ///
    /// The bucket need not exist yet: reads behave as empty, and the
    /// first write creates it.
    #[must_use]
    pub fn bucket(&self, names: &[&str]) -> Bucket<'_> {
        Bucket {
            tx: self,
            path: Snapshot::path_of(names),
        }
    }

    /// Removes the bucket at the given path together with every bucket
    /// nested below it.
    ///
    /// # Errors
    ///
    /// [`StorageError::ReadOnly`] inside a read-only transaction.
    pub fn drop_bucket(&self, names: &[&str]) -> StorageResult<()> {
        if !self.writable {
            return Err(StorageError::ReadOnly);
        }
        self.snapshot
            .borrow_mut()
            .drop_bucket(&Snapshot::path_of(names));
        Ok(())
    }

    fn get(&self, path: &str, key: &[u8]) -> Option<Vec<u8>> {
        self.snapshot
            .borrow()
            .bucket(path)
            .and_then(|map| map.get(key).cloned())
    }

    fn put(&self, path: &str, key: &[u8], value: &[u8]) -> StorageResult<()> {
        if !self.writable {
            return Err(StorageError::ReadOnly);
        }
        self.snapshot
            .borrow_mut()
            .bucket_mut(path)
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, path: &str, key: &[u8]) -> StorageResult<()> {
        if !self.writable {
            return Err(StorageError::ReadOnly);
        }
        self.snapshot.borrow_mut().bucket_mut(path).remove(key);
        Ok(())
    }

    fn bucket_map(&self, path: &str) -> Arc<BucketMap> {
        self.snapshot
            .borrow()
            .bucket(path)
            .cloned()
            .unwrap_or_default()
    }
}

/// A named, ordered namespace of keys within a transaction.
#[derive(Debug)]
pub struct Bucket<'tx> {
    tx: &'tx Transaction,
    path: String,
}

impl<'tx> Bucket<'tx> {
    /// Returns a handle to a nested bucket.
    #[must_use]
    pub fn bucket(&self, names: &[&str]) -> Bucket<'tx> {
        let mut path = self.path.clone();
        for name in names {
            path.push('/');
            path.push_str(name);
        }
        Bucket { tx: self.tx, path }
    }

    /// Returns a copy of the value stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.tx.get(&self.path, key)
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// [`StorageError::ReadOnly`] inside a read-only transaction.
    pub fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.tx.put(&self.path, key, value)
    }

    /// Removes `key` if present; removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// [`StorageError::ReadOnly`] inside a read-only transaction.
    pub fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.tx.delete(&self.path, key)
    }

    /// Creates a cursor over the bucket's keys in lexicographic order.
    ///
    /// The cursor iterates the bucket as of cursor creation; writes made
    /// afterwards in the same transaction are not observed by it.
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        Cursor {
            map: self.tx.bucket_map(&self.path),
            pos: Pos::Start,
        }
    }
}

#[derive(Debug)]
enum Pos {
    Start,
    At(Vec<u8>),
    End,
}

/// Ordered iterator over a bucket's key range.
///
/// All positioning methods return the `(key, value)` pair at the new
/// position, or `None` when the cursor moves past either end.
#[derive(Debug)]
pub struct Cursor {
    map: Arc<BucketMap>,
    pos: Pos,
}

impl Cursor {
    /// Moves to the first key.
    pub fn first(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        self.settle(self.map.iter().next().map(clone_pair))
    }

    /// Moves to the last key.
    pub fn last(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        self.settle(self.map.iter().next_back().map(clone_pair))
    }

    /// Moves to the next key after the current position.
    ///
    /// Before any positioning call this behaves like [`Cursor::first`];
    /// after exhaustion it keeps returning `None`.
    pub fn next(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        let entry = match &self.pos {
            Pos::Start => self.map.iter().next().map(clone_pair),
            Pos::At(key) => self
                .map
                .range::<Vec<u8>, _>((
                    std::ops::Bound::Excluded(key.clone()),
                    std::ops::Bound::Unbounded,
                ))
                .next()
                .map(clone_pair),
            Pos::End => None,
        };
        self.settle(entry)
    }

    /// Moves to the previous key before the current position.
    pub fn prev(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        let entry = match &self.pos {
            Pos::Start => None,
            Pos::At(key) => self
                .map
                .range::<Vec<u8>, _>((
                    std::ops::Bound::Unbounded,
                    std::ops::Bound::Excluded(key.clone()),
                ))
                .next_back()
                .map(clone_pair),
            Pos::End => self.map.iter().next_back().map(clone_pair),
        };
        let exhausted_backwards = entry.is_none();
        let out = self.settle(entry);
        if exhausted_backwards {
            self.pos = Pos::Start;
        }
        out
    }

    /// Moves to the first key greater than or equal to `key`.
    pub fn seek(&mut self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        let entry = self
            .map
            .range::<[u8], _>((std::ops::Bound::Included(key), std::ops::Bound::Unbounded))
            .next()
            .map(clone_pair);
        self.settle(entry)
    }

    fn settle(&mut self, entry: Option<(Vec<u8>, Vec<u8>)>) -> Option<(Vec<u8>, Vec<u8>)> {
        match &entry {
            Some((key, _)) => self.pos = Pos::At(key.clone()),
            None => self.pos = Pos::End,
        }
        entry
    }
}

fn clone_pair((key, value): (&Vec<u8>, &Vec<u8>)) -> (Vec<u8>, Vec<u8>) {
    (key.clone(), value.clone())
}

fn acquire_lock(path: &Path) -> StorageResult<File> {
    let lock_path = lock_path_for(path);
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;

    let deadline = Instant::now() + LOCK_TIMEOUT;
    loop {
        if lock_file.try_lock_exclusive().is_ok() {
            return Ok(lock_file);
        }
        if Instant::now() >= deadline {
            return Err(StorageError::Locked);
        }
        std::thread::sleep(LOCK_RETRY);
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let db = Database::memory();
        db.update::<_, StorageError>(|tx| {
            let b = tx.bucket(&["Data", "User"]);
            b.put(b"k1", b"v1")?;
            b.put(b"k2", b"v2")?;
            b.delete(b"k1")?;
            Ok(())
        })
        .unwrap();

        db.select::<_, StorageError>(|tx| {
            let b = tx.bucket(&["Data", "User"]);
            assert_eq!(b.get(b"k1"), None);
            assert_eq!(b.get(b"k2"), Some(b"v2".to_vec()));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn delete_missing_key_succeeds() {
        let db = Database::memory();
        db.update::<_, StorageError>(|tx| tx.bucket(&["Data", "User"]).delete(b"missing"))
            .unwrap();
    }

    #[test]
    fn read_only_transaction_rejects_writes() {
        let db = Database::memory();
        let err = db
            .select::<_, StorageError>(|tx| tx.bucket(&["Data", "User"]).put(b"k", b"v"))
            .unwrap_err();
        assert!(matches!(err, StorageError::ReadOnly));
    }

    #[test]
    fn failed_update_leaves_no_trace() {
        let db = Database::memory();
        let result = db.update::<(), StorageError>(|tx| {
            tx.bucket(&["Data", "User"]).put(b"k", b"v")?;
            Err(StorageError::Corrupted("synthetic".into()))
        });
        assert!(result.is_err());

        db.select::<_, StorageError>(|tx| {
            assert_eq!(tx.bucket(&["Data", "User"]).get(b"k"), None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn cursor_navigation() {
        let db = Database::memory();
        db.update::<_, StorageError>(|tx| {
            let b = tx.bucket(&["Data", "Item"]);
            for key in [b"a", b"c", b"e"] {
                b.put(key, b"v")?;
            }
            Ok(())
        })
        .unwrap();

        db.select::<_, StorageError>(|tx| {
            let mut c = tx.bucket(&["Data", "Item"]).cursor();
            assert_eq!(c.first().unwrap().0, b"a");
            assert_eq!(c.next().unwrap().0, b"c");
            assert_eq!(c.next().unwrap().0, b"e");
            assert_eq!(c.next(), None);
            assert_eq!(c.next(), None);

            assert_eq!(c.last().unwrap().0, b"e");
            assert_eq!(c.prev().unwrap().0, b"c");
            assert_eq!(c.prev().unwrap().0, b"a");
            assert_eq!(c.prev(), None);

            assert_eq!(c.seek(b"b").unwrap().0, b"c");
            assert_eq!(c.seek(b"c").unwrap().0, b"c");
            assert_eq!(c.seek(b"f"), None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn cursor_on_missing_bucket_is_empty() {
        let db = Database::memory();
        db.select::<_, StorageError>(|tx| {
            let mut c = tx.bucket(&["Data", "Nothing"]).cursor();
            assert_eq!(c.first(), None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn readers_see_snapshot_not_later_writes() {
        let db = Database::memory();
        db.update::<_, StorageError>(|tx| tx.bucket(&["Data", "User"]).put(b"k", b"old"))
            .unwrap();

        db.select::<_, StorageError>(|tx| {
            let before = tx.bucket(&["Data", "User"]).get(b"k");

            // A writer commits while this reader is still running.
            db.update::<_, StorageError>(|wtx| tx_put(wtx, b"k", b"new"))
                .unwrap();

            let after = tx.bucket(&["Data", "User"]).get(b"k");
            assert_eq!(before, after);
            assert_eq!(before, Some(b"old".to_vec()));
            Ok(())
        })
        .unwrap();

        db.select::<_, StorageError>(|tx| {
            assert_eq!(tx.bucket(&["Data", "User"]).get(b"k"), Some(b"new".to_vec()));
            Ok(())
        })
        .unwrap();
    }

    fn tx_put(tx: &Transaction, key: &[u8], value: &[u8]) -> StorageResult<()> {
        tx.bucket(&["Data", "User"]).put(key, value)
    }

    #[test]
    fn concurrent_writers_are_serialized() {
        let db = Database::memory();
        db.update::<_, StorageError>(|tx| tx.bucket(&["Data", "Counter"]).put(b"n", b"0"))
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let db = db.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    db.update::<_, StorageError>(|tx| {
                        let b = tx.bucket(&["Data", "Counter"]);
                        let n: u64 = String::from_utf8(b.get(b"n").unwrap())
                            .unwrap()
                            .parse()
                            .unwrap();
                        b.put(b"n", (n + 1).to_string().as_bytes())
                    })
                    .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        db.select::<_, StorageError>(|tx| {
            let n = tx.bucket(&["Data", "Counter"]).get(b"n").unwrap();
            assert_eq!(n, b"100");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        {
            let db = Database::open(&path).unwrap();
            db.update::<_, StorageError>(|tx| tx.bucket(&["Data", "User"]).put(b"k", b"v"))
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        db.select::<_, StorageError>(|tx| {
            assert_eq!(tx.bucket(&["Data", "User"]).get(b"k"), Some(b"v".to_vec()));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn second_open_fails_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        let _db = Database::open(&path).unwrap();
        let err = Database::open(&path).unwrap_err();
        assert!(matches!(err, StorageError::Locked));
    }

    #[test]
    fn corrupt_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        std::fs::write(&path, b"not a roost file at all").unwrap();

        let err = Database::open(&path).unwrap_err();
        assert!(matches!(err, StorageError::Corrupted(_)));
    }

    #[test]
    fn location_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let db = Database::open(&path).unwrap();
        assert_eq!(db.location(), path.display().to_string());
        assert_eq!(Database::memory().location(), ":memory:");
    }

    #[test]
    fn drop_bucket_only_in_write_transaction() {
        let db = Database::memory();
        let err = db
            .select::<_, StorageError>(|tx| tx.drop_bucket(&["Index"]))
            .unwrap_err();
        assert!(matches!(err, StorageError::ReadOnly));
    }
}
