//! Bounded pool of open append-mode segment handles.
//!
//! Opening and seeking a file handle per append would be wasteful under
//! sustained write load; this keeps a small LRU of already-open handles,
//! keyed by segment path, and transparently reopens on eviction. The
//! `lru` crate does the bookkeeping — no reason to hand-roll an LRU map.

use std::fs::{File, OpenOptions};
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::warn;

pub struct HandlePool {
    inner: Mutex<LruCache<PathBuf, File>>,
}

impl HandlePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Run `f` with a write handle for `segment_path`, opening (and
    /// caching) it on a miss. Callers must already hold the stream's
    /// per-path write lock.
    pub fn with_write<F, R>(&self, segment_path: &Path, f: F) -> io::Result<R>
    where
        F: FnOnce(&mut File) -> io::Result<R>,
    {
        let mut guard = self.inner.lock();
        if !guard.contains(segment_path) {
            let file = OpenOptions::new().append(true).open(segment_path)?;
            if let Some((evicted_path, evicted)) = guard.push(segment_path.to_path_buf(), file) {
                if evicted_path != segment_path {
                    close_evicted(&evicted_path, evicted);
                }
            }
        }
        let handle = guard.get_mut(segment_path).expect("handle inserted above");
        f(handle)
    }

    /// Explicitly fsync the cached handle for a path, if one is open.
    pub fn fsync(&self, segment_path: &Path) -> io::Result<()> {
        let mut guard = self.inner.lock();
        if let Some(handle) = guard.get_mut(segment_path) {
            handle.sync_all()?;
        }
        Ok(())
    }

    /// Drop the cached handle for a path, e.g. after the stream is deleted
    /// or expired, so the eventual directory unlink doesn't race an open fd.
    pub fn evict(&self, segment_path: &Path) {
        if let Some(handle) = self.inner.lock().pop(segment_path) {
            close_evicted(segment_path, handle);
        }
    }

    pub fn close_all(&self) {
        self.inner.lock().clear();
    }
}

fn close_evicted(path: &Path, mut handle: File) {
    if let Err(err) = handle.sync_all() {
        warn!(path = %path.display(), error = %err, "fsync on evicted handle failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::TempDir;

    #[test]
    fn opens_and_caches_a_handle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        File::create(&path).unwrap();

        let pool = HandlePool::new(2);
        pool.with_write(&path, |h| h.write_all(b"hi")).unwrap();
        pool.with_write(&path, |h| h.write_all(b" there")).unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents, b"hi there");
    }

    #[test]
    fn evicts_beyond_capacity_without_losing_writes() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.log");
        let b = dir.path().join("b.log");
        let c = dir.path().join("c.log");
        for p in [&a, &b, &c] {
            File::create(p).unwrap();
        }

        let pool = HandlePool::new(2);
        pool.with_write(&a, |h| h.write_all(b"a")).unwrap();
        pool.with_write(&b, |h| h.write_all(b"b")).unwrap();
        pool.with_write(&c, |h| h.write_all(b"c")).unwrap(); // evicts a
        pool.with_write(&a, |h| h.write_all(b"a2")).unwrap(); // reopens a, appends

        assert_eq!(std::fs::read(&a).unwrap(), b"aa2");
        assert_eq!(std::fs::read(&b).unwrap(), b"b");
        assert_eq!(std::fs::read(&c).unwrap(), b"c");
    }
}
