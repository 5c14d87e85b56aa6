//! Per-record writer sections
//!
//! Every mutation of a record, and every save or reload of its file, runs while
//! holding that record's section. Different records never block each other.
//! Callers that need several sections take them through [`RecordLockManager::ordered`]
//! so the acquisition order is always sorted by path.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared handle to one record's section.
pub type SectionLock = Arc<RwLock<()>>;

pub struct RecordLockManager {
    locks: RwLock<HashMap<PathBuf, SectionLock>>,
}

impl RecordLockManager {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the section for `path`.
    pub fn get_lock(&self, path: &Path) -> SectionLock {
        {
            let map = self.locks.read();
            if let Some(lock) = map.get(path) {
                return lock.clone();
            }
        }

        let mut map = self.locks.write();
        // Another thread may have created it between the two map locks.
        map.entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Sections for `paths`, deduplicated and sorted by path.
    pub fn ordered<'a, I>(&self, paths: I) -> Vec<SectionLock>
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        let unique: BTreeSet<&PathBuf> = paths.into_iter().collect();
        unique.into_iter().map(|p| self.get_lock(p)).collect()
    }

    /// Drop the section of a path that no longer names a record.
    pub fn forget(&self, path: &Path) {
        self.locks.write().remove(path);
    }
}

impl Default for RecordLockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_concurrent_reads() {
        let manager = Arc::new(RecordLockManager::new());
        let path = PathBuf::from("/takes/a.wav");
        let counter = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..10 {
            let manager = manager.clone();
            let counter = counter.clone();
            let path = path.clone();
            handles.push(thread::spawn(move || {
                let lock = manager.get_lock(&path);
                let _guard = lock.read();
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_write_excludes_other_writes() {
        let manager = Arc::new(RecordLockManager::new());
        let path = PathBuf::from("/takes/a.wav");
        let counter = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..5 {
            let manager = manager.clone();
            let counter = counter.clone();
            let path = path.clone();
            handles.push(thread::spawn(move || {
                let lock = manager.get_lock(&path);
                let _guard = lock.write();
                let current = counter.load(Ordering::SeqCst);
                thread::yield_now();
                counter.store(current + 1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        // No lost updates.
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_different_records_dont_block() {
        let manager = RecordLockManager::new();
        let a = manager.get_lock(Path::new("/takes/a.wav"));
        let b = manager.get_lock(Path::new("/takes/b.wav"));
        let _held = a.write();
        assert!(b.try_write().is_some());
        assert!(a.try_write().is_none());
    }

    #[test]
    fn test_ordered_dedups_and_shares_locks() {
        let manager = RecordLockManager::new();
        let a = PathBuf::from("/takes/a.wav");
        let b = PathBuf::from("/takes/b.wav");
        let locks = manager.ordered([&b, &a, &b]);
        assert_eq!(locks.len(), 2);
        assert!(Arc::ptr_eq(&locks[0], &manager.get_lock(&a)));
        assert!(Arc::ptr_eq(&locks[1], &manager.get_lock(&b)));
    }
}
