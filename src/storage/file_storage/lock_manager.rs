//! 按路径加锁
//!
//! 同一路径上的写操作互斥，不同路径互不影响。

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Default)]
pub struct LockManager {
    locks: DashMap<PathBuf, Arc<RwLock<()>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_lock(&self, path: &Path) -> Arc<RwLock<()>> {
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    pub async fn read(&self, path: &Path) -> OwnedRwLockReadGuard<()> {
        self.get_lock(path).read_owned().await
    }

    pub async fn write(&self, path: &Path) -> OwnedRwLockWriteGuard<()> {
        self.get_lock(path).write_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
