use crate::CoreError;
use fs2::FileExt;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Cluster-wide lock: the outer tier of the two-tier locking discipline.
///
/// Every host-component operation holds it shared while it takes the entity's
/// own lock; structural deletion holds it exclusive. The entity lock is always
/// acquired after this one and released before it.
#[derive(Debug, Default)]
pub struct ClusterLock {
    lock: RwLock<()>,
}

impl ClusterLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    pub fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }
}

/// Exclusive advisory lock on a store directory, held across processes.
pub struct StoreLock {
    lock_file: File,
}

impl StoreLock {
    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        let file = open_lock_file(lock_path)?;

        file.lock_exclusive()
            .map_err(|e| CoreError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, e)))?;

        Ok(Self { lock_file: file })
    }

    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = open_lock_file(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File, CoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}
