use log::{debug, info, warn};
use std::sync::{Arc, Mutex};

use crate::{FileMetaError, FileMetaResult, FileMetaStore, FileMetadataRecord, InodeId};

/// Business rules for name records: create, hard link, unlink.
///
/// Holds nothing but the store handle and a write lock. The lock is taken on
/// the blocking thread that runs a whole lookup/modify/save sequence, so it
/// stays held until the sequence finishes even if the caller's future is
/// dropped half way.
pub struct FileMetaService {
    store: Arc<dyn FileMetaStore>,
    write_lock: Arc<Mutex<()>>,
}

// Any string is a name; only the empty one is refused.
fn validate_file_name(file_name: &str) -> FileMetaResult<()> {
    if file_name.is_empty() {
        return Err(FileMetaError::InvalidParam(
            "file name must not be empty".to_string(),
        ));
    }
    Ok(())
}

impl FileMetaService {
    pub fn new(store: Arc<dyn FileMetaStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn with_store<T, F>(&self, f: F) -> FileMetaResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn FileMetaStore) -> FileMetaResult<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| FileMetaError::Internal(format!("db task join failed: {}", e)))?
    }

    /// `with_store` with the write lock held for the whole closure.
    async fn with_store_locked<T, F>(&self, f: F) -> FileMetaResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn FileMetaStore) -> FileMetaResult<T> + Send + 'static,
    {
        let write_lock = self.write_lock.clone();
        self.with_store(move |store| {
            let _guard = write_lock
                .lock()
                .map_err(|e| FileMetaError::Internal(format!("write lock poisoned: {}", e)))?;
            f(store)
        })
        .await
    }

    pub async fn create_file(&self, file_name: &str) -> FileMetaResult<FileMetadataRecord> {
        validate_file_name(file_name)?;
        let name = file_name.to_string();
        let record = self
            .with_store(move |store| {
                let inode = store.alloc_inode()?;
                store.save(&FileMetadataRecord::new(&name, inode))
            })
            .await?;
        info!(
            "create file {} -> inode {} (id {:?})",
            record.file_name, record.inode, record.id
        );
        Ok(record)
    }

    /// Add `new_file_name` as a hard link to `old_file_name`. The new record
    /// gets the old count plus one, and the old record is bumped to match.
    /// Other records on the same inode are left as they are.
    pub async fn link_file(
        &self,
        old_file_name: &str,
        new_file_name: &str,
    ) -> FileMetaResult<FileMetadataRecord> {
        validate_file_name(old_file_name)?;
        validate_file_name(new_file_name)?;
        let old_name = old_file_name.to_string();
        let new_name = new_file_name.to_string();

        let record = self
            .with_store_locked(move |store| {
                let old = store
                    .find_by_file_name(&old_name)?
                    .ok_or_else(|| FileMetaError::NotFound(old_name.clone()))?;
                let new_record = old.new_link(&new_name);
                let mut old_record = old;
                old_record.link_count += 1;
                store
                    .save_all(&[new_record, old_record])?
                    .into_iter()
                    .next()
                    .ok_or_else(|| FileMetaError::Internal("save_all returned nothing".to_string()))
            })
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    warn!("link {} -> {}: source not found", old_file_name, new_file_name);
                }
                e
            })?;
        info!(
            "link {} -> {} on inode {}, link_count {}",
            new_file_name, old_file_name, record.inode, record.link_count
        );
        Ok(record)
    }

    /// Drop one link from `file_name`. The record itself goes away only when
    /// its own count is 1.
    pub async fn delete_file(&self, file_name: &str) -> FileMetaResult<()> {
        validate_file_name(file_name)?;
        let name = file_name.to_string();

        let remaining = self
            .with_store_locked(move |store| {
                let mut record = store
                    .find_by_file_name(&name)?
                    .ok_or_else(|| FileMetaError::NotFound(name.clone()))?;
                if record.link_count > 1 {
                    record.link_count -= 1;
                    store.save(&record)?;
                    Ok(Some(record.link_count))
                } else {
                    store.delete(&record)?;
                    Ok(None)
                }
            })
            .await?;
        match remaining {
            Some(count) => info!("unlink {}: link_count now {}", file_name, count),
            None => info!("delete {}", file_name),
        }
        Ok(())
    }

    pub async fn stat_file(&self, file_name: &str) -> FileMetaResult<FileMetadataRecord> {
        validate_file_name(file_name)?;
        let name = file_name.to_string();
        debug!("stat {}", file_name);
        self.with_store(move |store| {
            store
                .find_by_file_name(&name)?
                .ok_or(FileMetaError::NotFound(name))
        })
        .await
    }

    pub async fn find_by_inode(&self, inode: InodeId) -> FileMetaResult<FileMetadataRecord> {
        debug!("lookup inode {}", inode);
        self.with_store(move |store| {
            store
                .find_by_inode(inode)?
                .ok_or_else(|| FileMetaError::NotFound(format!("inode {}", inode)))
        })
        .await
    }
}
