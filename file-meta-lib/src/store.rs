use crate::{FileMetaResult, FileMetadataRecord, InodeId};

/// Durable table of name records. Implementations are blocking; the service
/// drives them from `spawn_blocking`.
///
/// The store enforces no name uniqueness. Lookups by name return the oldest
/// matching record.
pub trait FileMetaStore: Send + Sync {
    /// Insert when `record.id` is `None`, update otherwise.
    fn save(&self, record: &FileMetadataRecord) -> FileMetaResult<FileMetadataRecord>;

    /// Like `save`, for every record, all or nothing.
    fn save_all(&self, records: &[FileMetadataRecord]) -> FileMetaResult<Vec<FileMetadataRecord>>;

    fn find_by_file_name(&self, file_name: &str) -> FileMetaResult<Option<FileMetadataRecord>>;

    fn find_by_inode(&self, inode: InodeId) -> FileMetaResult<Option<FileMetadataRecord>>;

    fn delete(&self, record: &FileMetadataRecord) -> FileMetaResult<()>;

    /// Hand out an inode number never returned before by this store.
    fn alloc_inode(&self) -> FileMetaResult<InodeId>;
}
