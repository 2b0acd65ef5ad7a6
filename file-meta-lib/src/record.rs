use serde::{Deserialize, Serialize};

pub type RecordId = u64;
pub type InodeId = u64;

/// One name entry. Records that are hard links of each other share `inode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadataRecord {
    /// Assigned by the store on first save, `None` before that.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<RecordId>,
    pub file_name: String,
    pub inode: InodeId,
    pub link_count: u32,
}

impl FileMetadataRecord {
    pub fn new(file_name: &str, inode: InodeId) -> Self {
        Self {
            id: None,
            file_name: file_name.to_string(),
            inode,
            link_count: 1,
        }
    }

    /// Unsaved record for a new name pointing at this record's inode.
    pub fn new_link(&self, file_name: &str) -> Self {
        Self {
            id: None,
            file_name: file_name.to_string(),
            inode: self.inode,
            link_count: self.link_count + 1,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}
