use log::{debug, warn};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{FileMetaError, FileMetaResult, FileMetaStore, FileMetadataRecord, InodeId};

const NEXT_INODE_KEY: &str = "next_inode";

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn map_db_err(context: &str) -> impl Fn(rusqlite::Error) -> FileMetaError + '_ {
    move |e| {
        warn!("FileMetaDB: {} failed! {}", context, e);
        FileMetaError::DbError(format!("{} failed: {}", context, e))
    }
}

/// SQLite backed [`FileMetaStore`]. One connection, serialized by a mutex.
pub struct FileMetaDB {
    conn: Mutex<Connection>,
}

impl FileMetaDB {
    pub fn new(db_path: impl AsRef<Path>) -> FileMetaResult<Self> {
        let db_path = db_path.as_ref().to_string_lossy().to_string();
        debug!("FileMetaDB: open db path: {}", db_path);
        let conn = Connection::open_with_flags(
            &db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .map_err(map_db_err("open db"))?;
        Self::init_connection(&conn)?;
        Self::create_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_connection(conn: &Connection) -> FileMetaResult<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(map_db_err("pragma"))
    }

    fn create_schema(conn: &Connection) -> FileMetaResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                k TEXT PRIMARY KEY,
                v_int INTEGER
            ) WITHOUT ROWID;

            CREATE TABLE IF NOT EXISTS file_metadata (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL,
                inode INTEGER NOT NULL,
                link_count INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_file_metadata_name ON file_metadata(file_name);
            CREATE INDEX IF NOT EXISTS idx_file_metadata_inode ON file_metadata(inode);",
        )
        .map_err(map_db_err("create schema"))
    }

    fn lock_conn(&self) -> FileMetaResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| FileMetaError::Internal(format!("conn lock poisoned: {}", e)))
    }

    fn parse_record(row: &Row<'_>) -> rusqlite::Result<FileMetadataRecord> {
        Ok(FileMetadataRecord {
            id: Some(row.get::<_, i64>(0)? as u64),
            file_name: row.get(1)?,
            inode: row.get::<_, i64>(2)? as u64,
            link_count: row.get(3)?,
        })
    }

    fn save_with_conn(
        conn: &Connection,
        record: &FileMetadataRecord,
    ) -> FileMetaResult<FileMetadataRecord> {
        let now = unix_timestamp() as i64;
        match record.id {
            None => {
                conn.execute(
                    "INSERT INTO file_metadata (file_name, inode, link_count, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        record.file_name,
                        record.inode as i64,
                        record.link_count,
                        now,
                        now
                    ],
                )
                .map_err(map_db_err("insert file_metadata"))?;
                let mut saved = record.clone();
                saved.id = Some(conn.last_insert_rowid() as u64);
                Ok(saved)
            }
            Some(id) => {
                let changed = conn
                    .execute(
                        "UPDATE file_metadata SET file_name = ?1, inode = ?2, link_count = ?3, updated_at = ?4
                         WHERE id = ?5",
                        params![
                            record.file_name,
                            record.inode as i64,
                            record.link_count,
                            now,
                            id as i64
                        ],
                    )
                    .map_err(map_db_err("update file_metadata"))?;
                if changed == 0 {
                    return Err(FileMetaError::NotFound(format!(
                        "record id {} ({})",
                        id, record.file_name
                    )));
                }
                Ok(record.clone())
            }
        }
    }

    /// Number of records sharing `inode`.
    #[cfg(test)]
    pub(crate) fn count_by_inode(&self, inode: InodeId) -> FileMetaResult<u64> {
        let conn = self.lock_conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM file_metadata WHERE inode = ?1",
                params![inode as i64],
                |row| row.get(0),
            )
            .map_err(map_db_err("count by inode"))?;
        Ok(count as u64)
    }
}

impl FileMetaStore for FileMetaDB {
    fn save(&self, record: &FileMetadataRecord) -> FileMetaResult<FileMetadataRecord> {
        let conn = self.lock_conn()?;
        Self::save_with_conn(&conn, record)
    }

    fn save_all(&self, records: &[FileMetadataRecord]) -> FileMetaResult<Vec<FileMetadataRecord>> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction().map_err(map_db_err("begin txn"))?;
        let mut saved = Vec::with_capacity(records.len());
        for record in records {
            // dropping tx on error rolls the batch back
            saved.push(Self::save_with_conn(&tx, record)?);
        }
        tx.commit().map_err(map_db_err("commit txn"))?;
        Ok(saved)
    }

    fn find_by_file_name(&self, file_name: &str) -> FileMetaResult<Option<FileMetadataRecord>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT id, file_name, inode, link_count FROM file_metadata
             WHERE file_name = ?1 ORDER BY id LIMIT 1",
            params![file_name],
            Self::parse_record,
        )
        .optional()
        .map_err(map_db_err("query by file_name"))
    }

    fn find_by_inode(&self, inode: InodeId) -> FileMetaResult<Option<FileMetadataRecord>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT id, file_name, inode, link_count FROM file_metadata
             WHERE inode = ?1 ORDER BY id LIMIT 1",
            params![inode as i64],
            Self::parse_record,
        )
        .optional()
        .map_err(map_db_err("query by inode"))
    }

    fn delete(&self, record: &FileMetadataRecord) -> FileMetaResult<()> {
        let id = record.id.ok_or_else(|| {
            FileMetaError::InvalidParam(format!("record {} was never saved", record.file_name))
        })?;
        let conn = self.lock_conn()?;
        let changed = conn
            .execute("DELETE FROM file_metadata WHERE id = ?1", params![id as i64])
            .map_err(map_db_err("delete file_metadata"))?;
        if changed == 0 {
            return Err(FileMetaError::NotFound(format!(
                "record id {} ({})",
                id, record.file_name
            )));
        }
        Ok(())
    }

    fn alloc_inode(&self) -> FileMetaResult<InodeId> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction().map_err(map_db_err("begin txn"))?;
        // seed above any inode already on disk
        tx.execute(
            "INSERT OR IGNORE INTO kv (k, v_int)
             VALUES (?1, (SELECT COALESCE(MAX(inode), 0) + 1 FROM file_metadata))",
            params![NEXT_INODE_KEY],
        )
        .map_err(map_db_err("seed inode counter"))?;
        let inode: i64 = tx
            .query_row(
                "SELECT v_int FROM kv WHERE k = ?1",
                params![NEXT_INODE_KEY],
                |row| row.get(0),
            )
            .map_err(map_db_err("read inode counter"))?;
        tx.execute(
            "UPDATE kv SET v_int = v_int + 1 WHERE k = ?1",
            params![NEXT_INODE_KEY],
        )
        .map_err(map_db_err("bump inode counter"))?;
        tx.commit().map_err(map_db_err("commit txn"))?;
        Ok(inode as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_insert_then_update() {
        let dir = tempdir().unwrap();
        let db = FileMetaDB::new(dir.path().join("meta.db")).unwrap();

        let saved = db.save(&FileMetadataRecord::new("a", 100)).unwrap();
        assert!(saved.id.is_some());
        assert_eq!(saved.link_count, 1);

        let mut updated = saved.clone();
        updated.link_count = 3;
        db.save(&updated).unwrap();

        let loaded = db.find_by_file_name("a").unwrap().unwrap();
        assert_eq!(loaded.id, saved.id);
        assert_eq!(loaded.link_count, 3);
    }

    #[test]
    fn test_update_missing_id_is_not_found() {
        let dir = tempdir().unwrap();
        let db = FileMetaDB::new(dir.path().join("meta.db")).unwrap();
        let mut ghost = FileMetadataRecord::new("ghost", 1);
        ghost.id = Some(999);
        let err = db.save(&ghost).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_find_by_name_and_inode() {
        let dir = tempdir().unwrap();
        let db = FileMetaDB::new(dir.path().join("meta.db")).unwrap();
        db.save(&FileMetadataRecord::new("a", 5)).unwrap();
        db.save(&FileMetadataRecord::new("b", 5)).unwrap();

        assert!(db.find_by_file_name("missing").unwrap().is_none());
        assert!(db.find_by_inode(6).unwrap().is_none());

        let by_inode = db.find_by_inode(5).unwrap().unwrap();
        assert_eq!(by_inode.file_name, "a");
        assert_eq!(db.count_by_inode(5).unwrap(), 2);
    }

    #[test]
    fn test_duplicate_names_return_oldest() {
        let dir = tempdir().unwrap();
        let db = FileMetaDB::new(dir.path().join("meta.db")).unwrap();
        let first = db.save(&FileMetadataRecord::new("dup", 1)).unwrap();
        db.save(&FileMetadataRecord::new("dup", 2)).unwrap();
        let found = db.find_by_file_name("dup").unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert_eq!(found.inode, 1);
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let db = FileMetaDB::new(dir.path().join("meta.db")).unwrap();
        let saved = db.save(&FileMetadataRecord::new("a", 1)).unwrap();
        db.delete(&saved).unwrap();
        assert!(db.find_by_file_name("a").unwrap().is_none());

        assert!(db.delete(&saved).unwrap_err().is_not_found());
        let unsaved = FileMetadataRecord::new("b", 2);
        assert!(matches!(
            db.delete(&unsaved),
            Err(FileMetaError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_save_all_rolls_back_on_error() {
        let dir = tempdir().unwrap();
        let db = FileMetaDB::new(dir.path().join("meta.db")).unwrap();
        let mut ghost = FileMetadataRecord::new("ghost", 1);
        ghost.id = Some(42);

        let result = db.save_all(&[FileMetadataRecord::new("fresh", 1), ghost]);
        assert!(result.is_err());
        assert!(db.find_by_file_name("fresh").unwrap().is_none());

        let saved = db
            .save_all(&[
                FileMetadataRecord::new("x", 3),
                FileMetadataRecord::new("y", 3),
            ])
            .unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().all(|r| r.id.is_some()));
    }

    #[test]
    fn test_alloc_inode_unique_and_persistent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("meta.db");
        let last = {
            let db = FileMetaDB::new(&db_path).unwrap();
            let a = db.alloc_inode().unwrap();
            let b = db.alloc_inode().unwrap();
            assert!(b > a);
            b
        };

        let db = FileMetaDB::new(&db_path).unwrap();
        assert!(db.alloc_inode().unwrap() > last);
    }

    #[test]
    fn test_alloc_inode_seeds_above_existing() {
        let dir = tempdir().unwrap();
        let db = FileMetaDB::new(dir.path().join("meta.db")).unwrap();
        db.save(&FileMetadataRecord::new("legacy", 1_700_000_000_000))
            .unwrap();
        assert_eq!(db.alloc_inode().unwrap(), 1_700_000_000_001);
    }
}
