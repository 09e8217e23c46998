use std::io::Read;
use std::path::Path;
use std::time::Duration;

use kernel::{ContentEntry, DeleteResult, FileFilter, FileRecord, StorageStats, UploadResult};
use rusqlite::{Connection, Error, OpenFlags, TransactionBehavior};

use crate::content::{self, Release};
use crate::digest::{self, Captured, Fingerprint};
use crate::domain::{StagedUpload, Storage};
use crate::error::{DedupError, DedupResult};
use crate::{content_type, registry, stats};

const CACHE_SIZE: &str = "4096";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

pub enum Mode {
    ReadWrite,
    ReadOnly,
}

pub struct Sqlite {
    conn: Connection,
    max_upload_size: u64,
}

/// Creates tables and indexes when they don't exist yet.
pub fn create_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS content (
                  fingerprint      TEXT PRIMARY KEY,
                  data             BLOB NOT NULL,
                  size             INTEGER NOT NULL CHECK (size >= 0),
                  reference_count  INTEGER NOT NULL CHECK (reference_count > 0)
                  )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS file (
                  id            INTEGER PRIMARY KEY AUTOINCREMENT,
                  name          TEXT NOT NULL,
                  extension     TEXT NOT NULL,
                  content_type  TEXT NOT NULL,
                  created_at    INTEGER NOT NULL,
                  fingerprint   TEXT NOT NULL REFERENCES content(fingerprint) ON DELETE RESTRICT ON UPDATE RESTRICT
                  )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS file_fingerprint_ix ON file(fingerprint)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS file_created_at_ix ON file(created_at)",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS file_name_ix ON file(name)", [])?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS file_content_type_ix ON file(content_type)",
        [],
    )?;

    Ok(())
}

impl Storage for Sqlite {
    type Err = DedupError;

    fn new_database(&self) -> DedupResult<()> {
        self.pragma_update("encoding", "UTF-8")?;
        let journal_mode: String =
            self.conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("journal mode: {journal_mode}");
        create_schema(&self.conn)?;
        Ok(())
    }

    fn upload(
        &mut self,
        name: &str,
        content_type_hint: Option<&str>,
        data: &mut dyn Read,
    ) -> DedupResult<UploadResult> {
        // Hash and spool before touching the database so rejected or broken
        // uploads leave no trace.
        let captured = digest::capture(data, self.max_upload_size)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let uploaded = store(&tx, name, content_type_hint, captured)?;
        tx.commit()?;

        log_stored(&uploaded);
        Ok(uploaded)
    }

    fn upload_batch(&mut self, uploads: Vec<StagedUpload>) -> DedupResult<Vec<UploadResult>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut uploaded = Vec::with_capacity(uploads.len());
        for staged in uploads {
            uploaded.push(store(
                &tx,
                &staged.name,
                staged.content_type_hint.as_deref(),
                staged.captured,
            )?);
        }
        tx.commit()?;

        uploaded.iter().for_each(log_stored);
        Ok(uploaded)
    }

    fn delete_file(&mut self, id: i64) -> DedupResult<DeleteResult> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let fingerprint = registry::remove(&tx, id)?;
        let release = content::release(&tx, &fingerprint)?;

        tx.commit()?;

        let contents = match release {
            Release::Purged => 1,
            Release::Retained { .. } => 0,
        };
        tracing::info!("file: {id} deleted, content {fingerprint}: {release:?}");
        Ok(DeleteResult { files: 1, contents })
    }

    fn list_files(&mut self, filter: &FileFilter) -> DedupResult<Vec<FileRecord>> {
        Ok(registry::list(&self.conn, filter)?)
    }

    fn compute_stats(&mut self) -> DedupResult<StorageStats> {
        // A read transaction pins one snapshot for all aggregates.
        let tx = self.conn.transaction()?;
        let result = stats::compute(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    fn get_file_info(&mut self, id: i64) -> DedupResult<FileRecord> {
        registry::get(&self.conn, id)
    }

    fn get_file_data(&self, id: i64) -> DedupResult<Box<dyn Read + '_>> {
        let blob = registry::open_data(&self.conn, id)?;
        Ok(Box::new(blob))
    }

    fn get_content(&mut self, fingerprint: &str) -> DedupResult<Option<ContentEntry>> {
        let fingerprint: Fingerprint = fingerprint.parse()?;
        Ok(content::find(&self.conn, &fingerprint)?)
    }
}

/// Links captured bytes to a new record. Runs inside the caller's transaction.
fn store(
    conn: &Connection,
    name: &str,
    content_type_hint: Option<&str>,
    mut captured: Captured,
) -> DedupResult<UploadResult> {
    let content_type = content_type::resolve(name, content_type_hint);
    let (entry, created) = content::get_or_create(
        conn,
        &captured.fingerprint,
        &mut captured.payload,
        captured.size,
    )?;
    let record = registry::insert(conn, name, &content_type, &entry)?;
    Ok(UploadResult::new(record, created))
}

fn log_stored(uploaded: &UploadResult) {
    tracing::info!(
        "file: {} stored with id: {} size: {} content: {} new content: {}",
        uploaded.record.name,
        uploaded.record.id,
        uploaded.record.size,
        uploaded.record.fingerprint,
        uploaded.was_content_new
    );
}

impl Sqlite {
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self, Error> {
        let c = match mode {
            Mode::ReadWrite => Connection::open(path),
            Mode::ReadOnly => Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY),
        }?;
        c.busy_timeout(BUSY_TIMEOUT)?;

        let storage = Self {
            conn: c,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        };
        storage.enable_foreign_keys()?;
        storage.assign_cache_size()?;
        if matches!(mode, Mode::ReadWrite) {
            storage.pragma_update("synchronous", "FULL")?;
        }
        Ok(storage)
    }

    #[must_use]
    pub fn with_max_upload_size(mut self, max_upload_size: u64) -> Self {
        self.max_upload_size = max_upload_size;
        self
    }

    fn enable_foreign_keys(&self) -> Result<(), Error> {
        self.pragma_update("foreign_keys", "ON")
    }

    fn assign_cache_size(&self) -> Result<(), Error> {
        self.pragma_update("cache_size", CACHE_SIZE)
    }

    fn pragma_update(&self, name: &str, value: &str) -> Result<(), Error> {
        self.conn.pragma_update(None, name, value)
    }
}
