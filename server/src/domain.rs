use std::fmt::{Debug, Display};
use std::io::Read;

use kernel::{ContentEntry, DeleteResult, FileFilter, FileRecord, StorageStats, UploadResult};

use crate::digest::Captured;

/// An upload whose payload was already hashed and spooled.
pub struct StagedUpload {
    pub name: String,
    pub content_type_hint: Option<String>,
    pub captured: Captured,
}

/// Deduplicating file store.
///
/// Uploads are keyed by the fingerprint of their bytes. Every upload gets its
/// own [`FileRecord`], while identical bytes share one [`ContentEntry`] whose
/// reference count always equals the number of records pointing at it.
pub trait Storage {
    type Err: Debug + Display;

    fn new_database(&self) -> Result<(), Self::Err>;

    /// Stores `data` under `name`, reusing existing content with the same bytes.
    fn upload(
        &mut self,
        name: &str,
        content_type_hint: Option<&str>,
        data: &mut dyn Read,
    ) -> Result<UploadResult, Self::Err>;

    /// Stores all `uploads` or none of them.
    fn upload_batch(&mut self, uploads: Vec<StagedUpload>) -> Result<Vec<UploadResult>, Self::Err>;

    /// Removes the record and drops its content reference, purging the content
    /// when nothing else references it.
    fn delete_file(&mut self, id: i64) -> Result<DeleteResult, Self::Err>;

    fn list_files(&mut self, filter: &FileFilter) -> Result<Vec<FileRecord>, Self::Err>;

    fn compute_stats(&mut self) -> Result<StorageStats, Self::Err>;

    fn get_file_info(&mut self, id: i64) -> Result<FileRecord, Self::Err>;

    fn get_file_data(&self, id: i64) -> Result<Box<dyn Read + '_>, Self::Err>;

    fn get_content(&mut self, fingerprint: &str) -> Result<Option<ContentEntry>, Self::Err>;
}
