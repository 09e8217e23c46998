#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Metadata of a single upload.
///
/// Every upload produces its own record, even when its bytes are identical
/// to an earlier upload. Records with identical bytes share one
/// [`ContentEntry`] through `fingerprint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileRecord {
    /// Unique numeric identifier for the file
    pub id: i64,
    /// Display name supplied at upload time, not required to be unique
    pub name: String,
    /// Declared or inferred MIME type
    pub content_type: String,
    /// Lowercased name extension without the dot, empty when the name has none
    pub extension: String,
    /// Upload time (UTC)
    pub created_at: DateTime<Utc>,
    /// Size of the referenced content in bytes
    pub size: u64,
    /// BLAKE3 fingerprint of the referenced content
    pub fingerprint: String,
}

/// A unique stored payload and the number of files referencing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContentEntry {
    /// BLAKE3 fingerprint of the payload (64 hex characters)
    pub fingerprint: String,
    /// Payload size in bytes
    pub size: u64,
    /// Number of live file records pointing to this payload
    pub reference_count: u64,
}

/// Outcome of a single upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UploadResult {
    /// The newly created metadata record
    pub record: FileRecord,
    /// `false` when the bytes matched previously stored content
    pub was_content_new: bool,
    /// Bytes not stored again thanks to deduplication, 0 for new content
    pub storage_saved: u64,
}

impl UploadResult {
    #[must_use]
    pub fn new(record: FileRecord, was_content_new: bool) -> Self {
        let storage_saved = if was_content_new { 0 } else { record.size };
        Self {
            record,
            was_content_new,
            storage_saved,
        }
    }
}

/// Result of a delete operation showing the number of items removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
pub struct DeleteResult {
    /// Number of file metadata records deleted
    pub files: usize,
    /// Number of content entries purged because their last reference went away
    pub contents: usize,
}

/// Deduplication statistics over the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default, ToSchema)]
pub struct StorageStats {
    /// Number of file records
    pub total_files: u64,
    /// Number of unique content entries
    pub unique_contents: u64,
    /// Sum of sizes over all files, duplicates included
    pub logical_size: u64,
    /// Sum of sizes over unique contents
    pub actual_size: u64,
    /// `logical_size - actual_size`
    pub saved_bytes: u64,
    /// Share of the logical size saved by deduplication, in percent
    pub saved_percent: f64,
}

impl StorageStats {
    #[must_use]
    pub fn new(total_files: u64, unique_contents: u64, logical_size: u64, actual_size: u64) -> Self {
        let saved_bytes = logical_size.saturating_sub(actual_size);
        let saved_percent = if logical_size > 0 {
            saved_bytes as f64 * 100.0 / logical_size as f64
        } else {
            0.0
        };
        Self {
            total_files,
            unique_contents,
            logical_size,
            actual_size,
            saved_bytes,
            saved_percent,
        }
    }
}

/// Criteria for listing files. All fields are optional and combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FileFilter {
    /// Case-insensitive substring of the file name
    pub name: Option<String>,
    /// Exact content type (`image/png`), top-level type (`image`) or extension (`png`)
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Minimum size in bytes, inclusive
    pub min_size: Option<u64>,
    /// Maximum size in bytes, inclusive
    pub max_size: Option<u64>,
    /// Earliest upload time, inclusive (RFC 3339)
    pub start_date: Option<DateTime<Utc>>,
    /// Latest upload time, inclusive (RFC 3339)
    pub end_date: Option<DateTime<Utc>>,
    /// Result order, newest first when absent
    #[param(inline)]
    pub ordering: Option<SortOrder>,
}

/// Order of listed files. Ties are broken newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    NameAsc,
    NameDesc,
    SizeAsc,
    SizeDesc,
}

impl SortOrder {
    pub const ALL: [SortOrder; 6] = [
        SortOrder::Newest,
        SortOrder::Oldest,
        SortOrder::NameAsc,
        SortOrder::NameDesc,
        SortOrder::SizeAsc,
        SortOrder::SizeDesc,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Newest => "newest",
            SortOrder::Oldest => "oldest",
            SortOrder::NameAsc => "name_asc",
            SortOrder::NameDesc => "name_desc",
            SortOrder::SizeAsc => "size_asc",
            SortOrder::SizeDesc => "size_desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortOrder::ALL
            .into_iter()
            .find(|order| order.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = SortOrder::ALL.iter().map(|o| o.as_str()).collect();
                format!("unknown ordering '{s}', expected one of: {}", names.join(", "))
            })
    }
}

impl FileFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
