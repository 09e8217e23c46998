use std::io::{self, Read};

use kernel::ContentEntry;
use rusqlite::blob::ZeroBlob;
use rusqlite::{params, Connection, DatabaseName, OptionalExtension};

use crate::digest::Fingerprint;
use crate::error::{DedupError, DedupResult};

/// What happened to a content entry when one of its references went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Retained { remaining: u64 },
    Purged,
}

/// Takes one more reference on the content for `fingerprint`, creating it from
/// `payload` when it doesn't exist yet.
///
/// Must run inside a write transaction: the increment and the insert are only
/// race free while the caller holds the database write lock.
pub fn get_or_create<R: Read + ?Sized>(
    conn: &Connection,
    fingerprint: &Fingerprint,
    payload: &mut R,
    size: u64,
) -> DedupResult<(ContentEntry, bool)> {
    let updated = conn
        .prepare_cached(
            "UPDATE content SET reference_count = reference_count + 1 WHERE fingerprint = ?1",
        )?
        .execute(params![fingerprint])?;

    if updated > 0 {
        let entry =
            find(conn, fingerprint)?.ok_or_else(|| DedupError::MissingContent(fingerprint.to_string()))?;
        tracing::debug!(
            "content {} reused, references: {}",
            entry.fingerprint,
            entry.reference_count
        );
        return Ok((entry, false));
    }

    let len = i32::try_from(size).map_err(|_| DedupError::PayloadTooLarge {
        limit: i32::MAX as u64,
    })?;

    conn.prepare_cached(
        "INSERT INTO content (fingerprint, data, size, reference_count) VALUES (?1, ?2, ?3, 1)",
    )?
    .execute(params![fingerprint, ZeroBlob(len), size])?;

    let rowid = conn.last_insert_rowid();
    let mut blob = conn.blob_open(DatabaseName::Main, "content", "data", rowid, false)?;
    let written = io::copy(payload, &mut blob).map_err(DedupError::StorageIo)?;
    if written != size {
        return Err(DedupError::StorageIo(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("payload of {fingerprint} ended after {written} of {size} bytes"),
        )));
    }
    blob.close()?;

    tracing::debug!("content {} created, size: {}", fingerprint, size);
    Ok((
        ContentEntry {
            fingerprint: fingerprint.to_string(),
            size,
            reference_count: 1,
        },
        true,
    ))
}

/// Drops one reference from the content for `fingerprint`, deleting the entry
/// when it was the last one.
pub fn release(conn: &Connection, fingerprint: &Fingerprint) -> DedupResult<Release> {
    let count: Option<i64> = conn
        .prepare_cached("SELECT reference_count FROM content WHERE fingerprint = ?1")?
        .query_row(params![fingerprint], |row| row.get(0))
        .optional()?;

    let Some(count) = count else {
        tracing::error!("content {fingerprint} is referenced by a file but doesn't exist");
        return Err(DedupError::MissingContent(fingerprint.to_string()));
    };

    match count {
        c if c <= 0 => {
            tracing::error!("content {fingerprint} has reference count {c}");
            Err(DedupError::CorruptReferenceCount {
                fingerprint: fingerprint.to_string(),
                count: c,
            })
        }
        1 => {
            conn.prepare_cached("DELETE FROM content WHERE fingerprint = ?1")?
                .execute(params![fingerprint])?;
            tracing::debug!("content {fingerprint} purged");
            Ok(Release::Purged)
        }
        c => {
            conn.prepare_cached(
                "UPDATE content SET reference_count = reference_count - 1 WHERE fingerprint = ?1",
            )?
            .execute(params![fingerprint])?;
            let remaining = (c - 1).unsigned_abs();
            tracing::debug!("content {fingerprint} retained, references: {remaining}");
            Ok(Release::Retained { remaining })
        }
    }
}

pub fn find(conn: &Connection, fingerprint: &Fingerprint) -> rusqlite::Result<Option<ContentEntry>> {
    conn.prepare_cached("SELECT size, reference_count FROM content WHERE fingerprint = ?1")?
        .query_row(params![fingerprint], |row| {
            Ok(ContentEntry {
                fingerprint: fingerprint.to_string(),
                size: row.get(0)?,
                reference_count: row.get(1)?,
            })
        })
        .optional()
}

/// Number of unique contents and their summed size.
pub fn totals(conn: &Connection) -> rusqlite::Result<(u64, u64)> {
    conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM content",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}
