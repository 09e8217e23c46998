use chrono::{DateTime, Utc};
use kernel::{ContentEntry, FileFilter, FileRecord, SortOrder};
use rusqlite::blob::Blob;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, DatabaseName, OptionalExtension, Row};

use crate::content_type::extension_of;
use crate::digest::Fingerprint;
use crate::error::{DedupError, DedupResult};

const SELECT_FILE: &str = "SELECT f.id, f.name, f.content_type, f.extension, f.created_at, c.size, f.fingerprint
                 FROM file f
                 INNER JOIN content c ON c.fingerprint = f.fingerprint";

/// Persists a new record pointing at `content`.
pub fn insert(
    conn: &Connection,
    name: &str,
    content_type: &str,
    content: &ContentEntry,
) -> DedupResult<FileRecord> {
    let created_at = now();
    let extension = extension_of(name);

    conn.prepare_cached(
        "INSERT INTO file (name, extension, content_type, created_at, fingerprint)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
    )?
    .execute(params![
        name,
        &extension,
        content_type,
        created_at.timestamp_micros(),
        &content.fingerprint
    ])?;

    Ok(FileRecord {
        id: conn.last_insert_rowid(),
        name: name.to_owned(),
        content_type: content_type.to_owned(),
        extension,
        created_at,
        size: content.size,
        fingerprint: content.fingerprint.clone(),
    })
}

/// Deletes the record and hands back the fingerprint it referenced.
pub fn remove(conn: &Connection, id: i64) -> DedupResult<Fingerprint> {
    let fingerprint: Option<Fingerprint> = conn
        .prepare_cached("SELECT fingerprint FROM file WHERE id = ?1")?
        .query_row(params![id], |row| row.get(0))
        .optional()?;

    let fingerprint = fingerprint.ok_or(DedupError::NotFound(id))?;

    conn.prepare_cached("DELETE FROM file WHERE id = ?1")?
        .execute(params![id])?;

    Ok(fingerprint)
}

pub fn get(conn: &Connection, id: i64) -> DedupResult<FileRecord> {
    let sql = format!("{SELECT_FILE} WHERE f.id = ?1");
    conn.prepare_cached(&sql)?
        .query_row(params![id], from_row)
        .optional()?
        .ok_or(DedupError::NotFound(id))
}

/// Files matching `filter`, newest first.
pub fn list(conn: &Connection, filter: &FileFilter) -> rusqlite::Result<Vec<FileRecord>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<Value> = Vec::new();

    if let Some(name) = non_blank(filter.name.as_deref()) {
        clauses.push("instr(lower(f.name), lower(?)) > 0");
        args.push(Value::Text(name.to_owned()));
    }

    if let Some(kind) = non_blank(filter.kind.as_deref()) {
        if kind.contains('/') {
            clauses.push("lower(f.content_type) = lower(?)");
            args.push(Value::Text(kind.to_owned()));
        } else {
            let kind = kind.trim_start_matches('.').to_lowercase();
            clauses.push("(f.extension = ? OR instr(lower(f.content_type), ? || '/') = 1)");
            args.push(Value::Text(kind.clone()));
            args.push(Value::Text(kind));
        }
    }

    if let Some(min) = filter.min_size {
        clauses.push("c.size >= ?");
        args.push(Value::Integer(i64::try_from(min).unwrap_or(i64::MAX)));
    }

    if let Some(max) = filter.max_size {
        clauses.push("c.size <= ?");
        args.push(Value::Integer(i64::try_from(max).unwrap_or(i64::MAX)));
    }

    if let Some(start) = filter.start_date {
        clauses.push("f.created_at >= ?");
        args.push(Value::Integer(start.timestamp_micros()));
    }

    if let Some(end) = filter.end_date {
        clauses.push("f.created_at <= ?");
        args.push(Value::Integer(end.timestamp_micros()));
    }

    let mut sql = String::from(SELECT_FILE);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(order_by(filter.ordering.unwrap_or_default()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter()), from_row)?;
    rows.collect()
}

/// Opens the payload of file `id` for streaming reads.
pub fn open_data(conn: &Connection, id: i64) -> DedupResult<Blob<'_>> {
    let rowid: Option<i64> = conn
        .prepare_cached(
            "SELECT c.rowid FROM file f INNER JOIN content c ON c.fingerprint = f.fingerprint WHERE f.id = ?1",
        )?
        .query_row(params![id], |row| row.get(0))
        .optional()?;

    let rowid = rowid.ok_or(DedupError::NotFound(id))?;
    Ok(conn.blob_open(DatabaseName::Main, "content", "data", rowid, true)?)
}

/// Number of files and their summed size, duplicates included.
pub fn totals(conn: &Connection) -> rusqlite::Result<(u64, u64)> {
    conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(c.size), 0)
                 FROM file f
                 INNER JOIN content c ON c.fingerprint = f.fingerprint",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

fn order_by(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Newest => "f.created_at DESC, f.id DESC",
        SortOrder::Oldest => "f.created_at ASC, f.id ASC",
        SortOrder::NameAsc => "f.name COLLATE NOCASE ASC, f.created_at DESC, f.id DESC",
        SortOrder::NameDesc => "f.name COLLATE NOCASE DESC, f.created_at DESC, f.id DESC",
        SortOrder::SizeAsc => "c.size ASC, f.created_at DESC, f.id DESC",
        SortOrder::SizeDesc => "c.size DESC, f.created_at DESC, f.id DESC",
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let micros: i64 = row.get(4)?;
    let created_at = DateTime::from_timestamp_micros(micros)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, micros))?;
    Ok(FileRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        content_type: row.get(2)?,
        extension: row.get(3)?,
        created_at,
        size: row.get(5)?,
        fingerprint: row.get(6)?,
    })
}

// Stored with microsecond precision, so truncate to round-trip exactly.
fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|x| !x.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::get_or_create;
    use crate::digest::digest;
    use crate::sqlite::create_schema;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};
    use std::io::{Cursor, Read};

    fn add(conn: &Connection, name: &str, content_type: &str, data: &[u8]) -> FileRecord {
        let fingerprint = digest(data).unwrap();
        let (entry, _) =
            get_or_create(conn, &fingerprint, &mut Cursor::new(data), data.len() as u64).unwrap();
        insert(conn, name, content_type, &entry).unwrap()
    }

    fn set_created_at(conn: &Connection, id: i64, at: DateTime<Utc>) {
        conn.execute(
            "UPDATE file SET created_at = ?1 WHERE id = ?2",
            params![at.timestamp_micros(), id],
        )
        .unwrap();
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, 12, 0, 0).unwrap()
    }

    #[fixture]
    fn populated() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        let a = add(&conn, "Report.PDF", "application/pdf", &[1u8; 100]);
        let b = add(&conn, "photo.png", "image/png", &[2u8; 50]);
        let c = add(&conn, "photo-copy.png", "image/png", &[2u8; 50]);
        let d = add(&conn, "notes", "text/plain", &[3u8; 10]);
        set_created_at(&conn, a.id, day(1));
        set_created_at(&conn, b.id, day(2));
        set_created_at(&conn, c.id, day(3));
        set_created_at(&conn, d.id, day(4));
        conn
    }

    fn names(records: &[FileRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn insert_derives_size_and_extension() {
        // Arrange
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();

        // Act
        let record = add(&conn, "archive.TAR.GZ", "application/gzip", b"12345");

        // Assert
        assert_eq!(record.size, 5);
        assert_eq!(record.extension, "gz");
        assert_eq!(get(&conn, record.id).unwrap(), record);
    }

    #[rstest]
    fn list_is_newest_first(populated: Connection) {
        // Arrange

        // Act
        let records = list(&populated, &FileFilter::default()).unwrap();

        // Assert
        assert_eq!(
            names(&records),
            vec!["notes", "photo-copy.png", "photo.png", "Report.PDF"]
        );
    }

    #[rstest]
    #[case(FileFilter { name: Some("PHOTO".into()), ..FileFilter::default() }, vec!["photo-copy.png", "photo.png"])]
    #[case(FileFilter { name: Some("copy".into()), ..FileFilter::default() }, vec!["photo-copy.png"])]
    #[case(FileFilter { name: Some("  ".into()), ..FileFilter::default() }, vec!["notes", "photo-copy.png", "photo.png", "Report.PDF"])]
    #[case(FileFilter { kind: Some("pdf".into()), ..FileFilter::default() }, vec!["Report.PDF"])]
    #[case(FileFilter { kind: Some(".png".into()), ..FileFilter::default() }, vec!["photo-copy.png", "photo.png"])]
    #[case(FileFilter { kind: Some("image".into()), ..FileFilter::default() }, vec!["photo-copy.png", "photo.png"])]
    #[case(FileFilter { kind: Some("Text/Plain".into()), ..FileFilter::default() }, vec!["notes"])]
    #[case(FileFilter { kind: Some("text".into()), ..FileFilter::default() }, vec!["notes"])]
    #[case(FileFilter { min_size: Some(50), ..FileFilter::default() }, vec!["photo-copy.png", "photo.png", "Report.PDF"])]
    #[case(FileFilter { max_size: Some(50), ..FileFilter::default() }, vec!["notes", "photo-copy.png", "photo.png"])]
    #[case(FileFilter { min_size: Some(11), max_size: Some(99), ..FileFilter::default() }, vec!["photo-copy.png", "photo.png"])]
    #[case(FileFilter { start_date: Some(day(2)), end_date: Some(day(3)), ..FileFilter::default() }, vec!["photo-copy.png", "photo.png"])]
    #[case(FileFilter { start_date: Some(day(4)), ..FileFilter::default() }, vec!["notes"])]
    #[case(FileFilter { end_date: Some(day(1)), ..FileFilter::default() }, vec!["Report.PDF"])]
    #[case(FileFilter { name: Some("photo".into()), start_date: Some(day(3)), ..FileFilter::default() }, vec!["photo-copy.png"])]
    #[case(FileFilter { kind: Some("zip".into()), ..FileFilter::default() }, vec![])]
    #[trace]
    fn list_filters(
        populated: Connection,
        #[case] filter: FileFilter,
        #[case] expected: Vec<&str>,
    ) {
        // Arrange

        // Act
        let records = list(&populated, &filter).unwrap();

        // Assert
        assert_eq!(names(&records), expected);
    }

    #[rstest]
    #[case(SortOrder::Newest, vec!["notes", "photo-copy.png", "photo.png", "Report.PDF"])]
    #[case(SortOrder::Oldest, vec!["Report.PDF", "photo.png", "photo-copy.png", "notes"])]
    #[case(SortOrder::NameAsc, vec!["notes", "photo-copy.png", "photo.png", "Report.PDF"])]
    #[case(SortOrder::NameDesc, vec!["Report.PDF", "photo.png", "photo-copy.png", "notes"])]
    #[case(SortOrder::SizeAsc, vec!["notes", "photo-copy.png", "photo.png", "Report.PDF"])]
    #[case(SortOrder::SizeDesc, vec!["Report.PDF", "photo-copy.png", "photo.png", "notes"])]
    #[trace]
    fn list_ordering(populated: Connection, #[case] order: SortOrder, #[case] expected: Vec<&str>) {
        // Arrange
        let filter = FileFilter {
            ordering: Some(order),
            ..FileFilter::default()
        };

        // Act
        let records = list(&populated, &filter).unwrap();

        // Assert
        assert_eq!(names(&records), expected);
    }

    #[rstest]
    fn ordering_combines_with_filters(populated: Connection) {
        // Arrange
        let filter = FileFilter {
            kind: Some("image".into()),
            ordering: Some(SortOrder::Oldest),
            ..FileFilter::default()
        };

        // Act
        let records = list(&populated, &filter).unwrap();

        // Assert
        assert_eq!(names(&records), vec!["photo.png", "photo-copy.png"]);
    }

    #[rstest]
    fn remove_returns_fingerprint(populated: Connection) {
        // Arrange
        let record = list(&populated, &FileFilter::default()).unwrap().remove(0);

        // Act
        let fingerprint = remove(&populated, record.id).unwrap();

        // Assert
        assert_eq!(fingerprint.to_string(), record.fingerprint);
        assert!(matches!(get(&populated, record.id), Err(DedupError::NotFound(_))));
    }

    #[rstest]
    fn remove_unknown_id_fails(populated: Connection) {
        // Arrange

        // Act
        let result = remove(&populated, 1000);

        // Assert
        assert!(matches!(result, Err(DedupError::NotFound(1000))));
        assert_eq!(list(&populated, &FileFilter::default()).unwrap().len(), 4);
    }

    #[rstest]
    fn open_data_streams_payload(populated: Connection) {
        // Arrange
        let record = list(
            &populated,
            &FileFilter {
                name: Some("notes".into()),
                ..FileFilter::default()
            },
        )
        .unwrap()
        .remove(0);

        // Act
        let mut blob = open_data(&populated, record.id).unwrap();
        let mut data = Vec::new();
        blob.read_to_end(&mut data).unwrap();

        // Assert
        assert_eq!(data, vec![3u8; 10]);
    }

    #[rstest]
    fn totals_count_duplicates(populated: Connection) {
        // Arrange

        // Act
        let (files, size) = totals(&populated).unwrap();

        // Assert
        assert_eq!(files, 4);
        assert_eq!(size, 210);
    }
}
