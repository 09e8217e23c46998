use kernel::StorageStats;
use rusqlite::Connection;

use crate::{content, registry};

/// Aggregates dedup savings. Run it inside a transaction so both totals come
/// from the same snapshot.
pub fn compute(conn: &Connection) -> rusqlite::Result<StorageStats> {
    let (total_files, logical_size) = registry::totals(conn)?;
    let (unique_contents, actual_size) = content::totals(conn)?;
    Ok(StorageStats::new(
        total_files,
        unique_contents,
        logical_size,
        actual_size,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::get_or_create;
    use crate::digest::digest;
    use crate::registry::insert;
    use crate::sqlite::create_schema;
    use std::io::Cursor;

    fn add(conn: &Connection, data: &[u8]) {
        let fingerprint = digest(data).unwrap();
        let (entry, _) =
            get_or_create(conn, &fingerprint, &mut Cursor::new(data), data.len() as u64).unwrap();
        insert(conn, "f", "application/octet-stream", &entry).unwrap();
    }

    #[test]
    fn empty_store_saves_nothing() {
        // Arrange
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();

        // Act
        let stats = compute(&conn).unwrap();

        // Assert
        assert_eq!(stats, StorageStats::default());
    }

    #[test]
    fn duplicates_count_once_in_actual_size() {
        // Arrange
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        add(&conn, &[b'a'; 100]);
        add(&conn, &[b'a'; 100]);
        add(&conn, &[b'b'; 50]);

        // Act
        let stats = compute(&conn).unwrap();

        // Assert
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.unique_contents, 2);
        assert_eq!(stats.logical_size, 250);
        assert_eq!(stats.actual_size, 150);
        assert_eq!(stats.saved_bytes, 100);
        assert_eq!(stats.saved_percent, 40.0);
    }
}
