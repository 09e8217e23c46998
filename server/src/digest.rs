use std::fmt;
use std::io::{self, ErrorKind, Read, Seek, Write};
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use tempfile::SpooledTempFile;

use crate::error::{DedupError, DedupResult};

pub const CHUNK_SIZE: usize = 8192;

/// Uploads up to this size are spooled in memory, larger ones spill to a temp file.
const SPOOL_THRESHOLD: usize = 1024 * 1024;

/// BLAKE3 digest of a content payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl From<blake3::Hash> for Fingerprint {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = DedupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        blake3::Hash::from_hex(s)
            .map(Self)
            .map_err(|_| DedupError::InvalidFingerprint(s.to_owned()))
    }
}

impl ToSql for Fingerprint {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Fingerprint {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        blake3::Hash::from_hex(text)
            .map(Self)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Hashes everything `reader` yields, one chunk at a time.
pub fn digest<R: Read>(mut reader: R) -> io::Result<Fingerprint> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => {
                hasher.update(&buffer[..read]);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(hasher.finalize().into())
}

/// An upload that was hashed and spooled in the same pass.
pub struct Captured {
    pub fingerprint: Fingerprint,
    pub size: u64,
    /// Spooled bytes, positioned at the start.
    pub payload: SpooledTempFile,
}

/// Incremental form of [`capture`] for payloads that arrive in chunks.
pub struct Capture {
    hasher: blake3::Hasher,
    spool: SpooledTempFile,
    size: u64,
    limit: u64,
}

impl Capture {
    #[must_use]
    pub fn new(limit: u64) -> Self {
        Self {
            hasher: blake3::Hasher::new(),
            spool: SpooledTempFile::new(SPOOL_THRESHOLD),
            size: 0,
            limit,
        }
    }

    /// Hashes and spools `chunk`.
    ///
    /// Fails with [`DedupError::PayloadTooLarge`] once more than `limit` bytes
    /// have been fed in total.
    pub fn update(&mut self, chunk: &[u8]) -> DedupResult<()> {
        self.size = self.size.saturating_add(chunk.len() as u64);
        if self.size > self.limit {
            return Err(DedupError::PayloadTooLarge { limit: self.limit });
        }
        self.hasher.update(chunk);
        self.spool.write_all(chunk).map_err(DedupError::StorageIo)
    }

    /// `true` once the spool has moved from memory to a temp file.
    #[must_use]
    pub fn is_spilled(&self) -> bool {
        self.spool.is_rolled()
    }

    pub fn finish(mut self) -> DedupResult<Captured> {
        self.spool.rewind().map_err(DedupError::StorageIo)?;
        Ok(Captured {
            fingerprint: self.hasher.finalize().into(),
            size: self.size,
            payload: self.spool,
        })
    }
}

/// Hashes `reader` while copying it into a spool so the exact bytes that were
/// hashed can be stored afterwards.
///
/// Fails with [`DedupError::PayloadTooLarge`] as soon as more than `limit`
/// bytes have been read.
pub fn capture<R: Read>(reader: R, limit: u64) -> DedupResult<Captured> {
    let mut limited = reader.take(limit.saturating_add(1));
    let mut capture = Capture::new(limit);
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let read = match limited.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(DedupError::Read(e)),
        };
        capture.update(&buffer[..read])?;
    }

    capture.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disconnected"))
        }
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(CHUNK_SIZE - 1)]
    #[case(CHUNK_SIZE)]
    #[case(CHUNK_SIZE + 1)]
    #[case(3 * CHUNK_SIZE + 5)]
    #[trace]
    fn digest_matches_one_shot_hash(#[case] len: usize) {
        // Arrange
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

        // Act
        let fingerprint = digest(Cursor::new(&data)).unwrap();

        // Assert
        assert_eq!(fingerprint, Fingerprint::from(blake3::hash(&data)));
    }

    #[test]
    fn digest_is_idempotent() {
        // Arrange
        let data = b"the same bytes twice";

        // Act
        let first = digest(&data[..]).unwrap();
        let second = digest(&data[..]).unwrap();

        // Assert
        assert_eq!(first, second);
    }

    #[test]
    fn digest_distinguishes_corpus() {
        // Arrange
        let corpus: [&[u8]; 6] = [b"", b"a", b"b", b"ab", b"ba", b"a\0"];

        // Act
        let fingerprints: Vec<Fingerprint> =
            corpus.iter().map(|x| digest(*x).unwrap()).collect();

        // Assert
        for (i, x) in fingerprints.iter().enumerate() {
            for y in &fingerprints[i + 1..] {
                assert_ne!(x, y);
            }
        }
    }

    #[test]
    fn digest_propagates_read_failure() {
        // Arrange

        // Act
        let result = digest(FailingReader);

        // Assert
        assert!(result.is_err());
    }

    #[test]
    fn fingerprint_parses_its_display() {
        // Arrange
        let fingerprint = digest(&b"f1"[..]).unwrap();

        // Act
        let text = fingerprint.to_string();
        let parsed: Fingerprint = text.parse().unwrap();

        // Assert
        assert_eq!(text.len(), 64);
        assert_eq!(parsed, fingerprint);
    }

    #[rstest]
    #[case("")]
    #[case("xyz")]
    #[case("0123")]
    fn fingerprint_rejects_malformed_hex(#[case] text: &str) {
        // Arrange

        // Act
        let result = text.parse::<Fingerprint>();

        // Assert
        assert!(matches!(result, Err(DedupError::InvalidFingerprint(_))));
    }

    #[rstest]
    #[case(0, 0)]
    #[case(10, 10)]
    #[case(10, 100)]
    #[trace]
    fn capture_within_limit(#[case] len: usize, #[case] limit: u64) {
        // Arrange
        let data = vec![7u8; len];

        // Act
        let mut captured = capture(Cursor::new(&data), limit).unwrap();

        // Assert
        let mut stored = Vec::new();
        captured.payload.read_to_end(&mut stored).unwrap();
        assert_eq!(captured.size, len as u64);
        assert_eq!(stored, data);
        assert_eq!(captured.fingerprint, digest(Cursor::new(&data)).unwrap());
    }

    #[test]
    fn capture_one_byte_over_limit_fails() {
        // Arrange
        let data = vec![1u8; 11];

        // Act
        let result = capture(Cursor::new(&data), 10);

        // Assert
        assert!(matches!(
            result,
            Err(DedupError::PayloadTooLarge { limit: 10 })
        ));
    }

    #[test]
    fn capture_spills_large_payload() {
        // Arrange
        let data: Vec<u8> = (0..SPOOL_THRESHOLD * 2).map(|i| (i % 13) as u8).collect();

        // Act
        let mut captured = capture(Cursor::new(&data), u64::MAX).unwrap();

        // Assert
        let mut stored = Vec::with_capacity(data.len());
        captured.payload.read_to_end(&mut stored).unwrap();
        assert!(captured.payload.is_rolled());
        assert_eq!(stored, data);
    }

    #[test]
    fn chunked_capture_matches_reader_capture() {
        // Arrange
        let data: Vec<u8> = (0..3 * CHUNK_SIZE + 17).map(|i| (i % 7) as u8).collect();
        let mut capture = Capture::new(data.len() as u64);

        // Act
        for chunk in data.chunks(1000) {
            capture.update(chunk).unwrap();
        }
        let mut chunked = capture.finish().unwrap();

        // Assert
        let mut stored = Vec::new();
        chunked.payload.read_to_end(&mut stored).unwrap();
        assert_eq!(chunked.size, data.len() as u64);
        assert_eq!(chunked.fingerprint, digest(Cursor::new(&data)).unwrap());
        assert_eq!(stored, data);
    }

    #[test]
    fn chunked_capture_rejects_chunk_crossing_limit() {
        // Arrange
        let mut capture = Capture::new(10);
        capture.update(&[0u8; 6]).unwrap();

        // Act
        let result = capture.update(&[0u8; 5]);

        // Assert
        assert!(matches!(
            result,
            Err(DedupError::PayloadTooLarge { limit: 10 })
        ));
    }

    #[test]
    fn capture_reports_read_failure() {
        // Arrange

        // Act
        let result = capture(FailingReader, 10);

        // Assert
        assert!(matches!(result, Err(DedupError::Read(_))));
    }
}
