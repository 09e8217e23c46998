use std::env;
use std::path::PathBuf;

use crate::sqlite::DEFAULT_MAX_UPLOAD_SIZE;

const DB_FILE: &str = "dstore.db";
const CURRENT_DIR: &str = "./";
const PORT: &str = "5000";

/// SQLite cannot allocate a blob larger than this.
const MAX_BLOB_SIZE: u64 = i32::MAX as u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub data_file: String,
    pub port: String,
    pub max_upload_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(CURRENT_DIR),
            data_file: String::from(DB_FILE),
            port: String::from(PORT),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

impl Config {
    /// Reads `DSTORE_DATA_DIR`, `DSTORE_DATA_FILE`, `DSTORE_PORT` and
    /// `DSTORE_MAX_UPLOAD_SIZE`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let defaults = Self::default();
        let max_upload_size = match lookup("DSTORE_MAX_UPLOAD_SIZE") {
            Some(value) => parse_size(&value).unwrap_or_else(|| {
                tracing::warn!(
                    "invalid DSTORE_MAX_UPLOAD_SIZE '{value}', using {}",
                    defaults.max_upload_size
                );
                defaults.max_upload_size
            }),
            None => defaults.max_upload_size,
        };

        Self {
            data_dir: lookup("DSTORE_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            data_file: lookup("DSTORE_DATA_FILE").unwrap_or(defaults.data_file),
            port: lookup("DSTORE_PORT").unwrap_or(defaults.port),
            max_upload_size,
        }
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.data_file)
    }
}

fn parse_size(value: &str) -> Option<u64> {
    let size = value.trim().parse::<u64>().ok()?;
    Some(size.min(MAX_BLOB_SIZE))
}
