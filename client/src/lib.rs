use std::path::Path;

use comfy_table::{presets::UTF8_HORIZONTAL_ONLY, Attribute, Cell, CellAlignment, ContentArrangement, Table};
use kernel::{DeleteResult, FileFilter, FileRecord, StorageStats, UploadResult};
use reqwest::{header, Client, Response};
use resource::Resource;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

pub mod resource;

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
const FINGERPRINT_PREFIX: usize = 12;

pub struct UploadParams {
    pub uri: String,
    pub file: String,
    pub content_type: Option<String>,
}

pub async fn upload_file(params: UploadParams) {
    let Some(file_name) = Path::new(&params.file)
        .file_name()
        .and_then(|name| name.to_str())
    else {
        println!("invalid file path {}", params.file);
        return;
    };
    let Some(mut resource) = Resource::new(&params.uri) else {
        println!("invalid uri {}", params.uri);
        return;
    };
    resource.append_path("api/upload").append_segment(file_name);

    let f = match File::open(&params.file).await {
        Ok(f) => f,
        Err(e) => {
            println!("no such file {}: {e}", params.file);
            return;
        }
    };
    let stream = ReaderStream::new(f);
    let body = reqwest::Body::wrap_stream(stream);

    let client = Client::new();
    let mut request = client.post(resource.to_string()).body(body);
    if let Some(content_type) = &params.content_type {
        request = request.header(header::CONTENT_TYPE, content_type);
    }
    match request.send().await {
        Ok(response) => {
            if let Some(uploaded) = decode::<UploadResult>(response).await {
                let status = if uploaded.was_content_new {
                    "new content".to_owned()
                } else {
                    format!("duplicate content, saved {}", human_size(uploaded.storage_saved))
                };
                println!(
                    "file {} uploaded. id: {} type: {} ({status})",
                    params.file, uploaded.record.id, uploaded.record.content_type
                );
            }
        }
        Err(e) => println!("upload error: {e}"),
    }
}

pub async fn list_files(uri: &str, filter: &FileFilter) {
    let Some(mut resource) = Resource::new(uri) else {
        println!("invalid uri {uri}");
        return;
    };
    resource.append_path("api/files").append_filter(filter);

    match Client::new().get(resource.to_string()).send().await {
        Ok(response) => {
            if let Some(files) = decode::<Vec<FileRecord>>(response).await {
                println!("{}", files_table(&files));
            }
        }
        Err(e) => println!("error: {e}"),
    }
}

pub async fn show_stats(uri: &str) {
    let Some(mut resource) = Resource::new(uri) else {
        println!("invalid uri {uri}");
        return;
    };
    resource.append_path("api/stats");

    match Client::new().get(resource.to_string()).send().await {
        Ok(response) => {
            if let Some(stats) = decode::<StorageStats>(response).await {
                println!("{}", stats_table(&stats));
            }
        }
        Err(e) => println!("error: {e}"),
    }
}

pub async fn delete_file(uri: &str, id: i64) {
    let Some(mut resource) = Resource::new(uri) else {
        println!("invalid uri {uri}");
        return;
    };
    resource.append_path("api/files").append_segment(&id.to_string());

    match Client::new().delete(resource.to_string()).send().await {
        Ok(response) => {
            if let Some(deleted) = decode::<DeleteResult>(response).await {
                println!(
                    "file {id} deleted. Purged contents: {}",
                    deleted.contents
                );
            }
        }
        Err(e) => println!("delete error: {e}"),
    }
}

/// Prints the server's message for unsuccessful responses.
async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Option<T> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        println!("server returned {status}: {message}");
        return None;
    }
    match response.json().await {
        Ok(value) => Some(value),
        Err(e) => {
            println!("JSON decode error: {e}");
            None
        }
    }
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
    table
}

#[must_use]
pub fn files_table(files: &[FileRecord]) -> Table {
    let mut table = new_table(&["ID", "Name", "Type", "Size", "Uploaded", "Fingerprint"]);
    for f in files {
        let fingerprint = f.fingerprint.get(..FINGERPRINT_PREFIX).unwrap_or(&f.fingerprint);
        table.add_row(vec![
            Cell::new(f.id),
            Cell::new(&f.name),
            Cell::new(&f.content_type),
            Cell::new(human_size(f.size)).set_alignment(CellAlignment::Right),
            Cell::new(f.created_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(fingerprint),
        ]);
    }
    table
}

#[must_use]
pub fn stats_table(stats: &StorageStats) -> Table {
    let mut table = new_table(&["Metric", "Value"]);
    table
        .add_row(vec![Cell::new("Files"), Cell::new(stats.total_files)])
        .add_row(vec![Cell::new("Unique contents"), Cell::new(stats.unique_contents)])
        .add_row(vec![Cell::new("Logical size"), Cell::new(human_size(stats.logical_size))])
        .add_row(vec![Cell::new("Actual size"), Cell::new(human_size(stats.actual_size))])
        .add_row(vec![Cell::new("Saved"), Cell::new(human_size(stats.saved_bytes))])
        .add_row(vec![
            Cell::new("Saved %"),
            Cell::new(format!("{:.2}", stats.saved_percent)),
        ]);
    table
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{size:.2} {}", UNITS[unit])
    }
}
