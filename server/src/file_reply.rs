use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use kernel::FileRecord;

use crate::content_type::OCTET_STREAM;

pub struct FileReply {
    data: Vec<u8>,
    file: FileRecord,
}

impl FileReply {
    #[must_use]
    pub fn new(data: Vec<u8>, file: FileRecord) -> Self {
        Self { data, file }
    }

    fn name_from_path(&self) -> &str {
        let path = &self.file.name;
        if let Some(ix) = path.rfind(&['\\', '/']) {
            &path[ix + 1..]
        } else {
            path
        }
    }
}

impl IntoResponse for FileReply {
    fn into_response(self) -> Response {
        let file_name = self.name_from_path().to_owned();
        let content_type = HeaderValue::from_str(&self.file.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM));
        let etag = format!(r#""{}""#, self.file.fingerprint);
        let len = self.data.len().to_string();

        let mut res = Body::from(self.data).into_response();
        let headers = res.headers_mut();
        headers.insert(header::CONTENT_TYPE, content_type);
        let attachment = format!(r#"attachment; filename="{file_name}""#);
        if let Ok(val) = HeaderValue::from_str(attachment.as_str()) {
            headers.insert(header::CONTENT_DISPOSITION, val);
        }
        if let Ok(val) = HeaderValue::from_str(len.as_str()) {
            headers.insert(header::CONTENT_LENGTH, val);
        }
        if let Ok(val) = HeaderValue::from_str(etag.as_str()) {
            headers.insert(header::ETAG, val);
        }

        res
    }
}
