use actix_multipart::Multipart;
use actix_web::HttpResponse;
use futures::StreamExt;
use sanitize_filename::sanitize;

use crate::intake::SelectedFile;
use crate::ErrorResponse;

#[derive(Debug, thiserror::Error)]
pub enum MultipartParseError {
    #[error("Multipart field error: {0}")]
    FieldError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("No files found in multipart payload")]
    NoFiles,
}

impl From<MultipartParseError> for HttpResponse {
    fn from(error: MultipartParseError) -> Self {
        match error {
            MultipartParseError::IoError(_) => HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error(&format!("{}", error))),
            _ => HttpResponse::BadRequest().json(ErrorResponse::bad_request(&format!("{}", error))),
        }
    }
}

pub struct MultipartParser;

impl MultipartParser {
    /// Collects every `file*` field as a selected file, in upload order.
    /// Other fields are ignored. A part larger than `max_bytes` is drained
    /// without buffering and comes back as [`SelectedFile::oversized`].
    pub async fn parse_image_files(
        mut multipart: Multipart,
        max_bytes: Option<usize>,
    ) -> Result<Vec<SelectedFile>, MultipartParseError> {
        let mut files: Vec<SelectedFile> = Vec::new();

        while let Some(item) = multipart.next().await {
            let mut field = item.map_err(|e| MultipartParseError::FieldError(e.to_string()))?;
            let content_disposition = field
                .content_disposition()
                .ok_or_else(|| MultipartParseError::FieldError("Content disposition not found".to_string()))?;
            let name = content_disposition
                .get_name()
                .ok_or_else(|| MultipartParseError::FieldError("Field name not found".to_string()))?;
            if !name.starts_with("file") {
                continue;
            }

            let filename = match content_disposition.get_filename() {
                Some(fname) if !fname.is_empty() => sanitize(fname),
                _ => format!("file_{}", files.len()),
            };
            let content_type = field.content_type().map(|m| m.essence_str().to_string());

            let mut buffer = Vec::new();
            let mut size = 0usize;
            let mut over_limit = false;
            while let Some(chunk) = field.next().await {
                let data_chunk = chunk.map_err(|e| MultipartParseError::IoError(e.to_string()))?;
                size += data_chunk.len();
                if over_limit {
                    continue;
                }
                if max_bytes.is_some_and(|limit| size > limit) {
                    log::debug!("{} passed the size cap, dropping its data", filename);
                    over_limit = true;
                    buffer = Vec::new();
                    continue;
                }
                buffer.extend_from_slice(&data_chunk);
            }

            let file = if over_limit {
                SelectedFile::oversized(filename, content_type.as_deref(), size)
            } else {
                SelectedFile::new(filename, content_type.as_deref(), buffer)
            };
            files.push(file);
        }

        if files.is_empty() {
            return Err(MultipartParseError::NoFiles);
        }
        Ok(files)
    }
}
