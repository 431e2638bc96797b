use anyhow::Context;
use bytes::Bytes;
use uuid::Uuid;

use crate::barcodes::services::BARCODE_PREFIX;
use crate::error::AppError;
use crate::storage::StorageClient;

pub const IMAGE_PREFIX: &str = "images";

/// Which stored content family a filename refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Image,
    Barcode,
}

impl ContentKind {
    fn prefix(self) -> &'static str {
        match self {
            ContentKind::Image => IMAGE_PREFIX,
            ContentKind::Barcode => BARCODE_PREFIX,
        }
    }
}

/// Validates and stores an uploaded owner photo, returning its reference.
pub async fn store_upload(
    storage: &dyn StorageClient,
    original_name: &str,
    body: Bytes,
) -> Result<String, AppError> {
    let ext = allowed_ext(original_name)
        .ok_or_else(|| AppError::invalid("image must be a .jpg, .jpeg or .png file"))?;
    if body.is_empty() {
        return Err(AppError::invalid("image is empty"));
    }

    let reference = format!("{}.{}", Uuid::new_v4(), ext);
    let key = format!("{}/{}", IMAGE_PREFIX, reference);
    storage
        .put_object(&key, body, mime_for(&reference))
        .await
        .with_context(|| format!("put_object {}", key))
        .map_err(AppError::Io)?;
    Ok(reference)
}

/// Loads previously stored content by reference.
pub async fn fetch(
    storage: &dyn StorageClient,
    kind: ContentKind,
    filename: &str,
) -> Result<(Bytes, &'static str), AppError> {
    if matches!(filename, "" | "." | "..") || filename.contains(|c: char| c == '/' || c == '\\') {
        return Err(AppError::invalid("invalid filename"));
    }
    let key = format!("{}/{}", kind.prefix(), filename);
    let body = storage
        .get_object(&key)
        .await
        .with_context(|| format!("get_object {}", key))
        .map_err(AppError::Io)?
        .ok_or_else(|| AppError::not_found(format!("{filename} not found")))?;
    Ok((body, mime_for(filename)))
}

fn allowed_ext(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" => Some("jpg"),
        "jpeg" => Some("jpeg"),
        "png" => Some("png"),
        _ => None,
    }
}

fn mime_for(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()) {
        Some(e) if e == "png" => "image/png",
        Some(e) if e == "jpg" || e == "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}
