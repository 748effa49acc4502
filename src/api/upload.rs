use actix_multipart::{Field, Multipart};
use chrono::Utc;
use futures::StreamExt;
use tracing::debug;

use crate::error::ApiError;

pub const ALLOWED_IMAGE_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Multipart field carrying the image.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

impl UploadPolicy {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn check_type(&self, content_type: &str) -> Result<(), ApiError> {
        if ALLOWED_IMAGE_TYPES.contains(&content_type) {
            Ok(())
        } else {
            Err(ApiError::validation(
                "Only JPG, PNG, GIF and WebP images are supported",
            ))
        }
    }

    pub fn check_size(&self, size: usize) -> Result<(), ApiError> {
        if size > self.max_bytes {
            Err(ApiError::validation(format!(
                "Image must not exceed {}",
                human_size(self.max_bytes)
            )))
        } else {
            Ok(())
        }
    }
}

fn human_size(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}

#[derive(Debug)]
pub struct ImageFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Reads the `file` field of a multipart body, checking type before the body
/// and size while streaming.
pub async fn read_image(mut payload: Multipart, policy: &UploadPolicy) -> Result<ImageFile, ApiError> {
    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|e| ApiError::validation(e.to_string()))?;
        if field.name() != Some(FILE_FIELD) {
            drain(&mut field).await?;
            continue;
        }

        let content_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();
        policy.check_type(&content_type)?;
        let file_name = field
            .content_disposition()
            .and_then(|disposition| disposition.get_filename())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ApiError::validation(e.to_string()))?;
            policy.check_size(bytes.len() + chunk.len())?;
            bytes.extend_from_slice(&chunk);
        }
        debug!(size = bytes.len(), %content_type, "Received image");
        return Ok(ImageFile {
            file_name,
            content_type,
            bytes,
        });
    }
    Err(ApiError::validation("Please choose an image to upload"))
}

async fn drain(field: &mut Field) -> Result<(), ApiError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|e| ApiError::validation(e.to_string()))?;
    }
    Ok(())
}

/// Storage key `{user}/{millis}-{uuid}.{ext}`, unique per upload.
pub fn object_key(user_id: &str, file_name: Option<&str>, content_type: &str) -> String {
    format!(
        "{}/{}-{}.{}",
        user_id,
        Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple(),
        extension(file_name, content_type)
    )
}

fn extension(file_name: Option<&str>, content_type: &str) -> String {
    file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| {
            match content_type {
                "image/png" => "png",
                "image/gif" => "gif",
                "image/webp" => "webp",
                _ => "jpg",
            }
            .to_string()
        })
}
