use async_trait::async_trait;
use thiserror::Error;

use crate::models::todo::{Todo, TodoPatch};

pub mod http;
pub mod view;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ClientError {
    /// HTTP status, `None` when the request never got a response.
    pub status: Option<u16>,
    pub message: String,
}

impl ClientError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// An image picked for upload.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Calls the todo routes on behalf of the signed-in user.
#[async_trait(?Send)]
pub trait TodoApi {
    async fn list(&self) -> ClientResult<Vec<Todo>>;

    async fn create(&self, text: &str) -> ClientResult<Todo>;

    async fn update(&self, id: &str, patch: &TodoPatch) -> ClientResult<Todo>;

    async fn delete(&self, id: &str) -> ClientResult<()>;

    /// Uploads an image and returns its public URL.
    async fn upload_image(&self, image: &ImageUpload) -> ClientResult<String>;
}
