use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::todo::{Todo, TodoPatch};
use crate::models::user::User;

pub mod database;
pub mod supabase;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("{0}")]
    Conflict(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Row storage for todos. Every mutation is scoped to `owner` in addition to
/// the caller-side ownership check.
#[async_trait]
pub trait TodoRepository: Send + Sync {
    /// The owner's todos, newest first.
    async fn list(&self, owner: &str) -> RepositoryResult<Vec<Todo>>;

    async fn create(&self, owner: &str, text: &str) -> RepositoryResult<Todo>;

    /// Owner column of the row, `None` when the row does not exist.
    async fn owner_of(&self, id: &str) -> RepositoryResult<Option<String>>;

    async fn update(&self, id: &str, owner: &str, patch: &TodoPatch)
        -> RepositoryResult<Option<Todo>>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: &str, owner: &str) -> RepositoryResult<bool>;
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolves an access token, `None` when the token is not accepted.
    async fn user_for_token(&self, token: &str) -> RepositoryResult<Option<User>>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores a new object. Existing keys are never overwritten.
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> RepositoryResult<()>;

    fn public_url(&self, key: &str) -> String;
}

/// External services the handlers talk to.
#[derive(Clone)]
pub struct Backend {
    pub todos: Arc<dyn TodoRepository>,
    pub auth: Arc<dyn Authenticator>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl Backend {
    pub fn new(
        todos: Arc<dyn TodoRepository>,
        auth: Arc<dyn Authenticator>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            todos,
            auth,
            storage,
        }
    }
}
