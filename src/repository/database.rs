use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::models::todo::{Todo, TodoPatch};
use crate::models::user::User;
use crate::repository::{
    Authenticator, ObjectStorage, RepositoryError, RepositoryResult, TodoRepository,
};

/// In-process todo table, used by tests and the `memory` backend.
pub struct Database {
    pub todos: Arc<Mutex<Vec<Todo>>>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Database {
            todos: Arc::new(Mutex::new(vec![])),
        }
    }

    fn rows(&self) -> MutexGuard<'_, Vec<Todo>> {
        self.todos.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TodoRepository for Database {
    async fn list(&self, owner: &str) -> RepositoryResult<Vec<Todo>> {
        let mut todos: Vec<Todo> = self
            .rows()
            .iter()
            .filter(|todo| todo.user_id == owner)
            .cloned()
            .collect();
        todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(todos)
    }

    async fn create(&self, owner: &str, text: &str) -> RepositoryResult<Todo> {
        let todo = Todo::new(owner, text);
        self.rows().push(todo.clone());
        Ok(todo)
    }

    async fn owner_of(&self, id: &str) -> RepositoryResult<Option<String>> {
        Ok(self
            .rows()
            .iter()
            .find(|todo| todo.id == id)
            .map(|todo| todo.user_id.clone()))
    }

    async fn update(
        &self,
        id: &str,
        owner: &str,
        patch: &TodoPatch,
    ) -> RepositoryResult<Option<Todo>> {
        let mut todos = self.rows();
        let Some(todo) = todos
            .iter_mut()
            .find(|todo| todo.id == id && todo.user_id == owner)
        else {
            return Ok(None);
        };
        patch.apply_to(todo);
        Ok(Some(todo.clone()))
    }

    async fn delete(&self, id: &str, owner: &str) -> RepositoryResult<bool> {
        let mut todos = self.rows();
        let before = todos.len();
        todos.retain(|todo| !(todo.id == id && todo.user_id == owner));
        Ok(todos.len() != before)
    }
}

/// Object store keeping uploads in memory.
pub struct MemoryStorage {
    base_url: String,
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    /// Content type and bytes of a stored object.
    pub fn object(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> RepositoryResult<()> {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        if objects.contains_key(key) {
            return Err(RepositoryError::Conflict(format!(
                "object {key} already exists"
            )));
        }
        objects.insert(key.to_string(), (content_type.to_string(), bytes));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

/// Fixed token-to-user table.
#[derive(Default)]
pub struct StaticTokens {
    users: HashMap<String, User>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.users.insert(token.into(), User::new(user_id));
        self
    }

    /// Parses `token=user_id` pairs separated by commas.
    pub fn parse(spec: &str) -> Self {
        spec.split(',')
            .filter_map(|pair| pair.split_once('='))
            .map(|(token, user)| (token.trim(), user.trim()))
            .filter(|(token, user)| !token.is_empty() && !user.is_empty())
            .fold(Self::new(), |tokens, (token, user)| {
                tokens.with_user(token, user)
            })
    }
}

#[async_trait]
impl Authenticator for StaticTokens {
    async fn user_for_token(&self, token: &str) -> RepositoryResult<Option<User>> {
        Ok(self.users.get(token).cloned())
    }
}
