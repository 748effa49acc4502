//! Headless todo list view.
//!
//! Holds the local copy of the signed-in user's list and keeps it in step
//! with the service: mutations are applied locally first, and when the
//! request fails the server's message is shown and the list is refetched.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::client::{ClientError, ImageUpload, TodoApi};
use crate::models::todo::{Todo, TodoPatch};

/// Lifetime of input validation messages.
pub const INPUT_ERROR_TTL: Duration = Duration::from_secs(2);
/// Lifetime of messages from failed requests.
pub const REQUEST_ERROR_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct InlineError {
    message: String,
    expires_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditState {
    pub id: String,
    pub text: String,
    pub image_url: Option<String>,
}

pub struct TodoListView<A> {
    api: Option<A>,
    todos: Vec<Todo>,
    new_todo: String,
    editing: Option<EditState>,
    error: Option<InlineError>,
    is_loading: bool,
    is_saving: bool,
}

impl<A: TodoApi> TodoListView<A> {
    /// `session` is the API bound to the current user, `None` when signed out.
    /// The view starts in the loading state until [`Self::load`] runs.
    pub fn new(session: Option<A>) -> Self {
        Self {
            api: session,
            todos: Vec::new(),
            new_todo: String::new(),
            editing: None,
            error: None,
            is_loading: true,
            is_saving: false,
        }
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn new_todo(&self) -> &str {
        &self.new_todo
    }

    pub fn editing(&self) -> Option<&EditState> {
        self.editing.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_saving(&self) -> bool {
        self.is_saving
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message_at(Instant::now())
    }

    pub fn error_message_at(&self, now: Instant) -> Option<&str> {
        self.error
            .as_ref()
            .filter(|error| now < error.expires_at)
            .map(|error| error.message.as_str())
    }

    pub async fn load(&mut self) {
        let Some(api) = self.api.as_ref() else {
            self.todos.clear();
            self.is_loading = false;
            return;
        };
        let result = api.list().await;
        match result {
            Ok(todos) => self.todos = todos,
            Err(err) => {
                warn!(error = %err, "Failed to load todos");
                self.show_error("Failed to load, please retry", REQUEST_ERROR_TTL);
            }
        }
        self.is_loading = false;
    }

    /// Swaps the session. Signing in refetches the list, signing out clears it.
    pub async fn on_auth_state_change(&mut self, session: Option<A>) {
        self.api = session;
        self.editing = None;
        if self.api.is_some() {
            self.load().await;
        } else {
            self.todos.clear();
            self.is_loading = false;
        }
    }

    pub fn set_new_todo(&mut self, text: impl Into<String>) {
        self.new_todo = text.into();
        self.error = None;
    }

    pub async fn add_todo(&mut self) {
        if self.api.is_none() {
            self.show_error("Please sign in first", INPUT_ERROR_TTL);
            return;
        }
        let text = self.new_todo.trim().to_string();
        if text.is_empty() {
            self.show_error("Please enter a todo", INPUT_ERROR_TTL);
            return;
        }
        let Some(api) = self.api.as_ref() else {
            return;
        };

        self.is_saving = true;
        self.error = None;
        let result = api.create(&text).await;
        self.is_saving = false;
        match result {
            Ok(todo) => {
                self.todos.insert(0, todo);
                self.new_todo.clear();
            }
            Err(err) => self.show_request_error(err, "Failed to add"),
        }
    }

    pub async fn toggle_todo(&mut self, id: &str) {
        let Some(api) = self.api.as_ref() else {
            return;
        };
        let Some(todo) = self.todos.iter_mut().find(|todo| todo.id == id) else {
            return;
        };
        todo.completed = !todo.completed;
        let patch = TodoPatch::completed(todo.completed);

        let result = api.update(id, &patch).await;
        self.settle(result, "Failed to update").await;
    }

    pub async fn delete_todo(&mut self, id: &str) {
        let Some(api) = self.api.as_ref() else {
            return;
        };
        self.todos.retain(|todo| todo.id != id);

        let result = api.delete(id).await;
        if let Err(err) = result {
            self.rollback(err, "Failed to delete").await;
        }
    }

    pub fn start_editing(&mut self, id: &str) {
        if self.api.is_none() {
            return;
        }
        if let Some(todo) = self.todos.iter().find(|todo| todo.id == id) {
            self.editing = Some(EditState {
                id: todo.id.clone(),
                text: todo.text.clone(),
                image_url: todo.image_url.clone(),
            });
            self.error = None;
        }
    }

    pub fn set_edit_text(&mut self, text: impl Into<String>) {
        if let Some(edit) = self.editing.as_mut() {
            edit.text = text.into();
        }
    }

    pub fn set_edit_image(&mut self, image_url: Option<String>) {
        if let Some(edit) = self.editing.as_mut() {
            edit.image_url = image_url;
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
        self.error = None;
    }

    /// Sends the edited text, and the image only when it changed.
    pub async fn save_edit(&mut self) {
        let Some(edit) = self.editing.clone() else {
            return;
        };
        let text = edit.text.trim().to_string();
        if text.is_empty() {
            self.show_error("Please enter a todo", INPUT_ERROR_TTL);
            return;
        }
        let Some(api) = self.api.as_ref() else {
            return;
        };
        let Some(current) = self.todos.iter_mut().find(|todo| todo.id == edit.id) else {
            self.editing = None;
            return;
        };

        let mut patch = TodoPatch::text(text.clone());
        if current.image_url != edit.image_url {
            patch.image_url = Some(edit.image_url.clone());
        }
        current.text = text;
        current.image_url = edit.image_url;

        self.is_saving = true;
        let result = api.update(&edit.id, &patch).await;
        self.is_saving = false;
        if result.is_ok() {
            self.editing = None;
        }
        self.settle(result, "Failed to save").await;
    }

    /// Uploads `image` and attaches it to the todo. Returns the public URL
    /// once the upload itself succeeded, even if attaching it failed.
    pub async fn upload_image(&mut self, id: &str, image: ImageUpload) -> Option<String> {
        let api = self.api.as_ref()?;
        let result = api.upload_image(&image).await;
        let url = match result {
            Ok(url) => url,
            Err(err) => {
                self.show_request_error(err, "Failed to upload");
                return None;
            }
        };

        if let Some(edit) = self.editing.as_mut().filter(|edit| edit.id == id) {
            edit.image_url = Some(url.clone());
        }
        if let Some(todo) = self.todos.iter_mut().find(|todo| todo.id == id) {
            todo.image_url = Some(url.clone());
        }
        let result = api.update(id, &TodoPatch::image(Some(url.clone()))).await;
        self.settle(result, "Failed to save image").await;
        Some(url)
    }

    pub async fn delete_image(&mut self, id: &str) {
        let Some(api) = self.api.as_ref() else {
            return;
        };
        if let Some(todo) = self.todos.iter_mut().find(|todo| todo.id == id) {
            todo.image_url = None;
        }
        let result = api.update(id, &TodoPatch::image(None)).await;
        self.settle(result, "Failed to delete image").await;
    }

    /// Plain-text rendering of the current state, one line per row.
    pub fn render(&self) -> Vec<String> {
        if self.is_loading {
            return vec!["Loading...".to_string()];
        }
        let mut lines = vec!["Todos".to_string()];
        if !self.is_authenticated() {
            lines.push("Please sign in to use your todo list".to_string());
        }
        if let Some(message) = self.error_message() {
            lines.push(format!("! {message}"));
        }
        for todo in &self.todos {
            let mark = if todo.completed { "x" } else { " " };
            let text = match &self.editing {
                Some(edit) if edit.id == todo.id => format!("> {}", edit.text),
                _ => todo.text.clone(),
            };
            let mut line = format!("[{mark}] {text}");
            if let Some(url) = &todo.image_url {
                line.push_str(&format!(" ({url})"));
            }
            lines.push(line);
        }
        if self.todos.is_empty() {
            lines.push(if self.is_authenticated() {
                "No todos yet, add one to get started!".to_string()
            } else {
                "Sign in to create and manage your todos".to_string()
            });
        }
        lines
    }

    /// Replaces the local row with the server's copy, or rolls back.
    async fn settle(&mut self, result: Result<Todo, ClientError>, fallback: &str) {
        match result {
            Ok(todo) => {
                if let Some(local) = self.todos.iter_mut().find(|local| local.id == todo.id) {
                    *local = todo;
                }
            }
            Err(err) => self.rollback(err, fallback).await,
        }
    }

    async fn rollback(&mut self, err: ClientError, fallback: &str) {
        self.show_request_error(err, fallback);
        let Some(api) = self.api.as_ref() else {
            return;
        };
        let result = api.list().await;
        match result {
            Ok(todos) => self.todos = todos,
            Err(err) => warn!(error = %err, "Refetch after failed request also failed"),
        }
    }

    fn show_request_error(&mut self, err: ClientError, fallback: &str) {
        warn!(status = ?err.status, error = %err, "{fallback}");
        let message = match err.status {
            Some(_) if !err.message.is_empty() => err.message,
            _ => format!("{fallback}, please retry"),
        };
        self.show_error(message, REQUEST_ERROR_TTL);
    }

    fn show_error(&mut self, message: impl Into<String>, ttl: Duration) {
        self.error = Some(InlineError {
            message: message.into(),
            expires_at: Instant::now() + ttl,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use async_trait::async_trait;

    use super::*;
    use crate::client::ClientResult;

    #[derive(Default)]
    struct State {
        rows: RefCell<Vec<Todo>>,
        patches: RefCell<Vec<TodoPatch>>,
        fail_mutations: Cell<bool>,
        calls: Cell<usize>,
    }

    #[derive(Clone, Default)]
    struct FakeApi(Rc<State>);

    impl FakeApi {
        fn with_rows(texts: &[&str]) -> Self {
            let api = Self::default();
            for text in texts {
                api.0.rows.borrow_mut().push(Todo::new("alice", *text));
            }
            api
        }

        fn rejected(&self) -> ClientResult<()> {
            self.0.calls.set(self.0.calls.get() + 1);
            if self.0.fail_mutations.get() {
                Err(ClientError::new(Some(500), "database is down"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait(?Send)]
    impl TodoApi for FakeApi {
        async fn list(&self) -> ClientResult<Vec<Todo>> {
            Ok(self.0.rows.borrow().clone())
        }

        async fn create(&self, text: &str) -> ClientResult<Todo> {
            self.rejected()?;
            let todo = Todo::new("alice", text);
            self.0.rows.borrow_mut().insert(0, todo.clone());
            Ok(todo)
        }

        async fn update(&self, id: &str, patch: &TodoPatch) -> ClientResult<Todo> {
            self.rejected()?;
            self.0.patches.borrow_mut().push(patch.clone());
            let mut rows = self.0.rows.borrow_mut();
            let todo = rows
                .iter_mut()
                .find(|todo| todo.id == id)
                .ok_or_else(|| ClientError::new(Some(403), "forbidden"))?;
            patch.apply_to(todo);
            Ok(todo.clone())
        }

        async fn delete(&self, id: &str) -> ClientResult<()> {
            self.rejected()?;
            self.0.rows.borrow_mut().retain(|todo| todo.id != id);
            Ok(())
        }

        async fn upload_image(&self, image: &ImageUpload) -> ClientResult<String> {
            self.rejected()?;
            Ok(format!("http://files.local/alice/{}", image.file_name))
        }
    }

    async fn signed_in(api: &FakeApi) -> TodoListView<FakeApi> {
        let mut view = TodoListView::new(Some(api.clone()));
        view.load().await;
        view
    }

    fn first_id(view: &TodoListView<FakeApi>) -> String {
        view.todos()[0].id.clone()
    }

    #[actix_web::test]
    async fn signed_out_view_is_empty_and_prompts() {
        let mut view: TodoListView<FakeApi> = TodoListView::new(None);
        assert_eq!(view.render(), vec!["Loading..."]);
        view.load().await;
        assert!(!view.is_loading());
        assert!(!view.is_authenticated());
        assert!(view.todos().is_empty());
        assert!(view
            .render()
            .contains(&"Please sign in to use your todo list".to_string()));

        view.set_new_todo("milk");
        view.add_todo().await;
        assert_eq!(view.error_message(), Some("Please sign in first"));
    }

    #[actix_web::test]
    async fn add_prepends_and_clears_input() {
        let api = FakeApi::with_rows(&["old"]);
        let mut view = signed_in(&api).await;

        view.set_new_todo("  new one ");
        view.add_todo().await;
        assert_eq!(view.todos()[0].text, "new one");
        assert_eq!(view.todos().len(), 2);
        assert_eq!(view.new_todo(), "");
        assert!(!view.is_saving());
    }

    #[actix_web::test]
    async fn blank_input_shows_transient_error_without_request() {
        let api = FakeApi::default();
        let mut view = signed_in(&api).await;

        view.set_new_todo("   ");
        view.add_todo().await;
        assert_eq!(api.0.calls.get(), 0);
        assert_eq!(view.error_message(), Some("Please enter a todo"));
        let later = Instant::now() + INPUT_ERROR_TTL + Duration::from_millis(10);
        assert_eq!(view.error_message_at(later), None);

        view.set_new_todo("x");
        assert_eq!(view.error_message(), None);
    }

    #[actix_web::test]
    async fn toggle_twice_restores_completion() {
        let api = FakeApi::with_rows(&["walk dog"]);
        let mut view = signed_in(&api).await;
        let id = first_id(&view);

        view.toggle_todo(&id).await;
        assert!(view.todos()[0].completed);
        view.toggle_todo(&id).await;
        assert!(!view.todos()[0].completed);
        assert!(!api.0.rows.borrow()[0].completed);
    }

    #[actix_web::test]
    async fn failed_toggle_rolls_back_by_refetch() {
        let api = FakeApi::with_rows(&["walk dog"]);
        let mut view = signed_in(&api).await;
        let id = first_id(&view);

        api.0.fail_mutations.set(true);
        view.toggle_todo(&id).await;
        assert!(!view.todos()[0].completed);
        assert_eq!(view.error_message(), Some("database is down"));
    }

    #[actix_web::test]
    async fn failed_delete_restores_row() {
        let api = FakeApi::with_rows(&["keep me"]);
        let mut view = signed_in(&api).await;
        let id = first_id(&view);

        api.0.fail_mutations.set(true);
        view.delete_todo(&id).await;
        assert_eq!(view.todos().len(), 1);

        api.0.fail_mutations.set(false);
        view.delete_todo(&id).await;
        assert!(view.todos().is_empty());
        assert!(view
            .render()
            .contains(&"No todos yet, add one to get started!".to_string()));
    }

    #[actix_web::test]
    async fn save_edit_sends_image_only_when_changed() {
        let api = FakeApi::with_rows(&["draft"]);
        let mut view = signed_in(&api).await;
        let id = first_id(&view);

        view.start_editing(&id);
        view.set_edit_text(" final ");
        view.save_edit().await;
        assert_eq!(view.editing(), None);
        assert_eq!(view.todos()[0].text, "final");
        assert_eq!(api.0.patches.borrow()[0], TodoPatch::text("final"));

        view.start_editing(&id);
        view.set_edit_image(Some("http://files.local/a.png".to_string()));
        view.save_edit().await;
        let patches = api.0.patches.borrow();
        assert_eq!(
            patches[1].image_url,
            Some(Some("http://files.local/a.png".to_string()))
        );
    }

    #[actix_web::test]
    async fn blank_edit_is_not_sent() {
        let api = FakeApi::with_rows(&["draft"]);
        let mut view = signed_in(&api).await;
        let id = first_id(&view);

        view.start_editing(&id);
        view.set_edit_text("  ");
        view.save_edit().await;
        assert_eq!(api.0.calls.get(), 0);
        assert!(view.editing().is_some());

        view.cancel_edit();
        assert_eq!(view.editing(), None);
        assert_eq!(view.todos()[0].text, "draft");
    }

    #[actix_web::test]
    async fn upload_attaches_image_and_delete_detaches_it() {
        let api = FakeApi::with_rows(&["photo"]);
        let mut view = signed_in(&api).await;
        let id = first_id(&view);
        view.start_editing(&id);

        let url = view
            .upload_image(
                &id,
                ImageUpload {
                    file_name: "cat.png".to_string(),
                    content_type: "image/png".to_string(),
                    bytes: vec![1, 2, 3],
                },
            )
            .await;
        assert_eq!(url.as_deref(), Some("http://files.local/alice/cat.png"));
        assert_eq!(view.todos()[0].image_url, url);
        assert_eq!(view.editing().unwrap().image_url, url);

        view.cancel_edit();
        view.delete_image(&id).await;
        assert_eq!(view.todos()[0].image_url, None);
        assert_eq!(api.0.rows.borrow()[0].image_url, None);
    }

    #[actix_web::test]
    async fn auth_change_refetches_or_clears() {
        let api = FakeApi::with_rows(&["a", "b"]);
        let mut view: TodoListView<FakeApi> = TodoListView::new(None);
        view.load().await;
        assert!(view.todos().is_empty());

        view.on_auth_state_change(Some(api.clone())).await;
        assert!(view.is_authenticated());
        assert_eq!(view.todos().len(), 2);

        view.on_auth_state_change(None).await;
        assert!(!view.is_authenticated());
        assert!(view.todos().is_empty());
    }
}
