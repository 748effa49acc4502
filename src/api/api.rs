use actix_multipart::Multipart;
use actix_web::{delete, get, patch, post, web, HttpResponse};
use tracing::{info, warn};

use crate::api::auth::AuthenticatedUser;
use crate::api::upload::{object_key, read_image, UploadPolicy};
use crate::error::ApiError;
use crate::models::todo::{Deleted, NewTodo, TodoItem, TodoList, TodoPatch, UploadedImage};
use crate::repository::Backend;

#[get("/todos")]
pub async fn get_todos(
    user: AuthenticatedUser,
    backend: web::Data<Backend>,
) -> Result<HttpResponse, ApiError> {
    let todos = backend.todos.list(user.id()).await?;
    Ok(HttpResponse::Ok().json(TodoList { todos }))
}

#[post("/todos")]
pub async fn create_todo(
    user: AuthenticatedUser,
    backend: web::Data<Backend>,
    new_todo: web::Json<NewTodo>,
) -> Result<HttpResponse, ApiError> {
    let text = new_todo.text.trim();
    if text.is_empty() {
        return Err(ApiError::validation("Todo text must not be empty"));
    }
    let todo = backend.todos.create(user.id(), text).await?;
    info!(user = user.id(), todo = %todo.id, "Created todo");
    Ok(HttpResponse::Created().json(TodoItem { todo }))
}

#[patch("/todos/{id}")]
pub async fn update_todo_by_id(
    user: AuthenticatedUser,
    backend: web::Data<Backend>,
    id: web::Path<String>,
    patch: web::Json<TodoPatch>,
) -> Result<HttpResponse, ApiError> {
    ensure_owner(&backend, &id, &user).await?;
    let patch = validate_patch(patch.into_inner())?;
    let todo = backend
        .todos
        .update(&id, user.id(), &patch)
        .await?
        .ok_or(ApiError::Forbidden)?;
    info!(user = user.id(), todo = %todo.id, "Updated todo");
    Ok(HttpResponse::Ok().json(TodoItem { todo }))
}

#[delete("/todos/{id}")]
pub async fn delete_todo_by_id(
    user: AuthenticatedUser,
    backend: web::Data<Backend>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    ensure_owner(&backend, &id, &user).await?;
    if !backend.todos.delete(&id, user.id()).await? {
        return Err(ApiError::Forbidden);
    }
    info!(user = user.id(), todo = %id, "Deleted todo");
    Ok(HttpResponse::Ok().json(Deleted { success: true }))
}

#[post("/upload-image")]
pub async fn upload_image(
    user: AuthenticatedUser,
    backend: web::Data<Backend>,
    policy: web::Data<UploadPolicy>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let image = read_image(payload, &policy).await?;
    let key = object_key(user.id(), image.file_name.as_deref(), &image.content_type);
    backend
        .storage
        .upload(&key, image.bytes, &image.content_type)
        .await?;
    info!(user = user.id(), %key, "Uploaded image");
    Ok(HttpResponse::Created().json(UploadedImage {
        image_url: backend.storage.public_url(&key),
    }))
}

/// Missing rows, rows of other users and failed lookups (such as a
/// malformed id) are all reported as forbidden.
async fn ensure_owner(
    backend: &Backend,
    id: &str,
    user: &AuthenticatedUser,
) -> Result<(), ApiError> {
    match backend.todos.owner_of(id).await {
        Ok(Some(owner)) if owner == user.id() => Ok(()),
        Ok(_) => {
            warn!(user = user.id(), todo = id, "Rejected access to todo");
            Err(ApiError::Forbidden)
        }
        Err(err) => {
            warn!(user = user.id(), todo = id, error = %err, "Owner lookup failed");
            Err(ApiError::Forbidden)
        }
    }
}

fn validate_patch(mut patch: TodoPatch) -> Result<TodoPatch, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::validation("Nothing to update"));
    }
    if let Some(text) = patch.text.as_mut() {
        let trimmed = text.trim().to_string();
        if trimmed.is_empty() {
            return Err(ApiError::validation("Todo text must not be empty"));
        }
        *text = trimmed;
    }
    Ok(patch)
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::validation(err.to_string()).into())
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(json_config())
            .service(get_todos)
            .service(create_todo)
            .service(update_todo_by_id)
            .service(delete_todo_by_id)
            .service(upload_image),
    );
}
