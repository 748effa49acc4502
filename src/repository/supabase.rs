use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::models::todo::{Todo, TodoPatch};
use crate::models::user::User;
use crate::repository::{
    Authenticator, ObjectStorage, RepositoryError, RepositoryResult, TodoRepository,
};

const TODOS_TABLE: &str = "todos";

/// Client for a Supabase project: PostgREST rows, GoTrue users and Storage
/// objects all share the project URL and API key.
#[derive(Clone, Debug)]
pub struct Supabase {
    client: Client,
    url: String,
    key: String,
    bucket: String,
}

#[derive(Deserialize)]
struct OwnerRow {
    user_id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
    msg: Option<String>,
}

impl Supabase {
    pub fn new(url: impl Into<String>, key: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            bucket: bucket.into(),
        }
    }

    fn rest_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, TODOS_TABLE)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.url, self.bucket, key)
    }

    fn with_key(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.key).bearer_auth(&self.key)
    }

    async fn rows<T: DeserializeOwned>(request: RequestBuilder) -> RepositoryResult<Vec<T>> {
        let response = checked(request.send().await?).await?;
        Ok(response.json().await?)
    }
}

/// Turns a non-2xx response into `RepositoryError::Rejected`, keeping the
/// backend's message.
async fn checked(response: Response) -> RepositoryResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("backend request failed")
            .to_string()
    });
    warn!(status = status.as_u16(), %message, "Backend rejected request");
    Err(RepositoryError::Rejected {
        status: status.as_u16(),
        message,
    })
}

fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed.message.or(parsed.error).or(parsed.msg)
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl TodoRepository for Supabase {
    async fn list(&self, owner: &str) -> RepositoryResult<Vec<Todo>> {
        let request = self.with_key(self.client.get(self.rest_url())).query(&[
            ("select", "*".to_string()),
            ("user_id", eq(owner)),
            ("order", "created_at.desc".to_string()),
        ]);
        Self::rows(request).await
    }

    async fn create(&self, owner: &str, text: &str) -> RepositoryResult<Todo> {
        let request = self
            .with_key(self.client.post(self.rest_url()))
            .header("Prefer", "return=representation")
            .json(&json!([{ "user_id": owner, "text": text, "completed": false }]));
        let mut rows: Vec<Todo> = Self::rows(request).await?;
        rows.pop().ok_or_else(|| RepositoryError::Rejected {
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: "insert returned no row".to_string(),
        })
    }

    async fn owner_of(&self, id: &str) -> RepositoryResult<Option<String>> {
        let request = self
            .with_key(self.client.get(self.rest_url()))
            .query(&[("select", "user_id".to_string()), ("id", eq(id))]);
        let rows: Vec<OwnerRow> = Self::rows(request).await?;
        Ok(rows.into_iter().next().map(|row| row.user_id))
    }

    async fn update(
        &self,
        id: &str,
        owner: &str,
        patch: &TodoPatch,
    ) -> RepositoryResult<Option<Todo>> {
        let request = self
            .with_key(self.client.patch(self.rest_url()))
            .query(&[("id", eq(id)), ("user_id", eq(owner))])
            .header("Prefer", "return=representation")
            .json(patch);
        let rows: Vec<Todo> = Self::rows(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn delete(&self, id: &str, owner: &str) -> RepositoryResult<bool> {
        let request = self
            .with_key(self.client.delete(self.rest_url()))
            .query(&[("id", eq(id)), ("user_id", eq(owner))])
            .header("Prefer", "return=representation");
        let rows: Vec<Todo> = Self::rows(request).await?;
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl Authenticator for Supabase {
    async fn user_for_token(&self, token: &str) -> RepositoryResult<Option<User>> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.url))
            .header("apikey", &self.key)
            .bearer_auth(token)
            .send()
            .await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("Access token rejected");
                Ok(None)
            }
            _ => Ok(Some(checked(response).await?.json().await?)),
        }
    }
}

#[async_trait]
impl ObjectStorage for Supabase {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> RepositoryResult<()> {
        let request = self
            .with_key(self.client.post(self.object_url(key)))
            .header("content-type", content_type)
            .header("cache-control", "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes);
        checked(request.send().await?).await?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.url, self.bucket, key
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_from_project_url() {
        let supabase = Supabase::new("https://demo.supabase.co/", "key", "todolist");
        assert_eq!(supabase.rest_url(), "https://demo.supabase.co/rest/v1/todos");
        assert_eq!(
            supabase.object_url("alice/1.png"),
            "https://demo.supabase.co/storage/v1/object/todolist/alice/1.png"
        );
        assert_eq!(
            supabase.public_url("alice/1.png"),
            "https://demo.supabase.co/storage/v1/object/public/todolist/alice/1.png"
        );
    }

    #[test]
    fn error_message_prefers_message_field() {
        assert_eq!(
            error_message(r#"{"message":"duplicate key","error":"x"}"#).as_deref(),
            Some("duplicate key")
        );
        assert_eq!(
            error_message(r#"{"error":"invalid_grant"}"#).as_deref(),
            Some("invalid_grant")
        );
        assert_eq!(error_message("not json"), None);
    }

    #[test]
    fn filters_use_postgrest_syntax() {
        assert_eq!(eq("abc"), "eq.abc");
    }
}
