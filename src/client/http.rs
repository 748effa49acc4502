use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::api::upload::FILE_FIELD;
use crate::client::{ClientError, ClientResult, ImageUpload, TodoApi};
use crate::error::ErrorBody;
use crate::models::todo::{NewTodo, Todo, TodoItem, TodoList, TodoPatch, UploadedImage};

/// `TodoApi` over HTTP, authenticating with a bearer access token.
#[derive(Clone, Debug)]
pub struct HttpTodoApi {
    client: Client,
    base_url: String,
    access_token: String,
}

impl HttpTodoApi {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        Ok(checked(response).await?.json().await?)
    }
}

/// Maps an error response to its `{ "error": ... }` message.
async fn checked(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    Err(ClientError::new(Some(status.as_u16()), message))
}

#[async_trait(?Send)]
impl TodoApi for HttpTodoApi {
    async fn list(&self) -> ClientResult<Vec<Todo>> {
        let list: TodoList = self.send(self.client.get(self.url("/todos"))).await?;
        Ok(list.todos)
    }

    async fn create(&self, text: &str) -> ClientResult<Todo> {
        let body = NewTodo {
            text: text.to_string(),
        };
        let item: TodoItem = self
            .send(self.client.post(self.url("/todos")).json(&body))
            .await?;
        Ok(item.todo)
    }

    async fn update(&self, id: &str, patch: &TodoPatch) -> ClientResult<Todo> {
        let item: TodoItem = self
            .send(self.client.patch(self.url(&format!("/todos/{id}"))).json(patch))
            .await?;
        Ok(item.todo)
    }

    async fn delete(&self, id: &str) -> ClientResult<()> {
        let _: serde_json::Value = self
            .send(self.client.delete(self.url(&format!("/todos/{id}"))))
            .await?;
        Ok(())
    }

    async fn upload_image(&self, image: &ImageUpload) -> ClientResult<String> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)?;
        let form = Form::new().part(FILE_FIELD, part);
        let uploaded: UploadedImage = self
            .send(self.client.post(self.url("/upload-image")).multipart(form))
            .await?;
        Ok(uploaded.image_url)
    }
}
