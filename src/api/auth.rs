use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use tracing::debug;

use crate::error::ApiError;
use crate::models::user::User;
use crate::repository::Backend;

/// Cookie this service reads the access token from when no `Authorization`
/// header is sent. The name is a convention of this service; browser clients
/// copy their session's access token into it.
pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";

/// Extracts the caller, rejecting the request with 401 when there is no
/// accepted access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let backend = req.app_data::<web::Data<Backend>>().cloned();
        let token = access_token(req);
        Box::pin(async move {
            let backend =
                backend.ok_or_else(|| ApiError::Backend("backend is not configured".into()))?;
            let Some(token) = token else {
                debug!("Request without access token");
                return Err(ApiError::Unauthenticated);
            };
            backend
                .auth
                .user_for_token(&token)
                .await?
                .map(AuthenticatedUser)
                .ok_or(ApiError::Unauthenticated)
        })
    }
}

/// Bearer token from the `Authorization` header, falling back to the session
/// cookie.
pub fn access_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .split_once(' ')
                .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
                .map(|(_, token)| token.trim().to_string())
        })
        .filter(|token| !token.is_empty());
    from_header.or_else(|| {
        req.cookie(ACCESS_TOKEN_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
    })
}
