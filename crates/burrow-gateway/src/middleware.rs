use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;

pub const OWNER_COOKIE: &str = "userID";

/// The client identity carried by the `userID` cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

/// Resolves the owner from the cookie, issuing a fresh one when absent.
pub async fn owner_cookie(jar: CookieJar, mut request: Request, next: Next) -> Response {
    match jar.get(OWNER_COOKIE).map(|c| c.value().to_string()) {
        Some(owner) if !owner.is_empty() => {
            request.extensions_mut().insert(Owner(owner));
            next.run(request).await
        }
        _ => {
            let owner = Uuid::new_v4().to_string();
            debug!(owner = %owner, "issuing owner cookie");
            request.extensions_mut().insert(Owner(owner.clone()));

            let cookie = Cookie::build((OWNER_COOKIE, owner))
                .path("/")
                .http_only(true);
            let response = next.run(request).await;
            (jar.add(cookie), response).into_response()
        }
    }
}

impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Owner>()
            .cloned()
            .ok_or_else(|| AppError::BadRequest("missing owner".to_string()))
    }
}
