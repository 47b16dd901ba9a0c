use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::debug;

use rookery_crypto::token::TokenPurpose;
use rookery_types::models::User;
use rookery_types::permission::Permission;

use crate::error::ApiError;
use crate::{AppState, blocking};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Who is making the request. Always present; defaults to anonymous.
#[derive(Debug, Clone, Default)]
pub enum Viewer {
    #[default]
    Anonymous,
    User(User),
}

impl Viewer {
    pub fn user(&self) -> Option<&User> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(user) => Some(user),
        }
    }

    /// Anonymous viewers have no permissions.
    pub fn can(&self, permissions: Permission) -> bool {
        self.user().is_some_and(|u| u.can(permissions))
    }

    pub fn is_administrator(&self) -> bool {
        self.user().is_some_and(User::is_administrator)
    }

    /// 401 for anonymous viewers, 403 when the role lacks any of the bits.
    pub fn require(&self, permissions: Permission) -> Result<&User, ApiError> {
        let user = self.user().ok_or(ApiError::Unauthorized)?;
        if !user.can(permissions) {
            return Err(ApiError::Forbidden);
        }
        Ok(user)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Viewer>().cloned().unwrap_or_default())
    }
}

/// An authenticated account; rejects anonymous requests with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Viewer>() {
            Some(Viewer::User(user)) => Ok(CurrentUser(user.clone())),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

fn session_token(req: &Request) -> Option<String> {
    if let Some(auth) = req.headers().typed_get::<Authorization<Bearer>>() {
        return Some(auth.token().to_string());
    }
    CookieJar::from_headers(req.headers())
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

/// Resolve the session token (bearer header or cookie) into a [`Viewer`]
/// and record the account's activity.
pub async fn load_viewer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = session_token(&req).and_then(|token| state.tokens.decode(&token, TokenPurpose::Session));

    let viewer = match user_id {
        Some(user_id) => {
            let user = blocking(&state, move |s| {
                let Some(row) = s.db.get_user_by_id(user_id)? else {
                    return Ok(None);
                };
                s.db.ping(row.id)?;
                Ok(Some(User::from(row)))
            })
            .await?;

            match user {
                Some(user) => Viewer::User(user),
                None => {
                    debug!("Session token for unknown user {}", user_id);
                    Viewer::Anonymous
                }
            }
        }
        None => Viewer::Anonymous,
    };

    req.extensions_mut().insert(viewer);
    Ok(next.run(req).await)
}

/// Send signed-in accounts that have not confirmed their email to `/unconfirmed`.
pub async fn require_confirmed(req: Request, next: Next) -> Response {
    if let Some(Viewer::User(user)) = req.extensions().get::<Viewer>() {
        if !user.confirmed {
            return Redirect::to("/unconfirmed").into_response();
        }
    }
    next.run(req).await
}
