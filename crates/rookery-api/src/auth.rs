use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use tracing::{info, warn};

use rookery_crypto::password::{hash_password, verify_password};
use rookery_crypto::token::{REMEMBER_ME_TTL_DAYS, TokenPurpose};
use rookery_db::is_unique_violation;
use rookery_types::api::{
    ChangeEmailForm, ChangePasswordRequest, LoginRequest, LoginResponse, PasswordResetForm,
    PasswordResetRequest, RegisterRequest, UnconfirmedResponse,
};

use crate::error::{ApiError, Notice};
use crate::extract::Valid;
use crate::mail::{Template, send_mail};
use crate::middleware::{CurrentUser, SESSION_COOKIE, Viewer};
use crate::{AppState, blocking};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/register", post(register))
        .route("/confirm", get(resend_confirmation))
        .route("/confirm/{token}", get(confirm))
        .route("/unconfirmed", get(unconfirmed))
        .route("/changepassword", post(change_password))
        .route("/resetpassword", post(request_password_reset))
        .route("/resetpassword/{token}", post(reset_password))
        .route("/resetemail", get(request_email_change).post(request_email_change))
        .route("/resetemail/{token}", post(change_email))
}

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    next: Option<String>,
}

/// Only same-site absolute paths are honoured as a post-login destination.
fn local_redirect(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<NextQuery>,
    jar: CookieJar,
    Valid(req): Valid<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let remember_me = req.remember_me;
    let ttl = if remember_me {
        chrono::Duration::days(REMEMBER_ME_TTL_DAYS)
    } else {
        TokenPurpose::Session.default_ttl()
    };

    let (user_id, username, token) = blocking(&state, move |s| {
        let user = s
            .db
            .get_user_by_email(&req.email)?
            .ok_or(ApiError::InvalidCredentials)?;

        if !verify_password(&req.password, &user.password_hash) {
            warn!(user_id = user.id, "Failed login attempt");
            return Err(ApiError::InvalidCredentials);
        }

        s.db.ping(user.id)?;
        let token = s.tokens.issue(TokenPurpose::Session, user.id, ttl)?;
        Ok((user.id, user.username, token))
    })
    .await?;

    info!(user_id, "User logged in");

    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.settings.is_secure());
    let cookie = if remember_me {
        cookie.max_age(time::Duration::days(REMEMBER_ME_TTL_DAYS))
    } else {
        cookie
    };

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            user_id,
            username,
            token,
            location: local_redirect(query.next.as_deref()),
        }),
    ))
}

pub async fn logout(CurrentUser(user): CurrentUser, jar: CookieJar) -> (CookieJar, Notice) {
    info!(user_id = user.id, "User logged out");
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Notice::new("You have been logged out.", "/"),
    )
}

fn map_duplicate_account(err: anyhow::Error) -> ApiError {
    if !is_unique_violation(&err) {
        return err.into();
    }
    if err.to_string().contains("users.username") {
        ApiError::field("username", "Username already in use.")
    } else {
        ApiError::field("email", "Email already registered.")
    }
}

pub async fn register(
    State(state): State<AppState>,
    Valid(req): Valid<RegisterRequest>,
) -> Result<Notice, ApiError> {
    let (user_id, email, username, token) = blocking(&state, move |s| {
        if s.db.get_user_by_email(&req.email)?.is_some() {
            return Err(ApiError::field("email", "Email already registered."));
        }
        if s.db.get_user_by_username(&req.username)?.is_some() {
            return Err(ApiError::field("username", "Username already in use."));
        }

        let password_hash = hash_password(&req.password)?;
        let role = s
            .db
            .role_for_new_user(&req.email, s.settings.admin_email.as_deref())?;
        let user_id = s
            .db
            .create_user(&req.username, &req.email, &password_hash, role.map(|r| r.id))
            .map_err(map_duplicate_account)?;

        let token = s
            .tokens
            .issue(TokenPurpose::Confirm, user_id, TokenPurpose::Confirm.default_ttl())?;
        Ok((user_id, req.email, req.username, token))
    })
    .await?;

    info!(user_id, "Registered new account");
    send_mail(&state, email, username, Template::Confirm, token).await?;

    Ok(Notice::new("You can now login.", "/login"))
}

pub async fn confirm(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(token): Path<String>,
) -> Result<Notice, ApiError> {
    if user.confirmed {
        return Ok(Notice::new("Your account is already confirmed.", "/"));
    }

    if !state.tokens.verify(&token, TokenPurpose::Confirm, user.id) {
        warn!(user_id = user.id, "Rejected confirmation token");
        return Ok(Notice::new(
            "The confirmation link is invalid or has expired.",
            "/",
        ));
    }

    let user_id = user.id;
    blocking(&state, move |s| Ok(s.db.confirm_user(user_id)?)).await?;
    info!(user_id, "Account confirmed");

    Ok(Notice::new("You have confirmed your account. Thanks!", "/"))
}

pub async fn resend_confirmation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Notice, ApiError> {
    let token = state
        .tokens
        .issue(TokenPurpose::Confirm, user.id, TokenPurpose::Confirm.default_ttl())?;
    send_mail(&state, user.email, user.username, Template::Confirm, token).await?;

    Ok(Notice::new(
        "A new confirmation email has been sent to you by email.",
        "/",
    ))
}

pub async fn unconfirmed(viewer: Viewer) -> Response {
    match viewer {
        Viewer::User(user) if !user.confirmed => Json(UnconfirmedResponse {
            message: "You have not confirmed your account yet. \
                      Check your inbox for the confirmation link."
                .into(),
            email: user.email,
        })
        .into_response(),
        _ => Redirect::to("/").into_response(),
    }
}

pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Valid(req): Valid<ChangePasswordRequest>,
) -> Result<Notice, ApiError> {
    let user_id = user.id;
    let changed = blocking(&state, move |s| {
        let row = s.db.get_user_by_id(user_id)?.ok_or(ApiError::Unauthorized)?;
        if !verify_password(&req.old_password, &row.password_hash) {
            return Ok(false);
        }
        let password_hash = hash_password(&req.new_password)?;
        s.db.set_password_hash(user_id, &password_hash)?;
        Ok(true)
    })
    .await?;

    if !changed {
        warn!(user_id, "Password change with wrong current password");
        return Ok(Notice::new(
            "Your current password is incorrect.",
            "/changepassword",
        ));
    }

    info!(user_id, "Password changed");
    Ok(Notice::new("Your password has been updated.", "/"))
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    Valid(req): Valid<PasswordResetRequest>,
) -> Result<Notice, ApiError> {
    let (email, username, token) = blocking(&state, move |s| {
        let user = s
            .db
            .get_user_by_email(&req.email)?
            .ok_or_else(|| ApiError::field("email", "Unknown email address."))?;
        let token = s.tokens.issue(
            TokenPurpose::ResetPassword,
            user.id,
            TokenPurpose::ResetPassword.default_ttl(),
        )?;
        Ok((user.email, user.username, token))
    })
    .await?;

    send_mail(&state, email, username, Template::ResetPassword, token).await?;

    Ok(Notice::new(
        "An email with instructions to reset your password has been sent to you.",
        "/login",
    ))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Valid(req): Valid<PasswordResetForm>,
) -> Result<Notice, ApiError> {
    let reset = blocking(&state, move |s| {
        let Some(user) = s.db.get_user_by_email(&req.email)? else {
            return Ok(None);
        };
        if !s.tokens.verify(&token, TokenPurpose::ResetPassword, user.id) {
            return Ok(None);
        }
        let password_hash = hash_password(&req.new_password)?;
        s.db.set_password_hash(user.id, &password_hash)?;
        Ok(Some(user.id))
    })
    .await?;

    match reset {
        Some(user_id) => {
            info!(user_id, "Password reset");
            Ok(Notice::new("Your password has been updated.", "/login"))
        }
        None => {
            warn!("Rejected password reset");
            Ok(Notice::new(
                "The reset link is invalid or has expired.",
                "/resetpassword",
            ))
        }
    }
}

pub async fn request_email_change(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Notice, ApiError> {
    let token = state.tokens.issue(
        TokenPurpose::ChangeEmail,
        user.id,
        TokenPurpose::ChangeEmail.default_ttl(),
    )?;
    send_mail(&state, user.email, user.username, Template::ChangeEmail, token).await?;

    Ok(Notice::new(
        "An email with instructions to change your email address has been sent to you.",
        "/",
    ))
}

pub async fn change_email(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(token): Path<String>,
    Valid(req): Valid<ChangeEmailForm>,
) -> Result<Notice, ApiError> {
    if !state.tokens.verify(&token, TokenPurpose::ChangeEmail, user.id) {
        warn!(user_id = user.id, "Rejected email change token");
        return Ok(Notice::new(
            "The link is invalid or has expired.",
            "/resetemail",
        ));
    }

    let user_id = user.id;
    blocking(&state, move |s| {
        if let Some(other) = s.db.get_user_by_email(&req.new_email)? {
            if other.id != user_id {
                return Err(ApiError::field("new_email", "Email already registered."));
            }
        }
        s.db.set_email(user_id, &req.new_email).map_err(|err| {
            if is_unique_violation(&err) {
                ApiError::field("new_email", "Email already registered.")
            } else {
                err.into()
            }
        })
    })
    .await?;

    info!(user_id, "Email address changed");
    Ok(Notice::new("Your email address has been updated.", "/"))
}
