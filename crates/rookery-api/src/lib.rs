pub mod auth;
pub mod error;
pub mod extract;
pub mod mail;
pub mod middleware;
pub mod photos;
pub mod posts;
pub mod users;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit};
use tracing::error;

use rookery_crypto::token::TokenService;
use rookery_db::Database;

use crate::error::ApiError;
use crate::mail::Mailer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenService,
    pub mailer: Arc<dyn Mailer>,
    pub settings: Settings,
}

/// Runtime knobs the handlers need. Built from the environment by the
/// server binary, or directly by tests.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Accounts registered with this address get the all-permissions role.
    pub admin_email: Option<String>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub posts_per_page: u32,
    /// Public origin used to build links in outgoing mail.
    pub base_url: String,
    pub mail_subject_prefix: String,
}

impl Settings {
    /// Whether the site is served over TLS; decides cookie and gravatar schemes.
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            admin_email: None,
            upload_dir: PathBuf::from("./uploads"),
            max_upload_bytes: 16 * 1024 * 1024,
            posts_per_page: 20,
            base_url: "http://localhost:3000".into(),
            mail_subject_prefix: "[Rookery]".into(),
        }
    }
}

/// Build the application router.
///
/// The auth routes stay reachable for unconfirmed accounts; every other
/// router sits behind the unconfirmed gate.
pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .merge(photos::router(&state.settings.upload_dir))
        .merge(posts::router())
        .merge(users::router())
        .layer(axum::middleware::from_fn(middleware::require_confirmed));

    Router::new()
        .merge(auth::router())
        .merge(gated)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::load_viewer,
        ))
        .layer(DefaultBodyLimit::max(state.settings.max_upload_bytes))
        .with_state(state)
}

/// Run blocking store/crypto/mail work off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
}

/// Offset of a 1-based page.
pub(crate) fn page_offset(page: u32, per_page: u32) -> u32 {
    page.saturating_sub(1).saturating_mul(per_page)
}
