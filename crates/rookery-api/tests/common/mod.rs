//! Shared fixtures for router tests: an in-memory app and a mailer that
//! records instead of sending.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;

use rookery_api::mail::{Mailer, OutgoingMail, Template};
use rookery_api::{AppState, AppStateInner, Settings};
use rookery_crypto::token::{TokenPurpose, TokenService};
use rookery_db::Database;

pub const ADMIN_EMAIL: &str = "admin@example.com";

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingMail>>,
}

impl Mailer for RecordingMailer {
    fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn location(&self) -> &str {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}

pub struct TestApp {
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    pub upload_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let upload_dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.insert_roles().unwrap();

        let mailer = Arc::new(RecordingMailer::default());
        let settings = Settings {
            admin_email: Some(ADMIN_EMAIL.into()),
            upload_dir: upload_dir.path().to_path_buf(),
            max_upload_bytes: 1024 * 1024,
            posts_per_page: 2,
            ..Settings::default()
        };

        let state = Arc::new(AppStateInner {
            db,
            tokens: TokenService::new("test-secret"),
            mailer: mailer.clone(),
            settings,
        });

        Self {
            state,
            mailer,
            upload_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = rookery_api::router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    /// Insert an account directly, skipping password hashing, and return
    /// its id with a session token.
    pub fn seed_user(&self, username: &str, confirmed: bool) -> (i64, String) {
        let db = &self.state.db;
        let email = format!("{username}@example.com");
        let role = db.role_for_new_user(&email, Some(ADMIN_EMAIL)).unwrap();
        let id = db
            .create_user(username, &email, "unused", role.map(|r| r.id))
            .unwrap();
        if confirmed {
            db.confirm_user(id).unwrap();
        }
        (id, self.session_for(id))
    }

    pub fn session_for(&self, user_id: i64) -> String {
        self.state
            .tokens
            .issue(TokenPurpose::Session, user_id, TokenPurpose::Session.default_ttl())
            .unwrap()
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.mailer.sent.lock().unwrap().clone()
    }

    /// Token carried by the most recent mail of `template`.
    pub fn last_token(&self, template: Template) -> String {
        self.sent()
            .into_iter()
            .rev()
            .find(|mail| mail.template == template)
            .map(|mail| mail.token)
            .expect("no mail of that kind was sent")
    }
}
