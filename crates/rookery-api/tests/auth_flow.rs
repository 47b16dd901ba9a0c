mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::json;

use common::{ADMIN_EMAIL, TestApp};
use rookery_api::mail::Template;
use rookery_crypto::password::hash_password;
use rookery_crypto::token::TokenPurpose;

async fn register(app: &TestApp, email: &str, username: &str, password: &str) -> common::TestResponse {
    app.post(
        "/register",
        None,
        json!({
            "email": email,
            "username": username,
            "password": password,
            "password2": password,
        }),
    )
    .await
}

async fn login(app: &TestApp, email: &str, password: &str) -> common::TestResponse {
    app.post("/login", None, json!({ "email": email, "password": password }))
        .await
}

/// A confirmed account with a real password hash.
fn seed_with_password(app: &TestApp, username: &str, password: &str) -> i64 {
    let db = &app.state.db;
    let role = db.default_role().unwrap().map(|r| r.id);
    let id = db
        .create_user(
            username,
            &format!("{username}@example.com"),
            &hash_password(password).unwrap(),
            role,
        )
        .unwrap();
    db.confirm_user(id).unwrap();
    id
}

#[tokio::test]
async fn register_confirm_and_use_the_site() {
    let app = TestApp::new();

    let res = register(&app, "alice@example.com", "alice", "cat").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), "/login");

    let sent = app.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "alice@example.com");
    assert_eq!(sent[0].subject, "[Rookery] Confirm Your Account");
    assert!(sent[0].link.starts_with("http://localhost:3000/confirm/"));

    let res = login(&app, "alice@example.com", "cat").await;
    assert_eq!(res.status, StatusCode::OK);
    let session = res.body["token"].as_str().unwrap().to_string();
    let cookie = res.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));

    // Unconfirmed accounts are held at the notice page.
    let res = app.get("/posts", Some(&session)).await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), "/unconfirmed");

    let res = app.get("/unconfirmed", Some(&session)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["email"], "alice@example.com");

    let token = app.last_token(Template::Confirm);
    let res = app.get(&format!("/confirm/{token}"), Some(&session)).await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.message(), "You have confirmed your account. Thanks!");

    let res = app.get("/posts", Some(&session)).await;
    assert_eq!(res.status, StatusCode::OK);

    let res = app.get("/unconfirmed", Some(&session)).await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), "/");
}

#[tokio::test]
async fn register_rejects_duplicates_and_bad_input() {
    let app = TestApp::new();
    app.seed_user("alice", true);

    let res = register(&app, "ALICE@example.com", "someone", "pw").await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["errors"][0]["field"], "email");

    let res = register(&app, "new@example.com", "alice", "pw").await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["errors"][0]["field"], "username");

    let res = register(&app, "new@example.com", "9lives", "pw").await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .post(
            "/register",
            None,
            json!({
                "email": "new@example.com",
                "username": "newbie",
                "password": "one",
                "password2": "two",
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.sent().is_empty());
}

#[tokio::test]
async fn admin_address_registers_as_administrator() {
    let app = TestApp::new();
    register(&app, ADMIN_EMAIL, "boss", "pw").await;

    let user = app.state.db.get_user_by_username("boss").unwrap().unwrap();
    assert_eq!(user.role.unwrap().name, "Administrator");
}

#[tokio::test]
async fn login_checks_password_and_next() {
    let app = TestApp::new();
    seed_with_password(&app, "alice", "cat");

    let res = login(&app, "alice@example.com", "dog").await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = login(&app, "nobody@example.com", "cat").await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app
        .post(
            "/login?next=/posts",
            None,
            json!({ "email": "alice@example.com", "password": "cat", "remember_me": true }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["location"], "/posts");
    let cookie = res.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("Max-Age"));

    let res = app
        .post(
            "/login?next=//evil.example",
            None,
            json!({ "email": "alice@example.com", "password": "cat" }),
        )
        .await;
    assert_eq!(res.body["location"], "/");
}

#[tokio::test]
async fn session_cookie_authenticates_and_logout_clears_it() {
    let app = TestApp::new();
    let (_, session) = app.seed_user("alice", true);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/logout")
        .header(header::COOKIE, format!("session={session}"))
        .body(Body::empty())
        .unwrap();
    let res = app.send(request).await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.message(), "You have been logged out.");
    let cookie = res.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("Max-Age=0"));

    let res = app.get("/logout", None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn confirmation_token_must_match_user_and_purpose() {
    let app = TestApp::new();
    let (alice, session) = app.seed_user("alice", false);
    let (bob, _) = app.seed_user("bob", false);

    let tokens = &app.state.tokens;
    let ttl = TokenPurpose::Confirm.default_ttl();
    let wrong_purpose = tokens.issue(TokenPurpose::ResetPassword, alice, ttl).unwrap();
    let wrong_user = tokens.issue(TokenPurpose::Confirm, bob, ttl).unwrap();

    for token in [wrong_purpose, wrong_user, "garbage".to_string()] {
        let res = app.get(&format!("/confirm/{token}"), Some(&session)).await;
        assert_eq!(res.message(), "The confirmation link is invalid or has expired.");
    }
    assert!(!app.state.db.get_user_by_id(alice).unwrap().unwrap().confirmed);

    // Resend and use the fresh token.
    let res = app.get("/confirm", Some(&session)).await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    let token = app.last_token(Template::Confirm);
    app.get(&format!("/confirm/{token}"), Some(&session)).await;
    assert!(app.state.db.get_user_by_id(alice).unwrap().unwrap().confirmed);

    // Already confirmed short-circuits without looking at the token.
    let res = app.get("/confirm/anything", Some(&session)).await;
    assert_eq!(res.message(), "Your account is already confirmed.");
}

#[tokio::test]
async fn anonymous_confirm_is_unauthorized() {
    let app = TestApp::new();
    let res = app.get("/confirm/whatever", None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app.get("/unconfirmed", None).await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), "/");
}

#[tokio::test]
async fn change_password_requires_current_password() {
    let app = TestApp::new();
    let id = seed_with_password(&app, "alice", "old");
    let session = app.session_for(id);

    let res = app
        .post(
            "/changepassword",
            Some(&session),
            json!({ "old_password": "wrong", "new_password": "new", "new_password2": "new" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), "/changepassword");
    assert_eq!(login(&app, "alice@example.com", "old").await.status, StatusCode::OK);

    let res = app
        .post(
            "/changepassword",
            Some(&session),
            json!({ "old_password": "old", "new_password": "new", "new_password2": "new" }),
        )
        .await;
    assert_eq!(res.location(), "/");
    assert_eq!(login(&app, "alice@example.com", "new").await.status, StatusCode::OK);
}

#[tokio::test]
async fn password_reset_flow() {
    let app = TestApp::new();
    seed_with_password(&app, "alice", "old");
    app.seed_user("bob", true);

    let res = app
        .post("/resetpassword", None, json!({ "email": "nobody@example.com" }))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .post("/resetpassword", None, json!({ "email": "alice@example.com" }))
        .await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    let token = app.last_token(Template::ResetPassword);

    // Someone else's address with alice's token changes nothing.
    let res = app
        .post(
            &format!("/resetpassword/{token}"),
            None,
            json!({ "email": "bob@example.com", "new_password": "new", "new_password2": "new" }),
        )
        .await;
    assert_eq!(res.location(), "/resetpassword");

    let res = app
        .post(
            &format!("/resetpassword/{token}"),
            None,
            json!({ "email": "alice@example.com", "new_password": "new", "new_password2": "new" }),
        )
        .await;
    assert_eq!(res.location(), "/login");
    assert_eq!(login(&app, "alice@example.com", "new").await.status, StatusCode::OK);
    assert_eq!(login(&app, "alice@example.com", "old").await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_reset_link_leaves_password_alone() {
    let app = TestApp::new();
    let alice = seed_with_password(&app, "alice", "old");
    let before = app.state.db.get_user_by_id(alice).unwrap().unwrap().password_hash;

    let token = app
        .state
        .tokens
        .issue(TokenPurpose::ResetPassword, alice, chrono::Duration::hours(-1))
        .unwrap();
    let res = app
        .post(
            &format!("/resetpassword/{token}"),
            None,
            json!({ "email": "alice@example.com", "new_password": "new", "new_password2": "new" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), "/resetpassword");
    assert_eq!(res.message(), "The reset link is invalid or has expired.");

    let after = app.state.db.get_user_by_id(alice).unwrap().unwrap().password_hash;
    assert_eq!(before, after);
    assert_eq!(login(&app, "alice@example.com", "old").await.status, StatusCode::OK);
}

#[tokio::test]
async fn email_change_flow() {
    let app = TestApp::new();
    let (alice, session) = app.seed_user("alice", true);
    app.seed_user("bob", true);

    let res = app.get("/resetemail", Some(&session)).await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    let mail = app.sent().pop().unwrap();
    assert_eq!(mail.template, Template::ChangeEmail);
    assert_eq!(mail.to, "alice@example.com");

    let res = app
        .post(
            "/resetemail/not-a-token",
            Some(&session),
            json!({ "new_email": "alice@new.example" }),
        )
        .await;
    assert_eq!(res.location(), "/resetemail");

    let res = app
        .post(
            &format!("/resetemail/{}", mail.token),
            Some(&session),
            json!({ "new_email": "bob@example.com" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .post(
            &format!("/resetemail/{}", mail.token),
            Some(&session),
            json!({ "new_email": "alice@new.example" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    let row = app.state.db.get_user_by_id(alice).unwrap().unwrap();
    assert_eq!(row.email, "alice@new.example");
}
