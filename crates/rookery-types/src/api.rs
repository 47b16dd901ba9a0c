use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{FollowEntry, Post, User};

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.]*$").expect("valid username pattern"));

// -- Auth --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 64), email(message = "Invalid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub token: String,
    /// Where the client should go next.
    pub location: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 64), email(message = "Invalid email address."))]
    pub email: String,
    #[validate(
        length(min = 1, max = 64),
        regex(
            path = *USERNAME,
            message = "Usernames must have only letters, numbers, dots or underscores."
        )
    )]
    pub username: String,
    #[validate(
        length(min = 1, message = "Password is required."),
        must_match(other = "password2", message = "Passwords must match.")
    )]
    pub password: String,
    pub password2: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required."))]
    pub old_password: String,
    #[validate(
        length(min = 1, message = "Password is required."),
        must_match(other = "new_password2", message = "Passwords must match.")
    )]
    pub new_password: String,
    pub new_password2: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PasswordResetRequest {
    #[validate(length(min = 1, max = 64), email(message = "Invalid email address."))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PasswordResetForm {
    #[validate(length(min = 1, max = 64), email(message = "Invalid email address."))]
    pub email: String,
    #[validate(
        length(min = 1, message = "Password is required."),
        must_match(other = "new_password2", message = "Passwords must match.")
    )]
    pub new_password: String,
    pub new_password2: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ChangeEmailForm {
    #[validate(length(min = 1, max = 64), email(message = "Invalid email address."))]
    pub new_email: String,
}

#[derive(Debug, Serialize)]
pub struct UnconfirmedResponse {
    pub message: String,
    pub email: String,
}

// -- Profiles --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EditProfileRequest {
    #[validate(length(max = 64))]
    pub name: Option<String>,
    #[validate(length(max = 64))]
    pub location: Option<String>,
    pub about_me: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub username: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub role: Option<String>,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub gravatar: String,
    pub followers: i64,
    pub following: i64,
    pub post_count: i64,
    /// Whether the viewer follows this user. `None` for anonymous viewers.
    pub is_following: Option<bool>,
    /// Whether this user follows the viewer. `None` for anonymous viewers.
    pub is_followed_by: Option<bool>,
}

impl ProfileResponse {
    pub fn new(user: &User, gravatar: String) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            name: user.name.clone(),
            location: user.location.clone(),
            about_me: user.about_me.clone(),
            role: user.role.as_ref().map(|r| r.name.clone()),
            member_since: user.member_since,
            last_seen: user.last_seen,
            gravatar,
            followers: 0,
            following: 0,
            post_count: 0,
            is_following: None,
            is_followed_by: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FollowResponse {
    pub username: String,
    pub following: bool,
    /// False when the call left the graph unchanged.
    pub changed: bool,
}

// -- Posts --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PostRequest {
    #[validate(length(min = 1, message = "Post body is required."))]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "first_page")]
    pub page: u32,
}

fn first_page() -> u32 {
    1
}

impl PageQuery {
    /// 1-based page number, clamped so page 0 behaves as page 1.
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

pub type PostPage = Page<Post>;
pub type FollowPage = Page<FollowEntry>;

// -- Photos --

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
    pub url: String,
    pub size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PhotoWall {
    pub photos: Vec<String>,
}
