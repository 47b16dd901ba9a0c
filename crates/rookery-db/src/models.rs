//! Database row types. These map directly to SQLite rows and are converted
//! into rookery-types models at the crate boundary.

use chrono::{DateTime, Utc};
use rookery_types::models::{FollowEntry, Post, Role, User};
use rookery_types::permission::Permission;

pub struct RoleRow {
    pub id: i64,
    pub name: String,
    pub permissions: i64,
    pub is_default: bool,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: row.id,
            name: row.name,
            permissions: Permission::from_bits((row.permissions & 0xff) as u8),
            default: row.is_default,
        }
    }
}

/// A user joined with its role. Role columns are NULL when the user has none.
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub confirmed: bool,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub role: Option<RoleRow>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            role: row.role.map(Role::from),
            confirmed: row.confirmed,
            name: row.name,
            location: row.location,
            about_me: row.about_me,
            member_since: row.member_since,
            last_seen: row.last_seen,
        }
    }
}

pub struct PostRow {
    pub id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub body: String,
    pub body_html: String,
    pub timestamp: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            author_id: row.author_id,
            author_username: row.author_username,
            body: row.body,
            body_html: row.body_html,
            timestamp: row.timestamp,
        }
    }
}

/// The user on the far side of a follow edge.
pub struct FollowRow {
    pub user_id: i64,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

impl From<FollowRow> for FollowEntry {
    fn from(row: FollowRow) -> Self {
        FollowEntry {
            user_id: row.user_id,
            username: row.username,
            timestamp: row.timestamp,
        }
    }
}
