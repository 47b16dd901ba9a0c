use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::permission::Permission;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub permissions: Permission,
    pub default: bool,
}

/// An account as seen by the rest of the application.
/// The password hash never leaves the database layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Option<Role>,
    pub confirmed: bool,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl User {
    /// True iff the user has a role granting every bit in `permissions`.
    pub fn can(&self, permissions: Permission) -> bool {
        self.role
            .as_ref()
            .is_some_and(|role| role.permissions.contains(permissions))
    }

    pub fn is_administrator(&self) -> bool {
        self.can(Permission::ADMINISTER)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub body: String,
    pub body_html: String,
    pub timestamp: DateTime<Utc>,
}

/// One side of a follow edge: the other user and when the edge was made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEntry {
    pub user_id: i64,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}
