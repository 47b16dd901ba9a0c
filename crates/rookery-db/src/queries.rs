use crate::Database;
use crate::models::{RoleRow, UserRow};
use anyhow::Result;
use chrono::Utc;
use rookery_types::permission::{Permission, ROLES};
use rusqlite::{Connection, Row};

/// Columns selected for a user joined with its role; see [`user_from_row`].
const USER_SELECT: &str = "SELECT u.id, u.username, u.email, u.password_hash, u.confirmed,
            u.name, u.location, u.about_me, u.member_since, u.last_seen,
            r.id, r.name, r.permissions, r.is_default
     FROM users u
     LEFT JOIN roles r ON r.id = u.role_id";

impl Database {
    // -- Roles --

    /// Upsert the fixed role table by name. Safe to run on every startup.
    pub fn insert_roles(&self) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for seed in ROLES {
                tx.execute(
                    "INSERT INTO roles (name, permissions, is_default) VALUES (?1, ?2, ?3)
                     ON CONFLICT(name) DO UPDATE SET
                        permissions = excluded.permissions,
                        is_default = excluded.is_default",
                    rusqlite::params![seed.name, seed.permissions.bits(), seed.default],
                )?;
            }
            tx.commit()?;
            tracing::info!("Seeded {} roles", ROLES.len());
            Ok(())
        })
    }

    pub fn get_role_by_name(&self, name: &str) -> Result<Option<RoleRow>> {
        self.with_conn(|conn| {
            query_role(conn, "SELECT id, name, permissions, is_default FROM roles WHERE name = ?1", name)
        })
    }

    pub fn default_role(&self) -> Result<Option<RoleRow>> {
        self.with_conn(|conn| {
            query_role(
                conn,
                "SELECT id, name, permissions, is_default FROM roles WHERE is_default = ?1
                 ORDER BY id LIMIT 1",
                true,
            )
        })
    }

    /// Role a newly registered account gets: the all-permissions role when
    /// `email` is the configured admin address, the default role otherwise.
    pub fn role_for_new_user(&self, email: &str, admin_email: Option<&str>) -> Result<Option<RoleRow>> {
        let is_admin = admin_email.is_some_and(|admin| admin.eq_ignore_ascii_case(email));
        if is_admin {
            let admin_role = self.with_conn(|conn| {
                query_role(
                    conn,
                    "SELECT id, name, permissions, is_default FROM roles WHERE permissions = ?1
                     ORDER BY id LIMIT 1",
                    Permission::ALL.bits(),
                )
            })?;
            if admin_role.is_some() {
                return Ok(admin_role);
            }
        }
        self.default_role()
    }

    // -- Users --

    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        role_id: Option<i64>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO users (username, email, password_hash, role_id, member_since, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![username, email, password_hash, role_id, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.id = ?1", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.email = ?1", email))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.username = ?1", username))
    }

    pub fn confirm_user(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("UPDATE users SET confirmed = 1 WHERE id = ?1", [id])?;
            expect_user_changed(changed, id)
        })
    }

    pub fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password_hash = ?2 WHERE id = ?1",
                rusqlite::params![id, password_hash],
            )?;
            expect_user_changed(changed, id)
        })
    }

    /// Fails with a UNIQUE violation if another account already uses `email`.
    pub fn set_email(&self, id: i64, email: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET email = ?2 WHERE id = ?1",
                rusqlite::params![id, email],
            )?;
            expect_user_changed(changed, id)
        })
    }

    /// Record activity: bump `last_seen` to now.
    pub fn ping(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET last_seen = ?2 WHERE id = ?1",
                rusqlite::params![id, Utc::now()],
            )?;
            expect_user_changed(changed, id)
        })
    }

    pub fn update_profile(
        &self,
        id: i64,
        name: Option<&str>,
        location: Option<&str>,
        about_me: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET name = ?2, location = ?3, about_me = ?4 WHERE id = ?1",
                rusqlite::params![id, name, location, about_me],
            )?;
            expect_user_changed(changed, id)
        })
    }
}

fn expect_user_changed(changed: usize, id: i64) -> Result<()> {
    if changed == 0 {
        anyhow::bail!("User not found: {}", id);
    }
    Ok(())
}

fn query_role<P: rusqlite::ToSql>(conn: &Connection, sql: &str, param: P) -> Result<Option<RoleRow>> {
    let mut stmt = conn.prepare(sql)?;

    let row = stmt
        .query_row([param], |row| {
            Ok(RoleRow {
                id: row.get(0)?,
                name: row.get(1)?,
                permissions: row.get(2)?,
                is_default: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_user<P: rusqlite::ToSql>(conn: &Connection, predicate: &str, param: P) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("{USER_SELECT} WHERE {predicate}"))?;
    let row = stmt.query_row([param], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let role_id: Option<i64> = row.get(10)?;
    let role = match role_id {
        Some(id) => Some(RoleRow {
            id,
            name: row.get(11)?,
            permissions: row.get(12)?,
            is_default: row.get(13)?,
        }),
        None => None,
    };

    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        confirmed: row.get(4)?,
        name: row.get(5)?,
        location: row.get(6)?,
        about_me: row.get(7)?,
        member_since: row.get(8)?,
        last_seen: row.get(9)?,
        role,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
