use crate::Database;
use crate::models::PostRow;
use crate::queries::OptionalExt;
use anyhow::Result;
use chrono::Utc;
use rookery_types::post::PostBody;
use rusqlite::Connection;

const POST_SELECT: &str = "SELECT p.id, p.author_id, u.username, p.body, p.body_html, p.timestamp
     FROM posts p
     JOIN users u ON u.id = p.author_id";

impl Database {
    // -- Posts --
    //
    // Writers take a `PostBody`, which already carries the sanitized render,
    // so `body` and `body_html` always change together.

    pub fn insert_post(&self, author_id: i64, body: &PostBody) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO posts (author_id, body, body_html, timestamp) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![author_id, body.raw(), body.html(), Utc::now()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Replace a post's body. Returns false if the post does not exist.
    pub fn set_post_body(&self, post_id: i64, body: &PostBody) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE posts SET body = ?2, body_html = ?3 WHERE id = ?1",
                rusqlite::params![post_id, body.raw(), body.html()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_post(&self, post_id: i64) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{POST_SELECT} WHERE p.id = ?1"))?;
            let row = stmt.query_row([post_id], post_from_row).optional()?;
            Ok(row)
        })
    }

    /// Newest first, across all authors.
    pub fn list_posts(&self, limit: u32, offset: u32) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            query_posts(
                conn,
                &format!("{POST_SELECT} ORDER BY p.timestamp DESC, p.id DESC LIMIT ?1 OFFSET ?2"),
                rusqlite::params![limit, offset],
            )
        })
    }

    pub fn posts_by_author(&self, author_id: i64, limit: u32, offset: u32) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            query_posts(
                conn,
                &format!(
                    "{POST_SELECT} WHERE p.author_id = ?1
                     ORDER BY p.timestamp DESC, p.id DESC LIMIT ?2 OFFSET ?3"
                ),
                rusqlite::params![author_id, limit, offset],
            )
        })
    }

    pub fn count_posts(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))?))
    }

    pub fn count_posts_by_author(&self, author_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM posts WHERE author_id = ?1",
                [author_id],
                |r| r.get(0),
            )?)
        })
    }
}

fn query_posts(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<PostRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, post_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_username: row.get(2)?,
        body: row.get(3)?,
        body_html: row.get(4)?,
        timestamp: row.get(5)?,
    })
}
