//! The follow graph: one `follows` edge table read two ways, by follower
//! (who a user follows) and by followed (who follows a user).

use crate::Database;
use crate::models::FollowRow;
use crate::queries::OptionalExt;
use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;

/// Which side of the edge table a listing filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Edges whose follower is the user: the accounts they follow.
    Outgoing,
    /// Edges whose followed is the user: the accounts following them.
    Incoming,
}

impl Database {
    /// Add the edge `follower -> followed`. Returns false if it already existed.
    pub fn follow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            // The composite primary key makes this a single atomic check-and-insert.
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO follows (follower_id, followed_id, timestamp)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![follower_id, followed_id, Utc::now()],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Remove the edge `follower -> followed`. Returns false if there was none.
    pub fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
                [follower_id, followed_id],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Does `user` follow `other`?
    pub fn is_following(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| edge_exists(conn, user_id, other_id))
    }

    /// Is `user` followed by `other`?
    pub fn is_followed_by(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| edge_exists(conn, other_id, user_id))
    }

    pub fn followers(&self, user_id: i64, limit: u32, offset: u32) -> Result<Vec<FollowRow>> {
        self.with_conn(|conn| query_edges(conn, Direction::Incoming, user_id, limit, offset))
    }

    pub fn followed(&self, user_id: i64, limit: u32, offset: u32) -> Result<Vec<FollowRow>> {
        self.with_conn(|conn| query_edges(conn, Direction::Outgoing, user_id, limit, offset))
    }

    pub fn follower_count(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| count_edges(conn, Direction::Incoming, user_id))
    }

    pub fn followed_count(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| count_edges(conn, Direction::Outgoing, user_id))
    }
}

fn edge_exists(conn: &Connection, follower_id: i64, followed_id: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
            [follower_id, followed_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn query_edges(
    conn: &Connection,
    direction: Direction,
    user_id: i64,
    limit: u32,
    offset: u32,
) -> Result<Vec<FollowRow>> {
    // (column matched against user_id, column naming the other side)
    let (mine, theirs) = match direction {
        Direction::Outgoing => ("follower_id", "followed_id"),
        Direction::Incoming => ("followed_id", "follower_id"),
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT u.id, u.username, f.timestamp
         FROM follows f
         JOIN users u ON u.id = f.{theirs}
         WHERE f.{mine} = ?1
         ORDER BY f.timestamp DESC, u.id DESC
         LIMIT ?2 OFFSET ?3"
    ))?;

    let rows = stmt
        .query_map(rusqlite::params![user_id, limit, offset], |row| {
            Ok(FollowRow {
                user_id: row.get(0)?,
                username: row.get(1)?,
                timestamp: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn count_edges(conn: &Connection, direction: Direction, user_id: i64) -> Result<i64> {
    let sql = match direction {
        Direction::Outgoing => "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
        Direction::Incoming => "SELECT COUNT(*) FROM follows WHERE followed_id = ?1",
    };
    Ok(conn.query_row(sql, [user_id], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use crate::queries::tests::{add_user, seeded};

    fn edge_count(db: &crate::Database) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM follows", [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn follow_is_idempotent() {
        let db = seeded();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        assert!(db.follow(alice, bob).unwrap());
        assert!(!db.follow(alice, bob).unwrap());
        assert_eq!(edge_count(&db), 1);
    }

    #[test]
    fn follow_then_unfollow_restores_graph() {
        let db = seeded();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");
        db.follow(carol, alice).unwrap();
        let before = edge_count(&db);

        db.follow(alice, bob).unwrap();
        assert!(db.unfollow(alice, bob).unwrap());

        assert_eq!(edge_count(&db), before);
        assert!(!db.is_following(alice, bob).unwrap());
        assert!(db.is_following(carol, alice).unwrap());
    }

    #[test]
    fn unfollow_without_edge_is_noop() {
        let db = seeded();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        assert!(!db.unfollow(alice, bob).unwrap());
    }

    #[test]
    fn edges_are_directed() {
        let db = seeded();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        db.follow(alice, bob).unwrap();

        assert!(db.is_following(alice, bob).unwrap());
        assert!(!db.is_following(bob, alice).unwrap());
        assert!(db.is_followed_by(bob, alice).unwrap());
        assert!(!db.is_followed_by(alice, bob).unwrap());
    }

    #[test]
    fn both_views_over_one_table() {
        let db = seeded();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");
        db.follow(alice, bob).unwrap();
        db.follow(carol, bob).unwrap();
        db.follow(bob, alice).unwrap();

        let followers: Vec<String> = db
            .followers(bob, 10, 0)
            .unwrap()
            .into_iter()
            .map(|r| r.username)
            .collect();
        assert_eq!(followers.len(), 2);
        assert!(followers.contains(&"alice".to_string()));
        assert!(followers.contains(&"carol".to_string()));

        let followed: Vec<String> = db
            .followed(bob, 10, 0)
            .unwrap()
            .into_iter()
            .map(|r| r.username)
            .collect();
        assert_eq!(followed, vec!["alice".to_string()]);

        assert_eq!(db.follower_count(bob).unwrap(), 2);
        assert_eq!(db.followed_count(bob).unwrap(), 1);
        assert_eq!(db.followers(bob, 1, 1).unwrap().len(), 1);
    }
}
