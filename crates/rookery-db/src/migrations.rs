use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE roles (
                id          INTEGER PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                permissions INTEGER NOT NULL DEFAULT 0,
                is_default  INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_roles_default ON roles(is_default);

            CREATE TABLE users (
                id              INTEGER PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash   TEXT NOT NULL,
                role_id         INTEGER REFERENCES roles(id),
                confirmed       INTEGER NOT NULL DEFAULT 0,
                name            TEXT,
                location        TEXT,
                about_me        TEXT,
                member_since    TEXT NOT NULL,
                last_seen       TEXT NOT NULL
            );

            CREATE TABLE follows (
                follower_id INTEGER NOT NULL REFERENCES users(id),
                followed_id INTEGER NOT NULL REFERENCES users(id),
                timestamp   TEXT NOT NULL,
                PRIMARY KEY (follower_id, followed_id)
            );

            CREATE INDEX idx_follows_followed ON follows(followed_id, follower_id);

            CREATE TABLE posts (
                id          INTEGER PRIMARY KEY,
                author_id   INTEGER NOT NULL REFERENCES users(id),
                body        TEXT NOT NULL,
                body_html   TEXT NOT NULL,
                timestamp   TEXT NOT NULL
            );

            CREATE INDEX idx_posts_timestamp ON posts(timestamp);
            CREATE INDEX idx_posts_author ON posts(author_id, timestamp);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
