use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, likes)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE,
                fullname        TEXT NOT NULL,
                avatar          TEXT NOT NULL,
                cover_image     TEXT NOT NULL DEFAULT '',
                password        TEXT NOT NULL,
                refresh_token   TEXT,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE likes (
                id          TEXT PRIMARY KEY,
                video_id    TEXT,
                comment_id  TEXT,
                tweet_id    TEXT,
                liked_by    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                CHECK (
                    (video_id IS NOT NULL) + (comment_id IS NOT NULL) + (tweet_id IS NOT NULL) = 1
                )
            );

            CREATE INDEX idx_likes_video ON likes(video_id) WHERE video_id IS NOT NULL;
            CREATE INDEX idx_likes_comment ON likes(comment_id) WHERE comment_id IS NOT NULL;
            CREATE INDEX idx_likes_tweet ON likes(tweet_id) WHERE tweet_id IS NOT NULL;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
