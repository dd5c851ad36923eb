use crate::Database;
use crate::models::{LikeRow, NewUser, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row};
use vidtube_types::models::LikeTarget;

const USER_COLUMNS: &str = "id, username, email, fullname, avatar, cover_image, password, \
                            refresh_token, created_at, updated_at";

impl Database {
    // -- Users --

    /// Insert a user. Fails with a UNIQUE violation (see `is_unique_violation`)
    /// when the username or email is taken.
    pub fn create_user(&self, user: &NewUser) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, fullname, avatar, cover_image, password)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    user.id.to_string(),
                    user.username,
                    user.email,
                    user.fullname,
                    user.avatar,
                    user.cover_image,
                    user.password_hash,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", rusqlite::params![id]))
    }

    /// Match on email, or on username when one is given.
    pub fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "email = ?1 OR (?2 IS NOT NULL AND username = ?2)",
                rusqlite::params![email, username],
            )
        })
    }

    /// Overwrite the stored refresh token (None clears it). Returns false if
    /// no such user exists.
    pub fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET refresh_token = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                rusqlite::params![id, token],
            )?;
            Ok(changed > 0)
        })
    }

    /// Returns false if no such user exists.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    // -- Likes --

    /// Toggle a like: removes if exists, inserts if not.
    /// Returns (added, id). added=true means inserted, added=false means removed.
    pub fn toggle_like(&self, id: &str, target: LikeTarget, user_id: &str) -> Result<(bool, String)> {
        let column = target.column();
        let target_id = target.id().to_string();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    &format!("SELECT id FROM likes WHERE {column} = ?1 AND liked_by = ?2"),
                    rusqlite::params![target_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = if let Some(existing_id) = existing {
                tx.execute("DELETE FROM likes WHERE id = ?1", [&existing_id])?;
                (false, existing_id)
            } else {
                tx.execute(
                    &format!("INSERT INTO likes (id, {column}, liked_by) VALUES (?1, ?2, ?3)"),
                    rusqlite::params![id, target_id, user_id],
                )?;
                (true, id.to_string())
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    pub fn count_likes(&self, target: LikeTarget) -> Result<u64> {
        let column = target.column();
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM likes WHERE {column} = ?1"),
                [target.id().to_string()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    pub fn get_likes_by_user(&self, user_id: &str) -> Result<Vec<LikeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, video_id, comment_id, tweet_id, liked_by, created_at
                 FROM likes WHERE liked_by = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(LikeRow {
                        id: row.get(0)?,
                        video_id: row.get(1)?,
                        comment_id: row.get(2)?,
                        tweet_id: row.get(3)?,
                        liked_by: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {filter} LIMIT 1"))?;
    let row = stmt.query_row(params, user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        fullname: row.get(3)?,
        avatar: row.get(4)?,
        cover_image: row.get(5)?,
        password: row.get(6)?,
        refresh_token: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
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
