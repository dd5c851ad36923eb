//! Database row types. These map directly to SQLite rows.
//! Distinct from vidtube-types API models to keep the DB layer independent.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use vidtube_types::models::{Like, LikeTarget, User};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar: String,
    pub cover_image: String,
    pub password: String,
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRow {
    /// Client-facing view with the password hash and refresh token dropped.
    pub fn sanitized(&self) -> Result<User> {
        Ok(User {
            id: self.id.parse().context("user id is not a UUID")?,
            username: self.username.clone(),
            email: self.email.clone(),
            fullname: self.fullname.clone(),
            avatar: self.avatar.clone(),
            cover_image: self.cover_image.clone(),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Fields needed to insert a user. `password_hash` is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar: String,
    pub cover_image: String,
    pub password_hash: String,
}

pub struct LikeRow {
    pub id: String,
    pub video_id: Option<String>,
    pub comment_id: Option<String>,
    pub tweet_id: Option<String>,
    pub liked_by: String,
    pub created_at: String,
}

impl LikeRow {
    pub fn to_like(&self) -> Result<Like> {
        let target = match (&self.video_id, &self.comment_id, &self.tweet_id) {
            (Some(id), None, None) => LikeTarget::Video(id.parse()?),
            (None, Some(id), None) => LikeTarget::Comment(id.parse()?),
            (None, None, Some(id)) => LikeTarget::Tweet(id.parse()?),
            _ => anyhow::bail!("like {} does not have exactly one target", self.id),
        };
        Ok(Like {
            id: self.id.parse()?,
            target,
            liked_by: self.liked_by.parse()?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp: {raw}"))?
        .with_timezone(&Utc))
}
