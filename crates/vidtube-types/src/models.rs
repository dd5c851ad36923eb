use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user as clients see it. Password hash and refresh token never leave
/// the DB layer, so there is no field to forget to strip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar: String,
    /// Empty when no cover image was uploaded.
    pub cover_image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The thing a like points at. Exactly one per like.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum LikeTarget {
    Video(Uuid),
    Comment(Uuid),
    Tweet(Uuid),
}

impl LikeTarget {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Video(id) | Self::Comment(id) | Self::Tweet(id) => *id,
        }
    }

    /// Column holding this target's id in the `likes` table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Video(_) => "video_id",
            Self::Comment(_) => "comment_id",
            Self::Tweet(_) => "tweet_id",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: Uuid,
    pub target: LikeTarget,
    pub liked_by: Uuid,
    pub created_at: DateTime<Utc>,
}
