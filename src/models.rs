use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Core Records (Mapped to Database) ---

/// User
///
/// A registered account as stored in the `users` table. The password hash never
/// leaves the server: it is skipped on serialization and has no TS export.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    // Unique, case-sensitive, never renamed.
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

/// PublicUser
///
/// The hash-free projection of a `User` returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

/// Post
///
/// A blog post row. `author_id` is set once on creation and never reassigned;
/// it is the only input the ownership check needs.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub summary: String,
    pub content: String,
    // Storage key of the cover image, if one was uploaded.
    pub cover: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// PostWithAuthor
///
/// A post joined with its author's username, as read by the list and detail views.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct PostWithAuthor {
    #[sqlx(flatten)]
    pub post: Post,
    pub author_username: String,
}

// --- Request Payloads (Input Schemas) ---

/// Credentials
///
/// Body of both `POST /signup` and `POST /login`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Credentials {
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "s3cret")]
    pub password: String,
}

/// NewPost
///
/// Fields of a post being created, after the multipart body has been read and
/// the cover (if any) has been stored.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub summary: String,
    pub content: String,
    pub cover: Option<String>,
}

/// PostChanges
///
/// Partial update of a post. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostChanges {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub cover: Option<String>,
}

impl PostChanges {
    /// Writes every provided field onto `post`.
    pub fn apply_to(&self, post: &mut Post) {
        if let Some(title) = &self.title {
            post.title = title.clone();
        }
        if let Some(summary) = &self.summary {
            post.summary = summary.clone();
        }
        if let Some(content) = &self.content {
            post.content = content.clone();
        }
        if let Some(cover) = &self.cover {
            post.cover = Some(cover.clone());
        }
    }
}

/// PostForm
///
/// Documentation-only schema of the multipart body accepted by `POST /post` and `PUT /post/{id}`.
#[derive(ToSchema)]
pub struct PostForm {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    /// Cover image.
    #[schema(value_type = Option<String>, format = Binary)]
    pub file: Option<Vec<u8>>,
}

// --- Response Schemas (Output) ---

/// SignupResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignupResponse {
    pub user: PublicUser,
}

/// LoginResponse
///
/// Body of a successful login. The token is echoed for clients that send it as
/// a bearer header instead of relying on the cookie.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub message: String,
    pub id: Uuid,
    pub username: String,
    pub token: String,
}

/// MessageResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

/// PostView
///
/// A post as presented to readers: the author is embedded, and `editable` tells
/// the caller whether the server would accept an update from them.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostView {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub cover: Option<String>,
    pub cover_url: Option<String>,
    pub author: PublicUser,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    pub editable: bool,
}
