use crate::{
    error::{AppError, AppResult},
    models::{NewPost, Post, PostChanges, PostWithAuthor, User},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use uuid::Uuid;

/// Repository Trait
///
/// Persistence contract for accounts and posts. Handlers and the auth flow only
/// see `Arc<dyn Repository>`, so the backing store can be Postgres or memory.
///
/// Username uniqueness is the store's job: two concurrent `create_user` calls
/// for the same name must leave exactly one row and fail the other with
/// [`AppError::DuplicateUsername`].
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Credential Store ---
    async fn create_user(&self, username: &str, password_hash: &str) -> AppResult<User>;
    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>>;

    // --- Post Store ---
    async fn create_post(&self, author_id: Uuid, post: NewPost) -> AppResult<Post>;
    async fn get_post(&self, id: Uuid) -> AppResult<Option<PostWithAuthor>>;
    // Newest first.
    async fn list_posts(&self, limit: i64) -> AppResult<Vec<PostWithAuthor>>;
    // Applies only the provided fields. Returns None for an unknown id.
    async fn update_post(&self, id: Uuid, changes: PostChanges) -> AppResult<Option<Post>>;
}

/// RepositoryState
///
/// Shared handle to the persistence layer held in the application state.
pub type RepositoryState = Arc<dyn Repository>;

const POST_WITH_AUTHOR_COLUMNS: &str = r#"
    p.id, p.author_id, p.title, p.summary, p.content, p.cover,
    p.created_at, p.updated_at, u.username AS author_username
"#;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. The `users.username` UNIQUE constraint
/// enforces identity uniqueness atomically.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_user(&self, username: &str, password_hash: &str) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, password_hash
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::DuplicateUsername
            }
            other => {
                tracing::error!("create_user error: {:?}", other);
                AppError::Database(other)
            }
        })
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("find_user_by_username error: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn create_post(&self, author_id: Uuid, post: NewPost) -> AppResult<Post> {
        sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (id, author_id, title, summary, content, cover, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING id, author_id, title, summary, content, cover, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(author_id)
        .bind(post.title)
        .bind(post.summary)
        .bind(post.content)
        .bind(post.cover)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("create_post error: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn get_post(&self, id: Uuid) -> AppResult<Option<PostWithAuthor>> {
        let query = format!(
            "SELECT {} FROM posts p JOIN users u ON u.id = p.author_id WHERE p.id = $1",
            POST_WITH_AUTHOR_COLUMNS
        );
        sqlx::query_as::<_, PostWithAuthor>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("get_post error: {:?}", e);
                AppError::Database(e)
            })
    }

    async fn list_posts(&self, limit: i64) -> AppResult<Vec<PostWithAuthor>> {
        let query = format!(
            "SELECT {} FROM posts p JOIN users u ON u.id = p.author_id \
             ORDER BY p.created_at DESC LIMIT $1",
            POST_WITH_AUTHOR_COLUMNS
        );
        sqlx::query_as::<_, PostWithAuthor>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("list_posts error: {:?}", e);
                AppError::Database(e)
            })
    }

    /// Uses `COALESCE` so a NULL parameter keeps the current column value.
    async fn update_post(&self, id: Uuid, changes: PostChanges) -> AppResult<Option<Post>> {
        sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                summary = COALESCE($3, summary),
                content = COALESCE($4, content),
                cover = COALESCE($5, cover),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, author_id, title, summary, content, cover, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.summary)
        .bind(changes.content)
        .bind(changes.cover)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("update_post error: {:?}", e);
            AppError::Database(e)
        })
    }
}

#[derive(Default)]
struct MemoryTables {
    users: HashMap<Uuid, User>,
    // username -> id, the uniqueness index.
    usernames: HashMap<String, Uuid>,
    // Insertion order doubles as creation order.
    posts: Vec<Post>,
}

/// InMemoryRepository
///
/// `Repository` held in process memory, used by the test suite. Every operation
/// runs under one lock, which makes the username check-and-insert atomic.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<MemoryTables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub fn user_count(&self) -> usize {
        self.tables.lock().map(|t| t.users.len()).unwrap_or(0)
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, MemoryTables>> {
        self.tables
            .lock()
            .map_err(|e| AppError::Dependency(format!("memory store poisoned: {}", e)))
    }
}

fn with_author(tables: &MemoryTables, post: &Post) -> AppResult<PostWithAuthor> {
    let author = tables
        .users
        .get(&post.author_id)
        .ok_or_else(|| AppError::Dependency(format!("post {} has no author row", post.id)))?;
    Ok(PostWithAuthor {
        post: post.clone(),
        author_username: author.username.clone(),
    })
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_user(&self, username: &str, password_hash: &str) -> AppResult<User> {
        let mut tables = self.lock()?;
        if tables.usernames.contains_key(username) {
            return Err(AppError::DuplicateUsername);
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        };
        tables.usernames.insert(user.username.clone(), user.id);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let tables = self.lock()?;
        Ok(tables
            .usernames
            .get(username)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn create_post(&self, author_id: Uuid, post: NewPost) -> AppResult<Post> {
        let mut tables = self.lock()?;
        if !tables.users.contains_key(&author_id) {
            return Err(AppError::Dependency(format!("unknown author {}", author_id)));
        }

        let now = Utc::now();
        let created = Post {
            id: Uuid::new_v4(),
            author_id,
            title: post.title,
            summary: post.summary,
            content: post.content,
            cover: post.cover,
            created_at: now,
            updated_at: now,
        };
        tables.posts.push(created.clone());
        Ok(created)
    }

    async fn get_post(&self, id: Uuid) -> AppResult<Option<PostWithAuthor>> {
        let tables = self.lock()?;
        tables
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| with_author(&tables, post))
            .transpose()
    }

    async fn list_posts(&self, limit: i64) -> AppResult<Vec<PostWithAuthor>> {
        let tables = self.lock()?;
        let limit = usize::try_from(limit).unwrap_or(0);
        tables
            .posts
            .iter()
            .rev()
            .take(limit)
            .map(|post| with_author(&tables, post))
            .collect()
    }

    async fn update_post(&self, id: Uuid, changes: PostChanges) -> AppResult<Option<Post>> {
        let mut tables = self.lock()?;
        let Some(post) = tables.posts.iter_mut().find(|post| post.id == id) else {
            return Ok(None);
        };

        changes.apply_to(post);
        post.updated_at = Utc::now();
        Ok(Some(post.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::{hash_password, verify_password};

    fn new_post(title: &str) -> NewPost {
        NewPost {
            title: title.to_string(),
            summary: "summary".to_string(),
            content: "content".to_string(),
            cover: None,
        }
    }

    #[tokio::test]
    async fn registered_user_is_found_and_hash_verifies() {
        let repo = InMemoryRepository::new();
        let hash = hash_password("s3cret").unwrap();
        let created = repo.create_user("alice", &hash).await.unwrap();

        let found = repo.find_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(verify_password("s3cret", &found.password_hash));
        assert!(!verify_password("S3cret", &found.password_hash));
    }

    #[tokio::test]
    async fn duplicate_username_keeps_a_single_identity() {
        let repo = InMemoryRepository::new();
        let first = repo.create_user("alice", "h1").await.unwrap();

        let second = repo.create_user("alice", "h2").await;
        assert!(matches!(second, Err(AppError::DuplicateUsername)));
        assert_eq!(repo.user_count(), 1);

        let stored = repo.find_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.password_hash, "h1");
    }

    #[tokio::test]
    async fn usernames_are_case_sensitive() {
        let repo = InMemoryRepository::new();
        repo.create_user("alice", "h").await.unwrap();
        repo.create_user("Alice", "h").await.unwrap();

        assert_eq!(repo.user_count(), 2);
        assert!(repo.find_user_by_username("ALICE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_registrations_of_one_name_admit_exactly_one() {
        let repo = Arc::new(InMemoryRepository::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.create_user("race", &format!("hash-{}", i)).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(repo.user_count(), 1);
    }

    #[tokio::test]
    async fn posts_list_newest_first_with_author() {
        let repo = InMemoryRepository::new();
        let author = repo.create_user("writer", "h").await.unwrap();
        for title in ["first", "second", "third"] {
            repo.create_post(author.id, new_post(title)).await.unwrap();
        }

        let listed = repo.list_posts(2).await.unwrap();
        let titles: Vec<_> = listed.iter().map(|p| p.post.title.as_str()).collect();
        assert_eq!(titles, vec!["third", "second"]);
        assert!(listed.iter().all(|p| p.author_username == "writer"));
    }

    #[tokio::test]
    async fn partial_update_keeps_unset_fields_and_author() {
        let repo = InMemoryRepository::new();
        let author = repo.create_user("writer", "h").await.unwrap();
        let post = repo.create_post(author.id, new_post("draft")).await.unwrap();

        let changes = PostChanges {
            title: Some("final".to_string()),
            cover: Some("uploads/new.png".to_string()),
            ..PostChanges::default()
        };
        let updated = repo.update_post(post.id, changes).await.unwrap().unwrap();

        assert_eq!(updated.title, "final");
        assert_eq!(updated.summary, "summary");
        assert_eq!(updated.cover.as_deref(), Some("uploads/new.png"));
        assert_eq!(updated.author_id, author.id);
        assert!(repo
            .update_post(Uuid::new_v4(), PostChanges::default())
            .await
            .unwrap()
            .is_none());
    }
}
