use crate::{
    AppState,
    auth::{AuthUser, can_mutate, ensure_can_mutate},
    error::{AppError, AppResult},
    models::{
        Credentials, LoginResponse, MessageResponse, NewPost, Post, PostChanges, PostView,
        PostWithAuthor, PublicUser, SignupResponse,
    },
    password::{hash_password_blocking, verify_password_blocking},
    storage::{StorageState, cover_key},
    token::Claims,
};
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

/// Number of posts returned by the listing endpoint.
pub const POST_LIST_LIMIT: i64 = 20;

// --- Multipart form handling ---

/// A file part read from a post form.
struct UploadedFile {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

/// PostForm
///
/// The text fields and optional cover file of a multipart post body.
/// Empty text fields are treated as absent.
#[derive(Default)]
struct PostForm {
    title: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    file: Option<UploadedFile>,
}

/// Maps a multipart read failure: an exceeded body limit is 413, anything else 400.
fn multipart_error(context: &str, e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::debug!("{}: {}", context, e);
        AppError::PayloadTooLarge
    } else {
        AppError::Validation(format!("{}: {}", context, e))
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

async fn read_post_form(mut multipart: Multipart) -> AppResult<PostForm> {
    let mut form = PostForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("invalid multipart body", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("unreadable file part", e))?;
                // Browsers send an empty, nameless part when no file was chosen.
                if !(filename.is_empty() && bytes.is_empty()) {
                    form.file = Some(UploadedFile {
                        filename,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            "title" | "summary" | "content" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(&format!("unreadable field {}", name), e))?;
                let slot = match name.as_str() {
                    "title" => &mut form.title,
                    "summary" => &mut form.summary,
                    _ => &mut form.content,
                };
                *slot = non_empty(text);
            }
            other => tracing::debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    Ok(form)
}

/// Stores the uploaded cover, if any, and returns its object key.
async fn store_cover(storage: &StorageState, file: Option<UploadedFile>) -> AppResult<Option<String>> {
    let Some(file) = file else {
        return Ok(None);
    };

    let key = cover_key(&file.filename);
    storage
        .put_object(&key, &file.content_type, file.bytes)
        .await
        .map_err(|e| {
            tracing::error!("cover upload failed: {}", e);
            AppError::Storage(e)
        })?;
    Ok(Some(key))
}

/// Removes a cover uploaded for a write that then failed, so it is not left
/// orphaned in the bucket. A failed removal is only logged.
async fn discard_cover(storage: &StorageState, cover: Option<&str>) {
    let Some(key) = cover else {
        return;
    };
    if let Err(e) = storage.delete_object(key).await {
        tracing::warn!(key, "orphaned cover could not be removed: {}", e);
    }
}

fn to_view(storage: &StorageState, row: PostWithAuthor, viewer: Option<&AuthUser>) -> PostView {
    let editable = viewer
        .map(|user| can_mutate(&user.claims, &row.post))
        .unwrap_or(false);
    let PostWithAuthor {
        post,
        author_username,
    } = row;

    PostView {
        cover_url: post.cover.as_deref().map(|key| storage.public_url(key)),
        id: post.id,
        title: post.title,
        summary: post.summary,
        content: post.content,
        cover: post.cover,
        author: PublicUser {
            id: post.author_id,
            username: author_username,
        },
        created_at: post.created_at,
        updated_at: post.updated_at,
        editable,
    }
}

// --- Handlers ---

/// signup
///
/// [Public Route] Registers a new account. The password is hashed before it
/// reaches the store; no strength rules are applied.
#[utoipa::path(
    post,
    path = "/signup",
    request_body = Credentials,
    responses(
        (status = 201, description = "Registered", body = SignupResponse),
        (status = 400, description = "Empty username"),
        (status = 409, description = "Username taken")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> AppResult<(StatusCode, Json<SignupResponse>)> {
    if payload.username.is_empty() {
        return Err(AppError::Validation("username must not be empty".to_string()));
    }

    let password_hash = hash_password_blocking(payload.password).await?;
    let user = state
        .repo
        .create_user(&payload.username, &password_hash)
        .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "account registered");
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            user: PublicUser::from(user),
        }),
    ))
}

/// login
///
/// [Public Route] Verifies credentials, issues a session token and sets it as
/// the `token` cookie. Unknown usernames and wrong passwords get the same 400.
#[utoipa::path(
    post,
    path = "/login",
    request_body = Credentials,
    responses(
        (status = 200, description = "Logged in; session cookie set", body = LoginResponse),
        (status = 400, description = "Invalid username or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<Credentials>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let Some(user) = state.repo.find_user_by_username(&payload.username).await? else {
        tracing::debug!(username = %payload.username, "login for unknown username");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password_blocking(payload.password, user.password_hash.clone()).await {
        tracing::debug!(user_id = %user.id, "login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let ttl = state.config.session_ttl;
    let token = state
        .tokens
        .issue(user.id, &user.username, ttl)
        .map_err(AppError::Token)?;

    tracing::info!(user_id = %user.id, "session issued");
    let jar = state.session.attach(jar, token.clone(), ttl);
    Ok((
        jar,
        Json(LoginResponse {
            message: "Login successful".to_string(),
            id: user.id,
            username: user.username,
            token,
        }),
    ))
}

/// profile
///
/// [Authenticated Route] Returns the verified session claim.
#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "Session claim", body = Claims),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn profile(user: AuthUser) -> Json<Claims> {
    Json(user.claims)
}

/// logout
///
/// [Public Route] Overwrites the session cookie with an expired one. The token
/// itself stays valid until its own expiry.
#[utoipa::path(
    post,
    path = "/logout",
    responses((status = 200, description = "Cookie cleared", body = MessageResponse))
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    (
        state.session.clear(jar),
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    )
}

/// create_post
///
/// [Authenticated Route] Creates a post authored by the caller. Any
/// authenticated identity may create; the author is taken from the session.
#[utoipa::path(
    post,
    path = "/post",
    request_body(content = crate::models::PostForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Created", body = Post),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "Upload exceeds the size limit")
    )
)]
pub async fn create_post(
    user: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<Post>> {
    let form = read_post_form(multipart).await?;
    let cover = store_cover(&state.storage, form.file).await?;

    let new_post = NewPost {
        title: form.title.unwrap_or_default(),
        summary: form.summary.unwrap_or_default(),
        content: form.content.unwrap_or_default(),
        cover: cover.clone(),
    };

    let post = match state.repo.create_post(user.id, new_post).await {
        Ok(post) => post,
        Err(e) => {
            discard_cover(&state.storage, cover.as_deref()).await;
            return Err(e);
        }
    };

    tracing::info!(post_id = %post.id, author_id = %user.id, "post created");
    Ok(Json(post))
}

/// update_post
///
/// [Authenticated Route] Partially updates a post. Only the author may update;
/// the ownership check runs before the body is read or anything is written.
#[utoipa::path(
    put,
    path = "/post/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body(content = crate::models::PostForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Not Found"),
        (status = 413, description = "Upload exceeds the size limit")
    )
)]
pub async fn update_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<Json<Post>> {
    let id = Uuid::parse_str(&id).map_err(|_| AppError::NotFound("post"))?;
    let existing = state
        .repo
        .get_post(id)
        .await?
        .ok_or(AppError::NotFound("post"))?;
    ensure_can_mutate(&user, &existing.post)?;

    let form = read_post_form(multipart).await?;
    let cover = store_cover(&state.storage, form.file).await?;
    let changes = PostChanges {
        title: form.title,
        summary: form.summary,
        content: form.content,
        cover: cover.clone(),
    };

    let post = match state.repo.update_post(id, changes).await {
        Ok(Some(post)) => post,
        Ok(None) => {
            discard_cover(&state.storage, cover.as_deref()).await;
            return Err(AppError::NotFound("post"));
        }
        Err(e) => {
            discard_cover(&state.storage, cover.as_deref()).await;
            return Err(e);
        }
    };

    tracing::info!(post_id = %post.id, "post updated");
    Ok(Json(post))
}

/// list_posts
///
/// [Public Route] The newest posts with their authors.
#[utoipa::path(
    get,
    path = "/allposts",
    responses((status = 200, description = "Newest posts", body = [PostView]))
)]
pub async fn list_posts(
    viewer: Option<AuthUser>,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<PostView>>> {
    let rows = state.repo.list_posts(POST_LIST_LIMIT).await?;
    let views = rows
        .into_iter()
        .map(|row| to_view(&state.storage, row, viewer.as_ref()))
        .collect();
    Ok(Json(views))
}

/// get_post
///
/// [Public Route] A single post. `editable` is true only for the author's own
/// valid session; anonymous and rejected sessions read the same response.
#[utoipa::path(
    get,
    path = "/post/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = PostView),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_post(
    viewer: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PostView>> {
    let id = Uuid::parse_str(&id).map_err(|_| AppError::NotFound("post"))?;
    let row = state
        .repo
        .get_post(id)
        .await?
        .ok_or(AppError::NotFound("post"))?;
    Ok(Json(to_view(&state.storage, row, viewer.as_ref())))
}
