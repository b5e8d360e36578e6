use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{Method, Request, Uri, header, request::Parts},
};
use inkpost::{
    AppConfig, AppError, AppState, InMemoryRepository, MockStorageService, TokenCodec,
    auth::{AuthUser, can_mutate},
    models::Post,
    password::{hash_password, verify_password},
    repository::Repository,
};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_USER_ID: Uuid = Uuid::from_u128(1);

fn create_app_state(jwt_secret: &str) -> AppState {
    let config = AppConfig {
        jwt_secret: jwt_secret.to_string(),
        ..AppConfig::default()
    };
    AppState::new(
        Arc::new(InMemoryRepository::new()),
        Arc::new(MockStorageService::new()),
        config,
    )
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn parts_with_cookie(token: &str) -> Parts {
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::COOKIE,
        header::HeaderValue::from_str(&format!("token={}", token)).unwrap(),
    );
    parts
}

async fn required(parts: &mut Parts, state: &AppState) -> Result<AuthUser, AppError> {
    <AuthUser as FromRequestParts<AppState>>::from_request_parts(parts, state).await
}

async fn optional(parts: &mut Parts, state: &AppState) -> Option<AuthUser> {
    <AuthUser as OptionalFromRequestParts<AppState>>::from_request_parts(parts, state)
        .await
        .unwrap()
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_cookie() {
    let token = TokenCodec::new(TEST_JWT_SECRET)
        .issue(TEST_USER_ID, "tester", Duration::from_secs(3600))
        .unwrap();
    let app_state = create_app_state(TEST_JWT_SECRET);

    let auth_user = required(&mut parts_with_cookie(&token), &app_state).await;

    let user = auth_user.unwrap();
    assert_eq!(user.id, TEST_USER_ID);
    assert_eq!(user.username, "tester");
}

#[tokio::test]
async fn test_auth_failure_with_missing_cookie() {
    let app_state = create_app_state(TEST_JWT_SECRET);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let auth_user = required(&mut parts, &app_state).await;
    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_with_expired_token() {
    let token = TokenCodec::new(TEST_JWT_SECRET)
        .issue_at(
            TEST_USER_ID,
            "tester",
            chrono::Utc::now() - chrono::Duration::hours(2),
            Duration::from_secs(3600),
        )
        .unwrap();
    let app_state = create_app_state(TEST_JWT_SECRET);

    let auth_user = required(&mut parts_with_cookie(&token), &app_state).await;
    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_with_token_signed_by_other_secret() {
    let token = TokenCodec::new("some-other-secret")
        .issue(TEST_USER_ID, "tester", Duration::from_secs(3600))
        .unwrap();
    let app_state = create_app_state(TEST_JWT_SECRET);

    let auth_user = required(&mut parts_with_cookie(&token), &app_state).await;
    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_optional_auth_treats_rejected_like_anonymous() {
    let app_state = create_app_state(TEST_JWT_SECRET);

    let mut anonymous = get_request_parts(Method::GET, "/".parse().unwrap());
    assert!(optional(&mut anonymous, &app_state).await.is_none());
    assert!(optional(&mut parts_with_cookie("junk"), &app_state).await.is_none());

    let token = app_state
        .tokens
        .issue(TEST_USER_ID, "tester", Duration::from_secs(60))
        .unwrap();
    let resolved = optional(&mut parts_with_cookie(&token), &app_state).await;
    assert_eq!(resolved.map(|u| u.id), Some(TEST_USER_ID));
}

#[tokio::test]
async fn test_ownership_follows_the_session_identity() {
    let repo = InMemoryRepository::new();
    let alice = repo
        .create_user("alice", &hash_password("a").unwrap())
        .await
        .unwrap();
    let bob = repo
        .create_user("bob", &hash_password("b").unwrap())
        .await
        .unwrap();

    let stored = repo.find_user_by_username("alice").await.unwrap().unwrap();
    assert!(verify_password("a", &stored.password_hash));
    assert!(!verify_password("b", &stored.password_hash));

    let codec = TokenCodec::new(TEST_JWT_SECRET);
    let alice_claims = codec
        .verify(&codec.issue(alice.id, "alice", Duration::from_secs(60)).unwrap())
        .unwrap();
    let bob_claims = codec
        .verify(&codec.issue(bob.id, "bob", Duration::from_secs(60)).unwrap())
        .unwrap();

    let post = Post {
        id: Uuid::new_v4(),
        author_id: alice.id,
        ..Post::default()
    };
    assert!(can_mutate(&alice_claims, &post));
    assert!(!can_mutate(&bob_claims, &post));
}
