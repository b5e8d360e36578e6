use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, request::Parts},
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::Post,
    session::extract_token,
    token::{Claims, TokenCodec},
};

/// AuthUser
///
/// The verified identity of a request. Obtaining one is the authentication half
/// of the gate; [`can_mutate`] is the authorization half.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub claims: Claims,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            username: claims.username.clone(),
            claims,
        }
    }
}

/// Extracts and verifies the session token.
///
/// Absent, malformed, forged and expired tokens all yield the same
/// [`AppError::Unauthorized`]; the cause only reaches the debug log.
pub fn require_authenticated(headers: &HeaderMap, codec: &TokenCodec) -> Result<AuthUser, AppError> {
    let Some(token) = extract_token(headers) else {
        tracing::debug!("no session token presented");
        return Err(AppError::Unauthorized);
    };

    codec.verify(&token).map(AuthUser::from).map_err(|cause| {
        tracing::debug!(%cause, "session token rejected");
        AppError::Unauthorized
    })
}

/// Ownership policy: only the author may change a post. No roles, no override.
pub fn can_mutate(claims: &Claims, post: &Post) -> bool {
    claims.id == post.author_id
}

/// [`can_mutate`] as a guard, failing with [`AppError::Forbidden`].
pub fn ensure_can_mutate(user: &AuthUser, post: &Post) -> Result<(), AppError> {
    if can_mutate(&user.claims, post) {
        Ok(())
    } else {
        tracing::info!(user_id = %user.id, post_id = %post.id, "mutation denied: not the author");
        Err(AppError::Forbidden)
    }
}

/// Required authentication: rejects with 401 before the handler runs.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenCodec: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let codec = TokenCodec::from_ref(state);
        require_authenticated(&parts.headers, &codec)
    }
}

/// Optional authentication for routes open to anonymous readers.
///
/// A rejected token is treated exactly like no token, so anonymous and
/// rejected callers see identical behaviour.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenCodec: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let codec = TokenCodec::from_ref(state);
        Ok(require_authenticated(&parts.headers, &codec).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header};
    use std::time::Duration;

    fn post_by(author_id: Uuid) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id,
            ..Post::default()
        }
    }

    fn claims_for(id: Uuid) -> Claims {
        Claims {
            id,
            username: "someone".into(),
            iat: 0,
            exp: i64::MAX,
        }
    }

    #[test]
    fn author_may_mutate() {
        let author = Uuid::new_v4();
        assert!(can_mutate(&claims_for(author), &post_by(author)));
    }

    #[test]
    fn other_identity_may_not_mutate() {
        let post = post_by(Uuid::new_v4());
        assert!(!can_mutate(&claims_for(Uuid::new_v4()), &post));

        let intruder = AuthUser::from(claims_for(Uuid::new_v4()));
        assert!(matches!(
            ensure_can_mutate(&intruder, &post),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn every_rejection_cause_is_the_same_unauthorized() {
        let codec = TokenCodec::new("gate-secret");
        let expired = codec
            .issue_at(
                Uuid::new_v4(),
                "old",
                chrono::Utc::now() - chrono::Duration::hours(3),
                Duration::from_secs(60),
            )
            .unwrap();
        let forged = TokenCodec::new("other")
            .issue(Uuid::new_v4(), "forged", Duration::from_secs(60))
            .unwrap();

        let cases = [
            None,
            Some("garbage".to_string()),
            Some(expired),
            Some(forged),
        ];

        for token in cases {
            let mut headers = HeaderMap::new();
            if let Some(token) = token {
                let cookie = format!("token={}", token);
                headers.insert(header::COOKIE, HeaderValue::from_str(&cookie).unwrap());
            }
            assert!(matches!(
                require_authenticated(&headers, &codec),
                Err(AppError::Unauthorized)
            ));
        }
    }

    #[test]
    fn valid_cookie_authenticates() {
        let codec = TokenCodec::new("gate-secret");
        let id = Uuid::new_v4();
        let token = codec.issue(id, "alice", Duration::from_secs(60)).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("token={}", token)).unwrap(),
        );

        let user = require_authenticated(&headers, &codec).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.username, "alice");
    }
}
