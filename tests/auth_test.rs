/// Bearer-token protection of gateway routes.
///
/// Covers:
/// - Requests without a token are rejected with 401
/// - Malformed and wrongly-signed tokens are rejected
/// - Expired tokens are rejected with a distinct message
/// - A valid token exposes the numeric user id to the handler
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::FromRef,
    http::{header, Request, StatusCode},
    routing::get,
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use tower::util::ServiceExt;

use sneakstore_backend::auth::{issue_token, Claims};
use sneakstore_backend::auth_middleware::{AuthSecret, AuthUser};

const SECRET: &str = "integration-test-secret";

#[derive(Clone)]
struct TestState {
    secret: AuthSecret,
}

impl FromRef<TestState> for AuthSecret {
    fn from_ref(state: &TestState) -> Self {
        state.secret.clone()
    }
}

async fn whoami(user: AuthUser) -> String {
    user.user_sso_id.to_string()
}

fn app() -> Router {
    Router::new()
        .route("/whoami", get(whoami))
        .with_state(TestState {
            secret: AuthSecret(SECRET.to_string()),
        })
}

fn request(authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/whoami");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn error_of(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    body["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let response = app().oneshot(request(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_of(response).await, "Missing authentication token");
}

#[tokio::test]
async fn non_bearer_scheme_is_rejected() {
    let response = app()
        .oneshot(request(Some("Basic dXNlcjpwYXNz")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let response = app()
        .oneshot(request(Some("Bearer not-a-jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_of(response).await, "Invalid token");
}

#[tokio::test]
async fn wrong_signing_secret_is_rejected() {
    let token = issue_token("some-other-secret", 42, Duration::from_secs(60)).unwrap();
    let response = app()
        .oneshot(request(Some(&format!("Bearer {token}"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let claims = Claims {
        uid: 42,
        exp: chrono::Utc::now().timestamp() - 120,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let response = app()
        .oneshot(request(Some(&format!("Bearer {token}"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_of(response).await, "Token has expired");
}

#[tokio::test]
async fn valid_token_exposes_the_user_id() {
    let token = issue_token(SECRET, 42, Duration::from_secs(60)).unwrap();
    let response = app()
        .oneshot(request(Some(&format!("Bearer {token}"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes, "42");
}
