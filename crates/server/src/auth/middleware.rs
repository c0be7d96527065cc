use crate::{
    api::error::{ApiError, ErrorCode},
    auth::jwt::SessionTokenService,
};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use redline_common::types::Actor;

pub async fn require_bearer_auth(
    State(token_service): State<Arc<SessionTokenService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
    {
        Some(token) => token,
        None => return unauthorized_response("missing bearer token"),
    };

    let actor: Actor = match token_service.validate_session_token(token) {
        Ok(actor) => actor,
        Err(_) => return unauthorized_response("invalid bearer token"),
    };

    request.extensions_mut().insert(actor);

    next.run(request).await
}

fn extract_bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    Some(token)
}

fn unauthorized_response(message: &'static str) -> Response {
    ApiError::new(ErrorCode::AuthInvalidToken, message).into_response()
}

#[cfg(test)]
mod tests {
    use super::require_bearer_auth;
    use crate::auth::jwt::SessionTokenService;
    use axum::{
        body::Body,
        extract::Extension,
        http::{header::AUTHORIZATION, Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use redline_common::types::Actor;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    const TEST_SECRET: &str = "redline_test_secret_that_is_definitely_long_enough";

    fn protected_app(token_service: Arc<SessionTokenService>) -> Router {
        Router::new()
            .route(
                "/protected",
                get(|Extension(actor): Extension<Actor>| async move {
                    actor.user_id.to_string()
                }),
            )
            .layer(middleware::from_fn_with_state(token_service, require_bearer_auth))
    }

    #[tokio::test]
    async fn rejects_requests_without_bearer_token() {
        let app = protected_app(Arc::new(
            SessionTokenService::new(TEST_SECRET).expect("service should initialize"),
        ));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_requests_with_invalid_bearer_token() {
        let app = protected_app(Arc::new(
            SessionTokenService::new(TEST_SECRET).expect("service should initialize"),
        ));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header(AUTHORIZATION, "Bearer invalid-token")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn injects_actor_for_valid_bearer_token() {
        let service =
            Arc::new(SessionTokenService::new(TEST_SECRET).expect("service should initialize"));
        let user_id = Uuid::new_v4();
        let token = service
            .issue_session_token(user_id, &["owner@example.com".to_string()])
            .expect("token should be issued");

        let response = protected_app(service)
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
