//! Auth middleware for Axum routes.
//!
//! Validates JWT Bearer tokens and injects `Claims` into the request
//! extensions. Without an auth config the server runs open: every request
//! gets anonymous claims.

use crate::api::handlers::{AppError, BoardState};
use crate::auth::jwt::{decode_jwt, Claims};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Middleware guarding `/api/*`.
///
/// 1. No `auth_config` → anonymous claims, request continues
/// 2. Missing or malformed `Authorization: Bearer <token>` → 401
/// 3. Invalid or expired token → 401
/// 4. Email outside `allowed_email_domain` (if set) → 403
pub async fn require_auth(
    State(state): State<BoardState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(auth_config) = state.auth_config.as_ref() else {
        req.extensions_mut().insert(Claims::anonymous());
        return Ok(next.run(req).await);
    };

    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header format".to_string()))?;

    let claims = decode_jwt(token, &auth_config.jwt_secret).map_err(|e| {
        tracing::debug!("rejected token: {:#}", e);
        AppError::Unauthorized("Invalid token".to_string())
    })?;

    if let Some(ref domain) = auth_config.allowed_email_domain {
        if !claims.email.ends_with(&format!("@{}", domain)) {
            return Err(AppError::Forbidden(format!(
                "Email domain not allowed (expected @{})",
                domain
            )));
        }
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::extractor::AuthUser;
    use crate::auth::jwt::{encode_jwt, ANONYMOUS_USER_ID};
    use crate::test_helpers::{mock_server_state, test_auth_config, TEST_JWT_SECRET};
    use crate::AuthConfig;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn whoami(user: AuthUser) -> String {
        user.user_id.to_string()
    }

    fn test_app(auth_config: Option<AuthConfig>) -> Router {
        let state = mock_server_state(auth_config);
        Router::new()
            .route("/whoami", get(whoami))
            .layer(from_fn_with_state(state.clone(), require_auth))
            .with_state(state)
    }

    fn request(token: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri("/whoami");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_open_mode_injects_anonymous_claims() {
        let resp = test_app(None).oneshot(request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, ANONYMOUS_USER_ID.to_string());
    }

    #[tokio::test]
    async fn test_missing_header_returns_401() {
        let resp = test_app(Some(test_auth_config()))
            .oneshot(request(None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_token_returns_401() {
        let resp = test_app(Some(test_auth_config()))
            .oneshot(request(Some("invalid.token.here")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_token_exposes_caller() {
        let user_id = uuid::Uuid::new_v4();
        let token = encode_jwt(user_id, "gus@example.com", "Gus", TEST_JWT_SECRET, 600).unwrap();

        let resp = test_app(Some(test_auth_config()))
            .oneshot(request(Some(&token)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, user_id.to_string());
    }

    #[tokio::test]
    async fn test_wrong_domain_returns_403() {
        let mut config = test_auth_config();
        config.allowed_email_domain = Some("example.org".to_string());
        let token =
            encode_jwt(uuid::Uuid::new_v4(), "gus@example.com", "Gus", TEST_JWT_SECRET, 600).unwrap();

        let resp = test_app(Some(config))
            .oneshot(request(Some(&token)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
