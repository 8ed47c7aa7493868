use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::USER_AGENT},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use hrdesk_auth::DeviceMetadata;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Public `/auth` endpoints. `/auth/profile` is added separately behind the
/// bearer-token middleware.
pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/request-reset", post(request_reset))
        .route("/reset-password", post(reset_password))
}

pub fn protected_router() -> Router {
    Router::new().route("/profile", get(profile))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RegisterRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let result = services
        .auth
        .register(
            body.email.as_deref().unwrap_or_default(),
            body.password.as_deref().unwrap_or_default(),
            body.role.as_deref().unwrap_or_default(),
        )
        .await;

    match result {
        Ok(external_id) => (
            StatusCode::CREATED,
            Json(dto::RegisterResponse { external_id }),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<dto::LoginRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let device = device_metadata(&headers, peer.map(|ConnectInfo(addr)| addr));
    let result = services
        .auth
        .login(
            body.email.as_deref().unwrap_or_default(),
            body.password.as_deref().unwrap_or_default(),
            device,
        )
        .await;

    match result {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RefreshRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let token = body.refresh_token.unwrap_or_default();
    match services.auth.refresh(&token).await {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RefreshRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let token = body.refresh_token.unwrap_or_default();
    match services.auth.logout(&token).await {
        Ok(()) => Json(dto::MessageResponse {
            message: "logged out successfully",
        })
        .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn request_reset(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RequestResetRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let email = body.email.unwrap_or_default();
    match services.auth.request_reset(&email).await {
        Ok(ticket) => Json(dto::RequestResetResponse {
            message: "if the email is registered, a reset token has been issued",
            token: services.expose_reset_token.then_some(ticket.token),
        })
        .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::ResetPasswordRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let result = services
        .auth
        .reset_password(
            body.token.as_deref().unwrap_or_default(),
            body.new_password.as_deref().unwrap_or_default(),
        )
        .await;

    match result {
        Ok(()) => Json(dto::MessageResponse {
            message: "password has been reset",
        })
        .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn profile(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(dto::ProfileResponse {
        external_id: principal.external_id(),
        email: principal.email().to_string(),
        role: principal.role(),
    })
}

/// Device identity for a login: the user agent, plus the client address for
/// display. A blank user agent counts as none.
fn device_metadata(headers: &HeaderMap, peer: Option<SocketAddr>) -> DeviceMetadata {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ua| !ua.is_empty())
        .map(str::to_string);

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string);
    let origin = forwarded.or_else(|| peer.map(|addr| addr.ip().to_string()));

    DeviceMetadata { user_agent, origin }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn forwarded_for_wins_over_peer_address() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        let device = device_metadata(&headers, Some(peer));
        assert_eq!(device.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(device.origin.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn peer_address_and_missing_agent() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("  "));
        let peer: SocketAddr = "192.0.2.1:443".parse().unwrap();

        let device = device_metadata(&headers, Some(peer));
        assert_eq!(device.user_agent, None);
        assert_eq!(device.origin.as_deref(), Some("192.0.2.1"));
        assert_eq!(device_metadata(&HeaderMap::new(), None), DeviceMetadata::default());
    }
}
