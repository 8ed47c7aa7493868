//! Request/response bodies for the `/auth` routes.
//!
//! Request fields are optional so a missing field reaches the service and
//! comes back as the same 400/401 a blank one would, instead of a body
//! rejection.

use serde::{Deserialize, Serialize};

use hrdesk_auth::Role;
use hrdesk_core::ExternalId;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub external_id: ExternalId,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequestResetRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestResetResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub external_id: ExternalId,
    pub email: String,
    pub role: Role,
}
