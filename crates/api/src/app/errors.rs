use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use hrdesk_core::DomainError;

/// Map a domain error to its HTTP status and a body safe to show clients.
///
/// Store failures are logged here and never leak past the generic message.
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match &err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::Authentication(msg) => json_error(StatusCode::UNAUTHORIZED, "unauthorized", msg),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::StoreUnavailable(detail) => {
            tracing::error!(error = %detail, "request failed on store error");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                err.public_message(),
            )
        }
    }
}

/// A body axum could not turn into the request DTO: not JSON, wrong content
/// type, or a field of the wrong type. Reported like any other bad input.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    tracing::debug!(status = %rejection.status(), error = %rejection.body_text(), "request body rejected");
    json_error(
        StatusCode::BAD_REQUEST,
        "validation_error",
        "request body must be a JSON object with the expected fields",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_taxonomy() {
        let cases = [
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (DomainError::authentication("x"), StatusCode::UNAUTHORIZED),
            (DomainError::conflict("x"), StatusCode::CONFLICT),
            (DomainError::store_unavailable("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }
}
