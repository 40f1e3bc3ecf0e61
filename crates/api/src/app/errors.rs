use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use deskhive_infra::AccessError;

pub fn access_error_to_response(err: AccessError) -> axum::response::Response {
    let code = err.code();
    match err {
        AccessError::Unauthenticated => json_error(StatusCode::UNAUTHORIZED, code, "unauthorized"),
        AccessError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, code, msg),
        AccessError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, code, msg),
        AccessError::Conflict(msg) => json_error(StatusCode::CONFLICT, code, msg),
        AccessError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, code, msg),
        AccessError::InvariantViolation(msg) => json_error(StatusCode::UNPROCESSABLE_ENTITY, code, msg),
        AccessError::Internal(msg) => {
            tracing::error!(error = %msg, "request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, code, "internal server error")
        }
    }
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

pub fn bad_request(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_taxonomy() {
        let cases = [
            (AccessError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (AccessError::forbidden("x"), StatusCode::FORBIDDEN),
            (AccessError::not_found("x"), StatusCode::NOT_FOUND),
            (AccessError::Conflict("x".into()), StatusCode::CONFLICT),
            (AccessError::validation("x"), StatusCode::BAD_REQUEST),
            (AccessError::InvariantViolation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AccessError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(access_error_to_response(err).status(), status);
        }
    }
}
