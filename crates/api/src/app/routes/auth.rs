//! Public session endpoints: no bearer token required.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use deskhive_infra::AccessEngine;
use deskhive_infra::access::LoginOutcome;

use crate::app::{dto, errors};

/// POST /login
///
/// `409` with the candidate memberships when the account belongs to several
/// organizations and no `orgId` was given.
pub async fn login(
    Extension(engine): Extension<AccessEngine>,
    Json(body): Json<dto::LoginBody>,
) -> axum::response::Response {
    let req = match body.into_request() {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    match engine.login(req).await {
        Ok(LoginOutcome::Granted(grant)) => (StatusCode::OK, Json(grant)).into_response(),
        Ok(LoginOutcome::OrgSelectionRequired(memberships)) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "org_selection_required",
                "message": "multiple organizations; retry with orgId",
                "memberships": memberships,
            })),
        )
            .into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

/// POST /signup
pub async fn signup(
    Extension(engine): Extension<AccessEngine>,
    Json(body): Json<dto::SignupBody>,
) -> axum::response::Response {
    match engine.signup(body.into()).await {
        Ok(grant) => (StatusCode::CREATED, Json(grant)).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}
