use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(ctx): Extension<PrincipalContext>) -> impl IntoResponse {
    let principal = ctx.principal();
    Json(serde_json::json!({
        "userId": principal.user_id,
        "email": principal.email,
        "orgId": principal.active_org_id,
        "role": principal.role_label,
        "roleType": principal.membership.role_type(),
        "customRoleId": principal.membership.custom_role_id,
        "capabilities": principal.capabilities,
        "reachesSubtree": principal.reaches_subtree(),
    }))
}
