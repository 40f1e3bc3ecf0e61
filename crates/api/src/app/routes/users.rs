use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use deskhive_core::OrgId;
use deskhive_infra::AccessEngine;

use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/list", get(list))
        .route("/assign", post(assign))
        .route("/update-role", post(update_role))
        .route("/create", post(create))
        .route("/delete", post(delete))
}

/// GET /users/list?orgId=&includeChildren=1
pub async fn list(
    Extension(engine): Extension<AccessEngine>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(q): Query<dto::ListUsersQuery>,
) -> axum::response::Response {
    let org_id = match dto::parse_opt_id::<OrgId>(q.org_id.as_deref(), "orgId") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match engine.list_users(ctx.principal(), org_id, q.include_children()).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

/// POST /users/assign
pub async fn assign(
    Extension(engine): Extension<AccessEngine>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<dto::MembershipBody>,
) -> axum::response::Response {
    let req = match body.into_request() {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    match engine.assign_member(ctx.principal(), req).await {
        Ok(member) => (StatusCode::OK, Json(member)).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

/// POST /users/update-role
pub async fn update_role(
    Extension(engine): Extension<AccessEngine>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<dto::MembershipBody>,
) -> axum::response::Response {
    let req = match body.into_request() {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    match engine.update_member_role(ctx.principal(), req).await {
        Ok(member) => (StatusCode::OK, Json(member)).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

/// POST /users/create
pub async fn create(
    Extension(engine): Extension<AccessEngine>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateUserBody>,
) -> axum::response::Response {
    let req = match body.into_request() {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    match engine.create_member(ctx.principal(), req).await {
        Ok(member) => (StatusCode::CREATED, Json(member)).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

/// POST /users/delete
pub async fn delete(
    Extension(engine): Extension<AccessEngine>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<dto::RemoveMemberBody>,
) -> axum::response::Response {
    let req = match body.into_request() {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    match engine.remove_member(ctx.principal(), req).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}
