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
        .route("/children", get(children))
        .route("/list", get(list))
        .route("/create-sub", post(create_sub))
}

/// GET /organizations/children?parent_id= (defaults to the active org)
pub async fn children(
    Extension(engine): Extension<AccessEngine>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(q): Query<dto::ChildrenQuery>,
) -> axum::response::Response {
    let parent_id = match dto::parse_opt_id::<OrgId>(q.parent_id.as_deref(), "parent_id") {
        Ok(id) => id.unwrap_or(ctx.active_org_id()),
        Err(resp) => return resp,
    };

    match engine.children(ctx.principal(), parent_id).await {
        Ok(tree) => (StatusCode::OK, Json(tree)).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

/// GET /organizations/list
pub async fn list(
    Extension(engine): Extension<AccessEngine>,
    Extension(ctx): Extension<PrincipalContext>,
) -> axum::response::Response {
    match engine.list_orgs(ctx.principal()).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

/// POST /organizations/create-sub
pub async fn create_sub(
    Extension(engine): Extension<AccessEngine>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateSubOrgBody>,
) -> axum::response::Response {
    let req = match body.into_request() {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    match engine.create_sub_org(ctx.principal(), req).await {
        Ok(org) => (StatusCode::CREATED, Json(org)).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}
