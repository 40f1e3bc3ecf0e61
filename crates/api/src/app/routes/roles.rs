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
        .route("/upsert", post(upsert))
}

/// GET /roles/list?orgId= (defaults to the active org)
pub async fn list(
    Extension(engine): Extension<AccessEngine>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(q): Query<dto::OrgQuery>,
) -> axum::response::Response {
    let org_id = match dto::parse_opt_id::<OrgId>(q.org_id.as_deref(), "orgId") {
        Ok(id) => id.unwrap_or(ctx.active_org_id()),
        Err(resp) => return resp,
    };

    match engine.list_roles(ctx.principal(), org_id).await {
        Ok(catalog) => (StatusCode::OK, Json(catalog)).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

/// POST /roles/upsert: `201` on create, `200` on update.
pub async fn upsert(
    Extension(engine): Extension<AccessEngine>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<dto::UpsertRoleBody>,
) -> axum::response::Response {
    let req = match body.into_request() {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let status = if req.id.is_some() { StatusCode::OK } else { StatusCode::CREATED };

    match engine.upsert_role(ctx.principal(), req).await {
        Ok(role) => (status, Json(role)).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}
