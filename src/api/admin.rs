//! User administration: role grants and account deactivation.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use super::gate::CurrentUser;
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::auth::Role;
use crate::db::Identity;
use crate::services::{AuditEvent, RequestContext};

const ENTITY: &str = "User";

#[derive(Debug, Serialize)]
pub struct UserRoles {
    pub user_id: String,
    pub roles: Vec<String>,
}

fn parse_role(raw: &str) -> Result<Role, ApiError> {
    raw.parse()
        .map_err(|e: crate::auth::UnknownRole| ApiError::validation(e.to_string()))
}

async fn ensure_user(state: &AppState, id: &str) -> Result<Identity, ApiError> {
    state
        .store()
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// PUT /api/admin/users/{id}/roles/{role}
pub async fn assign_role(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path((id, role)): Path<(String, String)>,
) -> Result<Json<ApiResponse<UserRoles>>, ApiError> {
    let role = parse_role(&role)?;
    ensure_user(&state, &id).await?;

    if state.store().assign_role(&id, role).await? {
        state
            .auditor()
            .record(
                &ctx,
                AuditEvent::new(
                    ENTITY,
                    "AssignRole",
                    json!({ "userId": id, "role": role.as_str() }),
                )
                .entity(&id)
                .actor(Some(caller.id())),
            )
            .await;
    }

    let roles = state.store().roles_for_user(&id).await?;
    Ok(Json(ApiResponse::success(UserRoles {
        user_id: id,
        roles: roles.names(),
    })))
}

/// DELETE /api/admin/users/{id}/roles/{role}
///
/// The last active Administrator cannot lose the role.
pub async fn revoke_role(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path((id, role)): Path<(String, String)>,
) -> Result<Json<ApiResponse<UserRoles>>, ApiError> {
    let role = parse_role(&role)?;
    let target = ensure_user(&state, &id).await?;

    let current = state.store().roles_for_user(&id).await?;
    if role == Role::Administrator
        && target.is_active
        && current.contains(Role::Administrator)
        && state
            .store()
            .count_active_role_members(Role::Administrator)
            .await?
            <= 1
    {
        return Err(ApiError::validation(
            "Cannot remove the last Administrator",
        ));
    }

    if state.store().revoke_role(&id, role).await? {
        state
            .auditor()
            .record(
                &ctx,
                AuditEvent::new(
                    ENTITY,
                    "RevokeRole",
                    json!({ "userId": id, "role": role.as_str() }),
                )
                .entity(&id)
                .actor(Some(caller.id())),
            )
            .await;
    }

    let roles = state.store().roles_for_user(&id).await?;
    Ok(Json(ApiResponse::success(UserRoles {
        user_id: id,
        roles: roles.names(),
    })))
}

/// POST /api/admin/users/{id}/deactivate
pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service()
        .deactivate(&id, caller.id(), &ctx)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "User deactivated successfully",
    ))))
}
