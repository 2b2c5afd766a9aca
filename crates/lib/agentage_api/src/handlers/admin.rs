//! Admin user management.

use agentage_core::auth::Identity;
use agentage_core::models::UserUpdate;
use axum::Json;
use axum::extract::{Extension, Path, State};
use chrono::Utc;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{AdminUserUpdate, UserView};

/// `GET /api/admin/users/{id}`
pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<UserView>> {
    let user = state
        .accounts
        .users()
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {id}")))?;
    Ok(Json(UserView::from(&user)))
}

/// `PATCH /api/admin/users/{id}` changes `role` and/or `isActive`.
pub async fn update_user_handler(
    State(state): State<AppState>,
    Extension(admin): Extension<Identity>,
    Path(id): Path<String>,
    Json(body): Json<AdminUserUpdate>,
) -> AppResult<Json<UserView>> {
    if body.role.is_none() && body.is_active.is_none() {
        return Err(AppError::Validation("Nothing to update".into()));
    }
    if id == admin.user_id && body.is_active == Some(false) {
        return Err(AppError::Validation("Cannot deactivate your own account".into()));
    }

    let mut update = UserUpdate::touched(Utc::now());
    if let Some(role) = body.role {
        update = update.role(role);
    }
    if let Some(active) = body.is_active {
        update = update.active(active);
    }

    let user = state.accounts.users().update(&id, update).await?;
    info!(admin_id = %admin.user_id, user_id = %user.id, role = %user.role, active = user.is_active, "user updated by admin");
    Ok(Json(UserView::from(&user)))
}
