//! Account handlers for the signed-in user.

use agentage_core::auth::Identity;
use agentage_core::models::Provider;
use axum::Json;
use axum::extract::{Extension, Path, State};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::OptionalIdentity;
use crate::models::{LogoutResponse, MeResponse, ProvidersResponse, StatusResponse, UserView};

/// `GET /api/auth/me` returns the full record of the signed-in user.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> AppResult<Json<MeResponse>> {
    let user = state
        .accounts
        .users()
        .find_by_id(&identity.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User account no longer exists".into()))?;
    Ok(Json(MeResponse {
        user: UserView::from(&user),
        authenticated: true,
    }))
}

/// `GET /api/auth/status` never fails; anonymous callers get `authenticated: false`.
pub async fn status_handler(
    Extension(OptionalIdentity(identity)): Extension<OptionalIdentity>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        authenticated: identity.is_some(),
        user: identity.map(Into::into),
    })
}

/// `GET /api/auth/providers`
pub async fn providers_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> AppResult<Json<ProvidersResponse>> {
    let providers = state.accounts.providers(&identity.user_id).await?;
    Ok(Json(ProvidersResponse { providers }))
}

/// `DELETE /api/auth/providers/{provider}` unlinks a provider; the last one stays.
pub async fn unlink_provider_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(provider): Path<String>,
) -> AppResult<Json<ProvidersResponse>> {
    let provider: Provider = provider
        .parse()
        .map_err(|e: agentage_core::models::UnknownProvider| AppError::Validation(e.to_string()))?;
    state
        .accounts
        .unlink_provider(&identity.user_id, provider)
        .await?;
    let providers = state.accounts.providers(&identity.user_id).await?;
    Ok(Json(ProvidersResponse { providers }))
}

/// `POST /api/auth/logout`
///
/// Tokens are stateless; the client discards its copy.
pub async fn logout_handler() -> Json<LogoutResponse> {
    Json(LogoutResponse {
        success: true,
        message: "Logged out successfully".into(),
    })
}
