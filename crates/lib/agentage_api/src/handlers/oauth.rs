//! OAuth login start and provider callback.
//!
//! The start route picks an [`OAuthIntent`] from its query, in this order:
//! `link_token`, `desktop=true&callback=`, `device_code`, plain login. The
//! callback finishes whatever intent was stored with the state parameter.

use agentage_core::auth::{TokenPayload, TokenVerification};
use agentage_core::models::{Provider, UserRecord};
use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use tracing::{info, warn};
use url::Url;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{OAuthCallbackQuery, OAuthStartQuery};
use crate::services::oauth::{OAuthIntent, desktop_redirect, frontend_url, validate_desktop_callback};

fn parse_provider(raw: &str) -> AppResult<Provider> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("Unknown OAuth provider: {raw}")))
}

async fn start_intent(state: &AppState, query: &OAuthStartQuery) -> AppResult<OAuthIntent> {
    if let Some(link_token) = query.link_token.as_deref() {
        return match state.tokens.verify(link_token) {
            TokenVerification::Valid(payload) => Ok(OAuthIntent::Link {
                user_id: payload.user_id,
            }),
            TokenVerification::Invalid { expired: true, .. } => Err(AppError::TokenExpired),
            TokenVerification::Invalid { .. } => {
                Err(AppError::Unauthorized("Invalid link token".into()))
            }
        };
    }

    if query.is_desktop() {
        let raw = query
            .callback
            .as_deref()
            .ok_or_else(|| AppError::Validation("callback is required for desktop login".into()))?;
        let callback = validate_desktop_callback(raw)?;
        return Ok(OAuthIntent::Desktop { callback });
    }

    if let Some(code) = query.device_code.as_deref() {
        // Fail here rather than after a full provider round trip.
        let verified = state.devices.verify_user_code(code).await?;
        return Ok(OAuthIntent::Device {
            user_code: verified.user_code,
        });
    }

    Ok(OAuthIntent::Login)
}

/// `GET /api/auth/oauth/{provider}` redirects to the provider's consent page.
pub async fn oauth_start_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthStartQuery>,
) -> AppResult<Redirect> {
    let provider = parse_provider(&provider)?;
    // Unconfigured providers 404 before any token or code is inspected.
    state.oauth.config(provider)?;
    let intent = start_intent(&state, &query).await?;
    let url = state.oauth.begin(provider, intent)?;
    Ok(Redirect::to(url.as_str()))
}

fn issue_for(state: &AppState, user: &UserRecord) -> AppResult<String> {
    Ok(state.tokens.issue(&TokenPayload {
        user_id: user.id.clone(),
        email: user.email.clone(),
        role: user.role,
    })?)
}

/// `GET /api/auth/oauth/{provider}/callback` completes the login and redirects
/// to the frontend, the device authorization page, or a desktop callback.
pub async fn oauth_callback_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> AppResult<Redirect> {
    let provider = parse_provider(&provider)?;
    let frontend = state.config.frontend_url.as_str();

    if let Some(error) = query.error.as_deref() {
        warn!(%provider, error, description = ?query.error_description, "provider returned an OAuth error");
        let url = frontend_url(frontend, "/login", &[("error", error)])?;
        return Ok(Redirect::to(url.as_str()));
    }

    let (Some(code), Some(state_param)) = (query.code.as_deref(), query.state.as_deref()) else {
        return Err(AppError::Validation("code and state are required".into()));
    };

    let pending = state.oauth.take_state(provider, state_param)?;
    let profile = state
        .oauth
        .complete(provider, code, &pending.pkce_verifier)
        .await?;

    let target: Url = match pending.intent {
        OAuthIntent::Link { user_id } => {
            let user = state.accounts.link_provider(&user_id, &profile).await?;
            let token = issue_for(&state, &user)?;
            frontend_url(
                frontend,
                "/auth/callback",
                &[("token", token.as_str()), ("linked", provider.as_str())],
            )?
        }
        intent => {
            let user = state.accounts.resolve_or_create(&profile).await?;
            if !user.is_active {
                return Err(AppError::Forbidden("User account is disabled".into()));
            }
            let token = issue_for(&state, &user)?;
            info!(user_id = %user.id, %provider, "OAuth login completed");
            match intent {
                OAuthIntent::Device { user_code } => frontend_url(
                    frontend,
                    "/device/authorize",
                    &[("token", token.as_str()), ("code", user_code.as_str())],
                )?,
                OAuthIntent::Desktop { callback } => {
                    desktop_redirect(&callback, &[("token", token.as_str())])
                }
                OAuthIntent::Login | OAuthIntent::Link { .. } => {
                    frontend_url(frontend, "/auth/callback", &[("token", token.as_str())])?
                }
            }
        }
    };

    Ok(Redirect::to(target.as_str()))
}
