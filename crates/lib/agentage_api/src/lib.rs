//! # agentage_api
//!
//! HTTP API library for Agentage authentication: the RFC 8628 device flow,
//! OAuth web logins, account linking and admin user management.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use agentage_core::accounts::AccountLinker;
use agentage_core::auth::{AuthGate, TokenService};
use agentage_core::device::{DeviceAuthService, POLL_INTERVAL_SECS, PollLimiter};
use agentage_core::store::{DeviceCodeStore, UserStore};
use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::error::StartupError;
use crate::handlers::{admin, auth, device, health, oauth};
use crate::services::oauth::OAuthClient;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub tokens: Arc<TokenService>,
    pub gate: AuthGate,
    pub accounts: AccountLinker,
    pub devices: Arc<DeviceAuthService>,
    /// Per device code poll spacing, kept outside the device code record.
    pub poll_limiter: Arc<PollLimiter>,
    pub oauth: Arc<OAuthClient>,
}

impl AppState {
    /// Wire every component over the given stores.
    ///
    /// Fails when the signing secret is missing, the TTL does not parse, or
    /// the public URL is invalid.
    pub fn new(
        config: ApiConfig,
        users: Arc<dyn UserStore>,
        codes: Arc<dyn DeviceCodeStore>,
    ) -> Result<Self, StartupError> {
        let tokens = Arc::new(TokenService::new(&config.jwt_secret, &config.jwt_expires_in)?);
        let devices = DeviceAuthService::new(
            codes,
            users.clone(),
            tokens.clone(),
            &config.public_api_url,
        )?;
        let oauth = OAuthClient::new(config.providers.clone())?;
        // Half a second of slack for client timer jitter.
        let min_spacing =
            Duration::from_secs(POLL_INTERVAL_SECS as u64).saturating_sub(Duration::from_millis(500));

        Ok(Self {
            gate: AuthGate::new(tokens.clone(), users.clone()),
            accounts: AccountLinker::new(users),
            devices: Arc::new(devices),
            poll_limiter: Arc::new(PollLimiter::new(min_spacing)),
            oauth: Arc::new(oauth),
            tokens,
            config: Arc::new(config),
        })
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::GET_API_HEALTH, get(health::health_handler))
        .route(routes::POST_DEVICE_CODE, post(device::device_code_handler))
        .route(routes::POST_DEVICE_TOKEN, post(device::device_token_handler))
        .route(routes::GET_DEVICE_VERIFY, get(device::device_verify_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::GET_AUTH_OAUTH_PROVIDER, get(oauth::oauth_start_handler))
        .route(
            routes::GET_AUTH_OAUTH_PROVIDER_CALLBACK,
            get(oauth::oauth_callback_handler),
        );

    // Identity attached when present
    let optional = Router::new()
        .route(routes::GET_AUTH_STATUS, get(auth::status_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::optional_auth,
        ));

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .route(routes::GET_AUTH_PROVIDERS, get(auth::providers_handler))
        .route(
            routes::DELETE_AUTH_PROVIDERS_PROVIDER,
            delete(auth::unlink_provider_handler),
        )
        .route(
            routes::POST_DEVICE_AUTHORIZE,
            post(device::device_authorize_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    // Admin routes (require admin role)
    let admin_only = Router::new()
        .route(
            routes::ADMIN_USERS_ID,
            get(admin::get_user_handler).patch(admin::update_user_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_admin,
        ));

    Router::new()
        .merge(public)
        .merge(optional)
        .merge(protected)
        .merge(admin_only)
        .layer(cors)
        .with_state(state)
}
