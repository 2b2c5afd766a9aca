//! Authentication middleware: the three bearer-token policies.
//!
//! Each policy resolves the `Authorization` header through the shared
//! [`AuthGate`](agentage_core::auth::AuthGate) and inserts a typed value into
//! request extensions. Handlers read it with `Extension<Identity>` or
//! `Extension<OptionalIdentity>`.

use agentage_core::auth::Identity;
use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::AppError;

/// Identity for routes behind [`optional_auth`]; `None` for anonymous requests.
#[derive(Debug, Clone)]
pub struct OptionalIdentity(pub Option<Identity>);

fn authorization(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Reject with 401 unless the token is valid and its user exists and is active.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = authorization(&request);
    let identity = state.gate.require(header.as_deref()).await?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// [`require_auth`], then 403 unless the user is an admin.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = authorization(&request);
    let identity = state.gate.require_admin(header.as_deref()).await?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Never rejects; attaches the identity when one resolves.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = authorization(&request);
    let identity = state.gate.optional(header.as_deref()).await;
    request.extensions_mut().insert(OptionalIdentity(identity));
    next.run(request).await
}
