//! RFC 8628 device authorization endpoints.
//!
//! `code` and `token` are called by the CLI; `verify` and `authorize` by the
//! web page the human opens. Every failure is an RFC 8628 error body.

use agentage_core::auth::Identity;
use agentage_core::device::{DeviceFlowError, ProtocolError, ProtocolErrorCode, VerifiedUserCode};
use agentage_core::models::{DeviceCodeResponse, DeviceTokenResponse, Provider};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use tracing::debug;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{
    DeviceAuthorizeRequest, DeviceAuthorizeResponse, DeviceCodeRequest, DeviceTokenRequest,
    VerifyQuery, parse_optional_json,
};

/// The only `grant_type` accepted on the token endpoint.
pub const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

fn required(value: Option<String>, field: &str) -> Result<String, ProtocolError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProtocolError::invalid_request(format!("{field} is required")))
}

/// `POST /api/auth/device/code` starts a device login. The body is optional;
/// `provider` defaults to `github`.
pub async fn device_code_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<DeviceCodeResponse>> {
    let req: DeviceCodeRequest = parse_optional_json(&body)?;
    let provider = match req.provider.as_deref() {
        None => Provider::Github,
        Some(raw) => raw.parse::<Provider>().map_err(|_| {
            ProtocolError::invalid_request("Invalid provider specified. Only \"github\" is supported.")
        })?,
    };
    let resp = state.devices.create_device_code(provider).await?;
    Ok(Json(resp))
}

/// `POST /api/auth/device/token` polls for the token.
///
/// Pending codes answer 400 `authorization_pending`, or `slow_down` when
/// polled faster than the advertised interval. Unknown, expired and granted
/// codes answer their terminal result whatever the polling rate.
pub async fn device_token_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<DeviceTokenResponse>> {
    let req: DeviceTokenRequest = parse_optional_json(&body)?;
    if let Some(grant_type) = req.grant_type.as_deref() {
        if grant_type != DEVICE_GRANT_TYPE {
            return Err(ProtocolError::invalid_request(format!(
                "Unsupported grant_type: {grant_type}"
            ))
            .into());
        }
    }
    let device_code = required(req.device_code, "device_code")?;

    match state.devices.poll_for_token(&device_code).await? {
        Some(token) => {
            state.poll_limiter.forget(&device_code);
            Ok(Json(token))
        }
        None if !state.poll_limiter.check(&device_code) => {
            debug!("device token polled too fast");
            Err(ProtocolError::slow_down().into())
        }
        None => Err(ProtocolError::authorization_pending().into()),
    }
}

/// `POST /api/auth/device/authorize` binds a user code to the signed-in user.
pub async fn device_authorize_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> AppResult<Json<DeviceAuthorizeResponse>> {
    let req: DeviceAuthorizeRequest = parse_optional_json(&body)?;
    let user_code = required(req.user_code, "user_code")?;

    match state.devices.authorize(&user_code, &identity.user_id).await? {
        Some(_) => Ok(Json(DeviceAuthorizeResponse {
            success: true,
            message: "Device authorized successfully. You can return to your terminal.".into(),
        })),
        None => Err(ProtocolError::invalid_grant("Invalid, expired, or already used code").into()),
    }
}

/// `GET /api/auth/device/verify?code=` checks a user code without touching it.
pub async fn device_verify_handler(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> AppResult<Json<VerifiedUserCode>> {
    let code = required(query.code, "code")?;
    match state.devices.verify_user_code(&code).await {
        Ok(verified) => Ok(Json(verified)),
        Err(DeviceFlowError::Protocol(p)) if p.error == ProtocolErrorCode::InvalidGrant => {
            Err(AppError::protocol(StatusCode::NOT_FOUND, p))
        }
        Err(e) => Err(e.into()),
    }
}
