//! Request and response bodies for the HTTP surface.
//!
//! Device flow bodies use the RFC 8628 snake_case names; account bodies use
//! camelCase like the web frontend.

use agentage_core::accounts::LinkedProvider;
use agentage_core::auth::Identity;
use agentage_core::models::{Role, UserRecord};
use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Generic `{error, message}` body for non-protocol failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Parse a JSON body that may be empty. An empty body yields `T::default()`.
pub fn parse_optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("Invalid JSON body: {e}")))
}

// =============================================================================
// Device flow
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceCodeRequest {
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceTokenRequest {
    pub device_code: Option<String>,
    pub grant_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceAuthorizeRequest {
    pub user_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorizeResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyQuery {
    pub code: Option<String>,
}

// =============================================================================
// OAuth
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthStartQuery {
    pub device_code: Option<String>,
    pub desktop: Option<String>,
    pub callback: Option<String>,
    pub link_token: Option<String>,
}

impl OAuthStartQuery {
    pub fn is_desktop(&self) -> bool {
        matches!(self.desktop.as_deref(), Some("true" | "1"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

// =============================================================================
// Accounts
// =============================================================================

/// A user as shown to its owner or an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub providers: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&UserRecord> for UserView {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            avatar: user.avatar.clone(),
            role: user.role,
            is_active: user.is_active,
            providers: user.provider_names().into_iter().map(String::from).collect(),
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: UserView,
    pub authenticated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl From<Identity> for StatusUser {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.user_id,
            email: identity.email,
            role: identity.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub authenticated: bool,
    pub user: Option<StatusUser>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<LinkedProvider>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

/// `PATCH /api/admin/users/{id}` body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserUpdate {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_parses_to_default() {
        let parsed: DeviceCodeRequest = parse_optional_json(&Bytes::new()).unwrap();
        assert!(parsed.provider.is_none());
        let parsed: DeviceCodeRequest = parse_optional_json(&Bytes::from_static(b" \n")).unwrap();
        assert!(parsed.provider.is_none());
    }

    #[test]
    fn malformed_body_is_a_validation_error() {
        let result: Result<DeviceTokenRequest, _> =
            parse_optional_json(&Bytes::from_static(b"{not json"));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn admin_update_uses_camel_case() {
        let update: AdminUserUpdate =
            serde_json::from_str(r#"{"role":"admin","isActive":false}"#).unwrap();
        assert_eq!(update.role, Some(Role::Admin));
        assert_eq!(update.is_active, Some(false));
    }

    #[test]
    fn desktop_flag_accepts_true_and_one() {
        let mut q = OAuthStartQuery::default();
        assert!(!q.is_desktop());
        q.desktop = Some("true".into());
        assert!(q.is_desktop());
        q.desktop = Some("1".into());
        assert!(q.is_desktop());
    }
}
