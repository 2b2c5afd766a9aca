//! Per-request credential check.
//!
//! The gate turns an `Authorization` header into a typed [`Identity`]. It
//! verifies the token and then re-reads the user record on every call, so a
//! deleted or deactivated account cannot keep using a still-valid token.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::jwt::{TokenService, TokenVerification};
use crate::models::Role;
use crate::store::{StoreError, UserStore};

/// Identity resolved for an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub is_authenticated: bool,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Why a request was not admitted.
#[derive(Debug, Error)]
pub enum GateRejection {
    #[error("No authentication token provided")]
    MissingToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Authentication token is invalid")]
    InvalidToken,

    #[error("User account no longer exists")]
    UserNotFound,

    #[error("User account is disabled")]
    Inactive,

    #[error("Admin access required")]
    Forbidden,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Token + live-record check shared by all three request policies.
#[derive(Clone)]
pub struct AuthGate {
    tokens: Arc<TokenService>,
    users: Arc<dyn UserStore>,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenService>, users: Arc<dyn UserStore>) -> Self {
        Self { tokens, users }
    }

    /// Extract the token from a `Bearer <token>` header value.
    pub fn bearer_token(header: Option<&str>) -> Option<&str> {
        let mut parts = header?.split(' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
            _ => None,
        }
    }

    /// Admit only requests carrying a valid token for an existing, active user.
    pub async fn require(&self, authorization: Option<&str>) -> Result<Identity, GateRejection> {
        let token = Self::bearer_token(authorization).ok_or(GateRejection::MissingToken)?;

        let payload = match self.tokens.verify(token) {
            TokenVerification::Valid(payload) => payload,
            TokenVerification::Invalid { expired: true, .. } => {
                return Err(GateRejection::ExpiredToken);
            }
            TokenVerification::Invalid { .. } => return Err(GateRejection::InvalidToken),
        };

        let user = self
            .users
            .find_by_id(&payload.user_id)
            .await?
            .ok_or(GateRejection::UserNotFound)?;

        if !user.is_active {
            debug!(user_id = %user.id, "rejecting token for inactive user");
            return Err(GateRejection::Inactive);
        }

        Ok(Identity {
            user_id: user.id,
            email: user.email,
            role: user.role,
            is_authenticated: true,
        })
    }

    /// Like [`require`](Self::require), then additionally demand the admin role.
    pub async fn require_admin(
        &self,
        authorization: Option<&str>,
    ) -> Result<Identity, GateRejection> {
        let identity = self.require(authorization).await?;
        if !identity.is_admin() {
            return Err(GateRejection::Forbidden);
        }
        Ok(identity)
    }

    /// Never blocks: any failure yields an anonymous request.
    pub async fn optional(&self, authorization: Option<&str>) -> Option<Identity> {
        match self.require(authorization).await {
            Ok(identity) => Some(identity),
            Err(GateRejection::Store(e)) => {
                warn!(error = %e, "optional auth lookup failed, continuing anonymously");
                None
            }
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::auth::TokenPayload;
    use crate::models::{Provider, ProviderLink, UserRecord, UserUpdate};
    use crate::store::memory::MemoryUserStore;

    async fn setup(role: Role) -> (AuthGate, Arc<MemoryUserStore>, TokenService, UserRecord) {
        let users = Arc::new(MemoryUserStore::new());
        let tokens = TokenService::new("gate-secret", "1h").unwrap();
        let now = Utc::now();
        let user = users
            .create(UserRecord {
                id: "u-1".into(),
                email: "dev@x.com".into(),
                name: None,
                avatar: None,
                role,
                is_active: true,
                providers: [(
                    Provider::Github,
                    ProviderLink {
                        provider_id: "42".into(),
                        email: "dev@x.com".into(),
                        connected_at: now,
                    },
                )]
                .into_iter()
                .collect(),
                created_at: now,
                updated_at: now,
                last_login_at: Some(now),
            })
            .await
            .unwrap();
        let gate = AuthGate::new(Arc::new(tokens.clone()), users.clone());
        (gate, users, tokens, user)
    }

    fn header_for(tokens: &TokenService, user: &UserRecord) -> String {
        let token = tokens
            .issue(&TokenPayload {
                user_id: user.id.clone(),
                email: user.email.clone(),
                role: user.role,
            })
            .unwrap();
        format!("Bearer {token}")
    }

    #[test]
    fn bearer_token_requires_exact_scheme() {
        assert_eq!(AuthGate::bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(AuthGate::bearer_token(Some("bearer abc")), None);
        assert_eq!(AuthGate::bearer_token(Some("Bearer a b")), None);
        assert_eq!(AuthGate::bearer_token(Some("Bearer ")), None);
        assert_eq!(AuthGate::bearer_token(None), None);
    }

    #[tokio::test]
    async fn require_attaches_identity_for_live_user() {
        let (gate, _users, tokens, user) = setup(Role::User).await;
        let identity = gate.require(Some(header_for(&tokens, &user).as_str())).await.unwrap();
        assert_eq!(identity.user_id, "u-1");
        assert_eq!(identity.email, "dev@x.com");
        assert!(identity.is_authenticated);
    }

    #[tokio::test]
    async fn require_rejects_missing_invalid_and_expired() {
        let (gate, _users, tokens, user) = setup(Role::User).await;
        assert!(matches!(
            gate.require(None).await,
            Err(GateRejection::MissingToken)
        ));
        assert!(matches!(
            gate.require(Some("Bearer nope")).await,
            Err(GateRejection::InvalidToken)
        ));
        let expired = tokens
            .issue_with_ttl(
                &TokenPayload {
                    user_id: user.id.clone(),
                    email: user.email.clone(),
                    role: user.role,
                },
                Duration::hours(-2),
            )
            .unwrap();
        assert!(matches!(
            gate.require(Some(format!("Bearer {expired}").as_str())).await,
            Err(GateRejection::ExpiredToken)
        ));
    }

    #[tokio::test]
    async fn vanished_or_disabled_user_is_rejected() {
        let (gate, users, tokens, user) = setup(Role::User).await;
        let header = header_for(&tokens, &user);

        users
            .update(&user.id, UserUpdate::touched(Utc::now()).active(false))
            .await
            .unwrap();
        assert!(matches!(
            gate.require(Some(header.as_str())).await,
            Err(GateRejection::Inactive)
        ));

        let ghost = UserRecord {
            id: "ghost".into(),
            ..user.clone()
        };
        assert!(matches!(
            gate.require(Some(header_for(&tokens, &ghost).as_str())).await,
            Err(GateRejection::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn require_admin_checks_role() {
        let (gate, _users, tokens, user) = setup(Role::User).await;
        assert!(matches!(
            gate.require_admin(Some(header_for(&tokens, &user).as_str())).await,
            Err(GateRejection::Forbidden)
        ));

        let (gate, _users, tokens, admin) = setup(Role::Admin).await;
        let identity = gate
            .require_admin(Some(header_for(&tokens, &admin).as_str()))
            .await
            .unwrap();
        assert!(identity.is_admin());
    }

    #[tokio::test]
    async fn optional_never_fails() {
        let (gate, _users, tokens, user) = setup(Role::User).await;
        assert!(gate.optional(None).await.is_none());
        assert!(gate.optional(Some("Bearer junk")).await.is_none());
        assert!(gate
            .optional(Some(header_for(&tokens, &user).as_str()))
            .await
            .is_some());
    }
}
