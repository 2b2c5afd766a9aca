//! RFC 8628 device authorization grant.
//!
//! A CLI requests a device code, shows the short user code to a human, and
//! polls while the human signs in through a browser and authorizes that code.
//!
//! Record lifecycle:
//!
//! ```text
//! PENDING ──authorize──▶ AUTHORIZED
//!    │                       │
//!    └──── now >= expiresAt ─┴──▶ EXPIRED
//! ```
//!
//! Authorization happens at most once, as a conditional update in the store.
//! Polling never mutates a record; an authorized record keeps returning the
//! same token until it expires.

pub mod codes;
pub mod limiter;
pub mod protocol;

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub use codes::{generate_device_code, generate_user_code, normalize_user_code};
pub use limiter::PollLimiter;
pub use protocol::{PollDisposition, ProtocolError, ProtocolErrorCode};

use crate::auth::{TokenError, TokenPayload, TokenService};
use crate::models::{
    DeviceCodeRecord, DeviceCodeResponse, DeviceGrant, DeviceTokenResponse, Provider,
};
use crate::store::{DeviceCodeStore, StoreError, UserStore};
use crate::uuid::new_record_id;

/// Lifetime of a device code.
pub const DEVICE_CODE_TTL_SECS: i64 = 900;

/// Advertised minimum seconds between polls.
pub const POLL_INTERVAL_SECS: i64 = 5;

/// User code collisions tolerated before giving up on a create.
const USER_CODE_ATTEMPTS: usize = 5;

/// Device flow failures.
#[derive(Debug, Error)]
pub enum DeviceFlowError {
    /// Reported to the client verbatim as an RFC 8628 error body.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Device flow configuration error: {0}")]
    Configuration(String),

    #[error("Could not allocate a unique user code")]
    CodeSpaceExhausted,

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A user code that exists, is unexpired and has not been used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedUserCode {
    pub valid: bool,
    pub user_code: String,
    pub expires_in: i64,
}

/// Device flow state machine over the device code and user stores.
#[derive(Clone)]
pub struct DeviceAuthService {
    codes: Arc<dyn DeviceCodeStore>,
    users: Arc<dyn UserStore>,
    tokens: Arc<TokenService>,
    verification_uri: Url,
    ttl: Duration,
}

impl DeviceAuthService {
    /// `public_base` is the externally reachable origin; the verification page
    /// lives at `{public_base}/device`.
    pub fn new(
        codes: Arc<dyn DeviceCodeStore>,
        users: Arc<dyn UserStore>,
        tokens: Arc<TokenService>,
        public_base: &str,
    ) -> Result<Self, DeviceFlowError> {
        let raw = format!("{}/device", public_base.trim_end_matches('/'));
        let verification_uri = Url::parse(&raw)
            .map_err(|e| DeviceFlowError::Configuration(format!("invalid public URL {raw}: {e}")))?;
        Ok(Self {
            codes,
            users,
            tokens,
            verification_uri,
            ttl: Duration::seconds(DEVICE_CODE_TTL_SECS),
        })
    }

    pub fn verification_uri(&self) -> &str {
        self.verification_uri.as_str()
    }

    fn verification_uri_complete(&self, user_code: &str) -> String {
        let mut url = self.verification_uri.clone();
        url.query_pairs_mut().append_pair("code", user_code);
        url.into()
    }

    /// Start a new device authorization. Only GitHub is offered to CLIs.
    pub async fn create_device_code(
        &self,
        provider: Provider,
    ) -> Result<DeviceCodeResponse, DeviceFlowError> {
        if provider != Provider::Github {
            return Err(ProtocolError::invalid_request(
                "Invalid provider specified. Only \"github\" is supported.",
            )
            .into());
        }

        for attempt in 1..=USER_CODE_ATTEMPTS {
            let now = Utc::now();
            let record = DeviceCodeRecord {
                id: new_record_id(),
                device_code: generate_device_code(),
                user_code: generate_user_code(),
                provider,
                expires_at: now + self.ttl,
                authorized_at: None,
                user_id: None,
                access_token: None,
                created_at: now,
            };

            match self.codes.insert(record.clone()).await {
                Ok(()) => {
                    info!(user_code = %record.user_code, %provider, expires_at = %record.expires_at, "device code created");
                    return Ok(DeviceCodeResponse {
                        verification_uri: self.verification_uri.to_string(),
                        verification_uri_complete: self.verification_uri_complete(&record.user_code),
                        device_code: record.device_code,
                        user_code: record.user_code,
                        expires_in: self.ttl.num_seconds(),
                        interval: POLL_INTERVAL_SECS,
                    });
                }
                Err(StoreError::Conflict(_)) => {
                    debug!(attempt, "user code collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(DeviceFlowError::CodeSpaceExhausted)
    }

    /// Live record for a human-typed user code. Expired records read as absent.
    pub async fn get_by_user_code(
        &self,
        raw_user_code: &str,
    ) -> Result<Option<DeviceCodeRecord>, DeviceFlowError> {
        let user_code = normalize_user_code(raw_user_code);
        let now = Utc::now();
        Ok(self
            .codes
            .find_by_user_code(&user_code)
            .await?
            .filter(|record| !record.is_expired_at(now)))
    }

    /// Read-only check used by the web page before it starts an OAuth login.
    ///
    /// Unknown, expired and already-used codes fail with distinct errors.
    pub async fn verify_user_code(
        &self,
        raw_user_code: &str,
    ) -> Result<VerifiedUserCode, DeviceFlowError> {
        let user_code = normalize_user_code(raw_user_code);
        let record = self
            .codes
            .find_by_user_code(&user_code)
            .await?
            .ok_or_else(|| ProtocolError::invalid_grant("Invalid or unknown device code"))?;

        let now = Utc::now();
        if record.is_expired_at(now) {
            return Err(ProtocolError::new(
                ProtocolErrorCode::ExpiredToken,
                "The device code has expired",
            )
            .into());
        }
        if record.authorized_at.is_some() {
            return Err(ProtocolError::access_denied("The device code has already been used").into());
        }

        Ok(VerifiedUserCode {
            valid: true,
            expires_in: record.remaining_secs(now),
            user_code: record.user_code,
        })
    }

    /// Bind a pending code to `user_id` and mint its token.
    ///
    /// `Ok(None)` when the code is unknown, expired, already authorized, or
    /// lost a concurrent authorization. The first binding is never overwritten.
    pub async fn authorize(
        &self,
        raw_user_code: &str,
        user_id: &str,
    ) -> Result<Option<DeviceTokenResponse>, DeviceFlowError> {
        let user_code = normalize_user_code(raw_user_code);
        let Some(record) = self.codes.find_by_user_code(&user_code).await? else {
            warn!(%user_code, "device code not found for authorization");
            return Ok(None);
        };

        let now = Utc::now();
        if record.is_expired_at(now) {
            warn!(%user_code, "device code expired");
            return Ok(None);
        }
        if record.authorized_at.is_some() {
            warn!(%user_code, "device code already authorized");
            return Ok(None);
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| DeviceFlowError::UserNotFound(user_id.to_string()))?;

        let access_token = self.tokens.issue(&TokenPayload {
            user_id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
        })?;

        let grant = DeviceGrant {
            user_id: user.id.clone(),
            access_token: access_token.clone(),
            authorized_at: now,
        };
        if !self.codes.authorize(&record.device_code, &grant).await? {
            warn!(%user_code, "device code authorized concurrently");
            return Ok(None);
        }

        info!(%user_code, user_id = %user.id, "device code authorized");
        Ok(Some(DeviceTokenResponse::bearer(
            access_token,
            self.tokens.expires_in_secs(),
            &user,
        )))
    }

    /// Poll for the token bound to `device_code`.
    ///
    /// `Ok(None)` means `authorization_pending`. Unknown and expired codes are
    /// protocol errors. Never mutates the record.
    pub async fn poll_for_token(
        &self,
        device_code: &str,
    ) -> Result<Option<DeviceTokenResponse>, DeviceFlowError> {
        let record = self
            .codes
            .find_by_device_code(device_code)
            .await?
            .ok_or_else(|| ProtocolError::invalid_grant("Invalid or unknown device code"))?;

        if record.is_expired_at(Utc::now()) {
            return Err(ProtocolError::expired_token().into());
        }

        let Some(grant) = record.grant() else {
            return Ok(None);
        };

        let user = self
            .users
            .find_by_id(&grant.user_id)
            .await?
            .ok_or_else(|| ProtocolError::server_error("User not found"))?;

        debug!(user_id = %user.id, user_code = %record.user_code, "token retrieved via device code");
        Ok(Some(DeviceTokenResponse::bearer(
            grant.access_token,
            self.tokens.expires_in_secs(),
            &user,
        )))
    }

    /// Delete expired records. Every read re-checks expiry, so this is hygiene.
    pub async fn cleanup_expired(&self) -> Result<u64, DeviceFlowError> {
        let removed = self.codes.delete_expired(Utc::now()).await?;
        if removed > 0 {
            info!(count = removed, "cleaned up expired device codes");
        }
        Ok(removed)
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(
        self: &Arc<Self>,
        every: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = service.cleanup_expired().await {
                    warn!(error = %e, "device code cleanup failed");
                }
            }
        })
    }
}
