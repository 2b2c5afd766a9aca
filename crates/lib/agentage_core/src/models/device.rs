//! Device authorization records and RFC 8628 response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::{Provider, UserRecord};

/// Lifecycle state of a device code at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCodeState {
    /// Created, not yet bound to a user.
    Pending,
    /// Bound to a user; pollable until expiry.
    Authorized,
    /// Past `expires_at`; terminal regardless of authorization.
    Expired,
}

/// Persisted device code record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCodeRecord {
    pub id: String,
    /// CLI-held secret; compared byte-exact.
    pub device_code: String,
    /// Canonical `XXXX-XXXX` form.
    pub user_code: String,
    pub provider: Provider,
    pub expires_at: DateTime<Utc>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub access_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeviceCodeRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> DeviceCodeState {
        if self.is_expired_at(now) {
            DeviceCodeState::Expired
        } else if self.authorized_at.is_some() {
            DeviceCodeState::Authorized
        } else {
            DeviceCodeState::Pending
        }
    }

    /// The grant fields, if all three were set by authorization.
    pub fn grant(&self) -> Option<DeviceGrant> {
        match (&self.authorized_at, &self.user_id, &self.access_token) {
            (Some(authorized_at), Some(user_id), Some(access_token)) => Some(DeviceGrant {
                user_id: user_id.clone(),
                access_token: access_token.clone(),
                authorized_at: *authorized_at,
            }),
            _ => None,
        }
    }

    /// Whole seconds until expiry, floored at zero.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// Fields written together, exactly once, when a human authorizes a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGrant {
    pub user_id: String,
    pub access_token: String,
    pub authorized_at: DateTime<Utc>,
}

/// Body of `POST /device/code` (RFC 8628 §3.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_in: i64,
    pub interval: i64,
}

/// Public profile returned alongside a device-flow token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceUser {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl From<&UserRecord> for DeviceUser {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

/// Successful token response for the device flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: DeviceUser,
}

impl DeviceTokenResponse {
    pub fn bearer(access_token: String, expires_in: i64, user: &UserRecord) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            user: DeviceUser::from(user),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn record(expires_in: Duration, authorized: bool) -> DeviceCodeRecord {
        let now = Utc::now();
        DeviceCodeRecord {
            id: "d1".into(),
            device_code: "secret".into(),
            user_code: "ABCD-EFGH".into(),
            provider: Provider::Github,
            expires_at: now + expires_in,
            authorized_at: authorized.then_some(now),
            user_id: authorized.then(|| "u1".to_string()),
            access_token: authorized.then(|| "tok".to_string()),
            created_at: now,
        }
    }

    #[test]
    fn state_follows_expiry_then_authorization() {
        let now = Utc::now();
        assert_eq!(
            record(Duration::minutes(5), false).state_at(now),
            DeviceCodeState::Pending
        );
        assert_eq!(
            record(Duration::minutes(5), true).state_at(now),
            DeviceCodeState::Authorized
        );
        assert_eq!(
            record(Duration::minutes(-1), true).state_at(now),
            DeviceCodeState::Expired
        );
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let rec = record(Duration::minutes(1), false);
        assert!(rec.is_expired_at(rec.expires_at));
        assert_eq!(rec.remaining_secs(rec.expires_at + Duration::seconds(3)), 0);
    }

    #[test]
    fn grant_requires_all_fields() {
        let mut rec = record(Duration::minutes(5), true);
        assert!(rec.grant().is_some());
        rec.access_token = None;
        assert!(rec.grant().is_none());
    }

    #[test]
    fn token_response_omits_missing_profile_fields() {
        let body = DeviceTokenResponse {
            access_token: "t".into(),
            token_type: "Bearer".into(),
            expires_in: 60,
            user: DeviceUser {
                id: "u1".into(),
                email: "dev@x.com".into(),
                name: None,
                avatar: None,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json["user"].get("name").is_none());
        assert_eq!(json["token_type"], "Bearer");
    }
}
