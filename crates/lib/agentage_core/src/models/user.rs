//! User records and their OAuth provider links.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External OAuth identity source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Github,
    Google,
    Microsoft,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Github, Provider::Google, Provider::Microsoft];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Github => "github",
            Provider::Google => "google",
            Provider::Microsoft => "microsoft",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a provider name is not one of the supported providers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Provider::Github),
            "google" => Ok(Provider::Google),
            "microsoft" => Ok(Provider::Microsoft),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Account role carried into bearer tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One external identity bound to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderLink {
    pub provider_id: String,
    pub email: String,
    pub connected_at: DateTime<Utc>,
}

/// Persisted user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    /// Always lowercase.
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub providers: BTreeMap<Provider, ProviderLink>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Whether the given external identity is the one bound under `provider`.
    pub fn has_identity(&self, provider: Provider, provider_id: &str) -> bool {
        self.providers
            .get(&provider)
            .is_some_and(|link| link.provider_id == provider_id)
    }

    /// Names of the linked providers, in stable order.
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.keys().map(Provider::as_str).collect()
    }
}

/// Partial update applied atomically by a user store.
///
/// `None` fields are left unchanged. `updated_at` defaults to the time the
/// store applies the update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub set_providers: Vec<(Provider, ProviderLink)>,
    pub unset_providers: Vec<Provider>,
}

impl UserUpdate {
    /// An update that only bumps `updated_at`.
    pub fn touched(now: DateTime<Utc>) -> Self {
        Self {
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Record a login at `now` (`lastLoginAt` and `updatedAt`).
    pub fn login(now: DateTime<Utc>) -> Self {
        Self {
            last_login_at: Some(now),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    pub fn set_provider(mut self, provider: Provider, link: ProviderLink) -> Self {
        self.set_providers.push((provider, link));
        self
    }

    pub fn unset_provider(mut self, provider: Provider) -> Self {
        self.unset_providers.push(provider);
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    /// Apply this update to an in-memory record.
    ///
    /// Stores call this after taking their lock so both backends share one
    /// definition of the merge.
    pub fn apply_to(&self, user: &mut UserRecord, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            user.name = Some(name.clone());
        }
        if let Some(avatar) = &self.avatar {
            user.avatar = Some(avatar.clone());
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
        if let Some(at) = self.last_login_at {
            user.last_login_at = Some(at);
        }
        for (provider, link) in &self.set_providers {
            let mut link = link.clone();
            link.email = normalize_email(&link.email);
            user.providers.insert(*provider, link);
        }
        for provider in &self.unset_providers {
            user.providers.remove(provider);
        }
        user.updated_at = self.updated_at.unwrap_or(now);
    }
}

/// Canonical email form used for every write and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
