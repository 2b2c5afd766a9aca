//! Provider-neutral OAuth profile and the per-provider adapters that produce it.
//!
//! Each provider reports identity in its own JSON shape. The adapter structs
//! below deserialize exactly those shapes and narrow them into one
//! [`ProviderProfile`] at the boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Provider;

/// Identity asserted by an OAuth provider after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    pub provider: Provider,
    pub provider_id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    /// Provider handle, e.g. the GitHub login.
    pub username: Option<String>,
}

/// A provider response that cannot be narrowed into a profile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("No email provided by {0}")]
    MissingEmail(Provider),

    #[error("No account id provided by {0}")]
    MissingId(Provider),
}

impl ProviderProfile {
    /// Basic shape check before the profile touches the store.
    pub fn validate(&self) -> Result<(), String> {
        if self.provider_id.trim().is_empty() {
            return Err("provider id is empty".into());
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(format!("invalid email: {email}")),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// =============================================================================
// GitHub
// =============================================================================

/// `GET https://api.github.com/user`
#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub id: u64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// One entry of `GET https://api.github.com/user/emails`.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubEmail {
    pub email: String,
    pub primary: bool,
    pub verified: bool,
}

impl GithubUser {
    /// Narrow to a profile. The public profile email is often hidden, so fall
    /// back to the primary verified address, then any verified address.
    pub fn into_profile(self, emails: &[GithubEmail]) -> Result<ProviderProfile, ProfileError> {
        let email = non_empty(self.email)
            .or_else(|| {
                emails
                    .iter()
                    .find(|e| e.primary && e.verified)
                    .or_else(|| emails.iter().find(|e| e.verified))
                    .map(|e| e.email.clone())
            })
            .ok_or(ProfileError::MissingEmail(Provider::Github))?;

        Ok(ProviderProfile {
            provider: Provider::Github,
            provider_id: self.id.to_string(),
            email,
            name: non_empty(self.name).or_else(|| Some(self.login.clone())),
            avatar: non_empty(self.avatar_url),
            username: Some(self.login),
        })
    }
}

// =============================================================================
// Google
// =============================================================================

/// `GET https://openidconnect.googleapis.com/v1/userinfo`
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl TryFrom<GoogleUserInfo> for ProviderProfile {
    type Error = ProfileError;

    fn try_from(info: GoogleUserInfo) -> Result<Self, Self::Error> {
        if info.sub.is_empty() {
            return Err(ProfileError::MissingId(Provider::Google));
        }
        let email = non_empty(info.email).ok_or(ProfileError::MissingEmail(Provider::Google))?;
        Ok(ProviderProfile {
            provider: Provider::Google,
            provider_id: info.sub,
            email,
            name: non_empty(info.name),
            avatar: non_empty(info.picture),
            username: None,
        })
    }
}

// =============================================================================
// Microsoft
// =============================================================================

/// `GET https://graph.microsoft.com/v1.0/me`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftUser {
    pub id: String,
    pub display_name: Option<String>,
    pub mail: Option<String>,
    pub user_principal_name: Option<String>,
}

impl TryFrom<MicrosoftUser> for ProviderProfile {
    type Error = ProfileError;

    fn try_from(me: MicrosoftUser) -> Result<Self, Self::Error> {
        if me.id.is_empty() {
            return Err(ProfileError::MissingId(Provider::Microsoft));
        }
        let email = non_empty(me.mail)
            .or_else(|| non_empty(me.user_principal_name.clone()).filter(|upn| upn.contains('@')))
            .ok_or(ProfileError::MissingEmail(Provider::Microsoft))?;
        Ok(ProviderProfile {
            provider: Provider::Microsoft,
            provider_id: me.id,
            email,
            name: non_empty(me.display_name),
            avatar: None,
            username: me.user_principal_name,
        })
    }
}
