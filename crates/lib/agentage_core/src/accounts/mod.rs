//! Account linking: reconcile OAuth profiles with stored users.
//!
//! One real-world person maps to one user record. A login through a second
//! provider whose email matches an existing user is linked to that user
//! automatically; explicit linking and unlinking go through
//! [`AccountLinker::link_provider`] and [`AccountLinker::unlink_provider`].

pub mod profile;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

pub use profile::{ProfileError, ProviderProfile};

use crate::models::{Provider, ProviderLink, Role, UserRecord, UserUpdate, normalize_email};
use crate::store::{StoreError, UserStore};
use crate::uuid::new_record_id;

/// Account linking failures. All but `Store` are business-rule violations.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("This provider is already linked to another account")]
    ProviderConflict,

    #[error("Provider already linked to this account")]
    AlreadyLinked,

    #[error("Provider not linked to this account")]
    NotLinked,

    #[error("Cannot unlink last provider. Link another provider first.")]
    LastProvider,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid provider profile: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A linked provider as listed to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedProvider {
    pub name: Provider,
    pub email: String,
    pub connected_at: DateTime<Utc>,
}

/// Stateless linking engine over a shared user store.
#[derive(Clone)]
pub struct AccountLinker {
    users: Arc<dyn UserStore>,
}

impl AccountLinker {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    /// Find the user behind `profile`, creating one on first login.
    ///
    /// Lookup order: email, then `(provider, providerId)`. A matching email
    /// with a new or different identity for this provider is auto-linked.
    pub async fn resolve_or_create(
        &self,
        profile: &ProviderProfile,
    ) -> Result<UserRecord, LinkError> {
        profile.validate().map_err(LinkError::Validation)?;
        let email = normalize_email(&profile.email);

        if let Some(user) = self.users.find_by_email(&email).await? {
            return self.login_existing(user, profile, &email).await;
        }

        // The provider may now report a different address for a known identity.
        if let Some(user) = self
            .users
            .find_by_provider_id(profile.provider, &profile.provider_id)
            .await?
        {
            debug!(user_id = %user.id, provider = %profile.provider, "identity matched under a changed email");
            return self.login_existing(user, profile, &email).await;
        }

        let now = Utc::now();
        match self.users.create(new_user(profile, &email, now)).await {
            Ok(user) => {
                info!(user_id = %user.id, provider = %profile.provider, "new user created");
                Ok(user)
            }
            Err(StoreError::Conflict(_)) => {
                // A concurrent first login for the same email won the insert.
                let user = self
                    .users
                    .find_by_email(&email)
                    .await?
                    .ok_or(LinkError::ProviderConflict)?;
                self.login_existing(user, profile, &email).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn login_existing(
        &self,
        user: UserRecord,
        profile: &ProviderProfile,
        email: &str,
    ) -> Result<UserRecord, LinkError> {
        let now = Utc::now();
        if user.has_identity(profile.provider, &profile.provider_id) {
            let user = self.users.update(&user.id, UserUpdate::login(now)).await?;
            info!(user_id = %user.id, provider = %profile.provider, "existing user logged in");
            return Ok(user);
        }

        let update = UserUpdate::login(now).set_provider(
            profile.provider,
            ProviderLink {
                provider_id: profile.provider_id.clone(),
                email: email.to_string(),
                connected_at: now,
            },
        );
        let user = self
            .users
            .update(&user.id, update)
            .await
            .map_err(map_update_error)?;
        info!(user_id = %user.id, provider = %profile.provider, "provider auto-linked to existing user");
        Ok(user)
    }

    /// Attach a provider the signed-in user explicitly asked to link.
    pub async fn link_provider(
        &self,
        user_id: &str,
        profile: &ProviderProfile,
    ) -> Result<UserRecord, LinkError> {
        profile.validate().map_err(LinkError::Validation)?;

        if let Some(owner) = self
            .users
            .find_by_provider_id(profile.provider, &profile.provider_id)
            .await?
        {
            if owner.id != user_id {
                return Err(LinkError::ProviderConflict);
            }
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(LinkError::UserNotFound)?;
        if user.providers.contains_key(&profile.provider) {
            return Err(LinkError::AlreadyLinked);
        }

        let now = Utc::now();
        let update = UserUpdate::touched(now).set_provider(
            profile.provider,
            ProviderLink {
                provider_id: profile.provider_id.clone(),
                email: normalize_email(&profile.email),
                connected_at: now,
            },
        );
        let user = self
            .users
            .update(user_id, update)
            .await
            .map_err(map_update_error)?;
        info!(user_id, provider = %profile.provider, "provider linked to user");
        Ok(user)
    }

    /// Remove a provider link. The last remaining provider cannot be removed.
    pub async fn unlink_provider(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<UserRecord, LinkError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(LinkError::UserNotFound)?;
        if !user.providers.contains_key(&provider) {
            return Err(LinkError::NotLinked);
        }
        if user.providers.len() <= 1 {
            return Err(LinkError::LastProvider);
        }

        let user = self
            .users
            .update(user_id, UserUpdate::touched(Utc::now()).unset_provider(provider))
            .await
            .map_err(map_update_error)?;
        info!(user_id, %provider, "provider unlinked from user");
        Ok(user)
    }

    /// Linked providers for `user_id`; empty for an unknown user.
    pub async fn providers(&self, user_id: &str) -> Result<Vec<LinkedProvider>, LinkError> {
        let Some(user) = self.users.find_by_id(user_id).await? else {
            return Ok(Vec::new());
        };
        Ok(user
            .providers
            .into_iter()
            .map(|(name, link)| LinkedProvider {
                name,
                email: link.email,
                connected_at: link.connected_at,
            })
            .collect())
    }
}

fn new_user(profile: &ProviderProfile, email: &str, now: DateTime<Utc>) -> UserRecord {
    let name = profile
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .or_else(|| email.split('@').next().map(str::to_string));
    UserRecord {
        id: new_record_id(),
        email: email.to_string(),
        name,
        avatar: profile.avatar.clone(),
        role: Role::User,
        is_active: true,
        providers: [(
            profile.provider,
            ProviderLink {
                provider_id: profile.provider_id.clone(),
                email: email.to_string(),
                connected_at: now,
            },
        )]
        .into_iter()
        .collect(),
        created_at: now,
        updated_at: now,
        last_login_at: Some(now),
    }
}

fn map_update_error(e: StoreError) -> LinkError {
    match e {
        StoreError::Conflict(_) => LinkError::ProviderConflict,
        StoreError::Invariant(_) => LinkError::LastProvider,
        StoreError::NotFound(_) => LinkError::UserNotFound,
        other => LinkError::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::memory::MemoryUserStore;

    fn linker() -> AccountLinker {
        AccountLinker::new(Arc::new(MemoryUserStore::new()))
    }

    fn profile(provider: Provider, provider_id: &str, email: &str) -> ProviderProfile {
        ProviderProfile {
            provider,
            provider_id: provider_id.into(),
            email: email.into(),
            name: None,
            avatar: None,
            username: None,
        }
    }

    #[tokio::test]
    async fn repeated_login_returns_same_user_and_advances_login_time() {
        let linker = linker();
        let p = profile(Provider::Github, "X", "a@b.com");

        let first = linker.resolve_or_create(&p).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = linker.resolve_or_create(&p).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.last_login_at > first.last_login_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[tokio::test]
    async fn new_user_gets_defaults() {
        let user = linker()
            .resolve_or_create(&profile(Provider::Github, "7", "Dev@X.com"))
            .await
            .unwrap();
        assert_eq!(user.email, "dev@x.com");
        assert_eq!(user.name.as_deref(), Some("dev"));
        assert_eq!(user.role, Role::User);
        assert!(user.is_active);
        assert_eq!(user.provider_names(), vec!["github"]);
        assert_eq!(user.last_login_at, Some(user.created_at));
    }

    #[tokio::test]
    async fn second_provider_with_same_email_is_auto_linked() {
        let linker = linker();
        let gh = linker
            .resolve_or_create(&profile(Provider::Github, "1", "dev@x.com"))
            .await
            .unwrap();
        let google = linker
            .resolve_or_create(&profile(Provider::Google, "g-9", "DEV@x.com"))
            .await
            .unwrap();
        assert_eq!(gh.id, google.id);
        assert_eq!(google.provider_names(), vec!["github", "google"]);
    }

    #[tokio::test]
    async fn known_identity_under_new_email_is_a_returning_login() {
        let linker = linker();
        let first = linker
            .resolve_or_create(&profile(Provider::Github, "1", "old@x.com"))
            .await
            .unwrap();
        let again = linker
            .resolve_or_create(&profile(Provider::Github, "1", "new@x.com"))
            .await
            .unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(again.email, "old@x.com");
    }

    #[tokio::test]
    async fn link_rejects_identity_owned_by_someone_else() {
        let linker = linker();
        linker
            .resolve_or_create(&profile(Provider::Github, "1", "a@x.com"))
            .await
            .unwrap();
        let b = linker
            .resolve_or_create(&profile(Provider::Google, "2", "b@x.com"))
            .await
            .unwrap();

        let result = linker
            .link_provider(&b.id, &profile(Provider::Github, "1", "b@x.com"))
            .await;
        assert!(matches!(result, Err(LinkError::ProviderConflict)));
    }

    #[tokio::test]
    async fn link_rejects_already_linked_provider() {
        let linker = linker();
        let user = linker
            .resolve_or_create(&profile(Provider::Github, "1", "a@x.com"))
            .await
            .unwrap();
        let result = linker
            .link_provider(&user.id, &profile(Provider::Github, "other", "a@x.com"))
            .await;
        assert!(matches!(result, Err(LinkError::AlreadyLinked)));

        let linked = linker
            .link_provider(&user.id, &profile(Provider::Microsoft, "m-1", "A@work.com"))
            .await
            .unwrap();
        assert_eq!(linked.providers[&Provider::Microsoft].email, "a@work.com");
    }

    #[tokio::test]
    async fn last_provider_cannot_be_unlinked() {
        let linker = linker();
        let user = linker
            .resolve_or_create(&profile(Provider::Github, "1", "a@x.com"))
            .await
            .unwrap();

        let result = linker.unlink_provider(&user.id, Provider::Github).await;
        assert!(matches!(result, Err(LinkError::LastProvider)));

        let unchanged = linker.users().find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(unchanged, user);
    }

    #[tokio::test]
    async fn unlink_removes_one_of_several() {
        let linker = linker();
        let user = linker
            .resolve_or_create(&profile(Provider::Github, "1", "a@x.com"))
            .await
            .unwrap();
        linker
            .resolve_or_create(&profile(Provider::Google, "g", "a@x.com"))
            .await
            .unwrap();

        assert!(matches!(
            linker.unlink_provider(&user.id, Provider::Microsoft).await,
            Err(LinkError::NotLinked)
        ));
        let after = linker
            .unlink_provider(&user.id, Provider::Github)
            .await
            .unwrap();
        assert_eq!(after.provider_names(), vec!["google"]);

        let listed = linker.providers(&user.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, Provider::Google);
        assert!(linker.providers("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_profile_is_rejected_before_store() {
        let result = linker()
            .resolve_or_create(&profile(Provider::Github, "1", "not-an-email"))
            .await;
        assert!(matches!(result, Err(LinkError::Validation(_))));
    }
}
