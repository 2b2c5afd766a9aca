//! In-process stores for tests and single-node development.
//!
//! Data is lost on restart. Uniqueness and the authorize compare-and-set hold
//! under concurrent use from many tasks.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use tracing::debug;

use super::{DeviceCodeStore, StoreError, StoreResult, UserStore};
use crate::models::{
    DeviceCodeRecord, DeviceGrant, Provider, UserRecord, UserUpdate, normalize_email,
};

// =============================================================================
// Users
// =============================================================================

/// User store backed by a single lock-guarded map keyed by id.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// First identity on `user` already bound to some other record, if any.
fn identity_taken_by_other(
    users: &HashMap<String, UserRecord>,
    user: &UserRecord,
) -> Option<(Provider, String)> {
    user.providers.iter().find_map(|(provider, link)| {
        users
            .values()
            .any(|other| other.id != user.id && other.has_identity(*provider, &link.provider_id))
            .then(|| (*provider, link.provider_id.clone()))
    })
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let email = normalize_email(email);
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> StoreResult<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.has_identity(provider, provider_id))
            .cloned())
    }

    async fn create(&self, mut user: UserRecord) -> StoreResult<UserRecord> {
        user.email = normalize_email(&user.email);
        for link in user.providers.values_mut() {
            link.email = normalize_email(&link.email);
        }

        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("user id {}", user.id)));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!("email {}", user.email)));
        }
        if let Some((provider, provider_id)) = identity_taken_by_other(&users, &user) {
            return Err(StoreError::Conflict(format!(
                "identity {provider}:{provider_id}"
            )));
        }

        users.insert(user.id.clone(), user.clone());
        debug!(user_id = %user.id, "user created");
        Ok(user)
    }

    async fn update(&self, id: &str, update: UserUpdate) -> StoreResult<UserRecord> {
        let mut users = self.users.write().await;
        let mut next = users
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;

        update.apply_to(&mut next, Utc::now());

        if next.providers.is_empty() {
            return Err(StoreError::Invariant(format!(
                "user {id} would have no linked providers"
            )));
        }
        if let Some((provider, provider_id)) = identity_taken_by_other(&users, &next) {
            return Err(StoreError::Conflict(format!(
                "identity {provider}:{provider_id}"
            )));
        }

        users.insert(id.to_string(), next.clone());
        Ok(next)
    }
}

// =============================================================================
// Device codes
// =============================================================================

/// Device code store keyed by device code with a user-code index.
///
/// Lock order is always index first, records second.
#[derive(Debug, Default)]
pub struct MemoryDeviceCodeStore {
    records: DashMap<String, DeviceCodeRecord>,
    by_user_code: DashMap<String, String>,
}

impl MemoryDeviceCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DeviceCodeStore for MemoryDeviceCodeStore {
    async fn insert(&self, record: DeviceCodeRecord) -> StoreResult<()> {
        let index_slot = match self.by_user_code.entry(record.user_code.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "user code {}",
                    record.user_code
                )));
            }
            Entry::Vacant(slot) => slot,
        };

        match self.records.entry(record.device_code.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict("device code".into())),
            Entry::Vacant(slot) => {
                index_slot.insert(record.device_code.clone());
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn find_by_device_code(
        &self,
        device_code: &str,
    ) -> StoreResult<Option<DeviceCodeRecord>> {
        Ok(self.records.get(device_code).map(|r| r.value().clone()))
    }

    async fn find_by_user_code(&self, user_code: &str) -> StoreResult<Option<DeviceCodeRecord>> {
        let Some(device_code) = self.by_user_code.get(user_code).map(|r| r.value().clone()) else {
            return Ok(None);
        };
        Ok(self.records.get(&device_code).map(|r| r.value().clone()))
    }

    async fn authorize(&self, device_code: &str, grant: &DeviceGrant) -> StoreResult<bool> {
        let Some(mut record) = self.records.get_mut(device_code) else {
            return Ok(false);
        };
        if record.authorized_at.is_some() || record.is_expired_at(grant.authorized_at) {
            return Ok(false);
        }
        record.authorized_at = Some(grant.authorized_at);
        record.user_id = Some(grant.user_id.clone());
        record.access_token = Some(grant.access_token.clone());
        Ok(true)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut removed_user_codes = Vec::new();
        self.records.retain(|_, record| {
            let keep = record.expires_at > now;
            if !keep {
                removed_user_codes.push(record.user_code.clone());
            }
            keep
        });
        for user_code in &removed_user_codes {
            self.by_user_code.remove(user_code);
        }
        Ok(removed_user_codes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::models::{ProviderLink, Role};

    fn user(id: &str, email: &str, provider: Provider, provider_id: &str) -> UserRecord {
        let now = Utc::now();
        let mut providers = BTreeMap::new();
        providers.insert(
            provider,
            ProviderLink {
                provider_id: provider_id.into(),
                email: email.into(),
                connected_at: now,
            },
        );
        UserRecord {
            id: id.into(),
            email: email.into(),
            name: None,
            avatar: None,
            role: Role::User,
            is_active: true,
            providers,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    fn device_record(device_code: &str, user_code: &str, ttl: Duration) -> DeviceCodeRecord {
        let now = Utc::now();
        DeviceCodeRecord {
            id: format!("id-{device_code}"),
            device_code: device_code.into(),
            user_code: user_code.into(),
            provider: Provider::Github,
            expires_at: now + ttl,
            authorized_at: None,
            user_id: None,
            access_token: None,
            created_at: now,
        }
    }

    fn grant(user_id: &str) -> DeviceGrant {
        DeviceGrant {
            user_id: user_id.into(),
            access_token: format!("token-for-{user_id}"),
            authorized_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn email_is_normalized_and_unique() {
        let store = MemoryUserStore::new();
        let created = store
            .create(user("u1", " Dev@X.com", Provider::Github, "1"))
            .await
            .unwrap();
        assert_eq!(created.email, "dev@x.com");
        assert!(store.find_by_email("DEV@x.COM").await.unwrap().is_some());

        let dup = store
            .create(user("u2", "dev@x.com", Provider::Google, "2"))
            .await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn provider_identity_is_unique_across_users() {
        let store = MemoryUserStore::new();
        store
            .create(user("u1", "a@x.com", Provider::Github, "42"))
            .await
            .unwrap();
        let dup = store
            .create(user("u2", "b@x.com", Provider::Github, "42"))
            .await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));

        store
            .create(user("u2", "b@x.com", Provider::Google, "7"))
            .await
            .unwrap();
        let link = ProviderLink {
            provider_id: "42".into(),
            email: "b@x.com".into(),
            connected_at: Utc::now(),
        };
        let stolen = store
            .update("u2", UserUpdate::touched(Utc::now()).set_provider(Provider::Github, link))
            .await;
        assert!(matches!(stolen, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn update_refuses_to_remove_last_provider() {
        let store = MemoryUserStore::new();
        store
            .create(user("u1", "a@x.com", Provider::Github, "1"))
            .await
            .unwrap();
        let result = store
            .update("u1", UserUpdate::touched(Utc::now()).unset_provider(Provider::Github))
            .await;
        assert!(matches!(result, Err(StoreError::Invariant(_))));
        let still = store.find_by_id("u1").await.unwrap().unwrap();
        assert_eq!(still.provider_names(), vec!["github"]);
    }

    #[tokio::test]
    async fn update_unknown_user_is_not_found() {
        let store = MemoryUserStore::new();
        let result = store.update("nope", UserUpdate::touched(Utc::now())).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn device_codes_reject_duplicates() {
        let store = MemoryDeviceCodeStore::new();
        store
            .insert(device_record("d1", "AAAA-BBBB", Duration::minutes(15)))
            .await
            .unwrap();
        assert!(matches!(
            store
                .insert(device_record("d2", "AAAA-BBBB", Duration::minutes(15)))
                .await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store
                .insert(device_record("d1", "CCCC-DDDD", Duration::minutes(15)))
                .await,
            Err(StoreError::Conflict(_))
        ));
        // The failed insert must not leave a dangling index entry.
        assert!(store.find_by_user_code("CCCC-DDDD").await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn authorize_is_compare_and_set() {
        let store = MemoryDeviceCodeStore::new();
        store
            .insert(device_record("d1", "AAAA-BBBB", Duration::minutes(15)))
            .await
            .unwrap();

        assert!(store.authorize("d1", &grant("u1")).await.unwrap());
        assert!(!store.authorize("d1", &grant("u2")).await.unwrap());
        assert!(!store.authorize("missing", &grant("u1")).await.unwrap());

        let rec = store.find_by_user_code("AAAA-BBBB").await.unwrap().unwrap();
        assert_eq!(rec.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn authorize_refuses_expired_record() {
        let store = MemoryDeviceCodeStore::new();
        store
            .insert(device_record("d1", "AAAA-BBBB", Duration::seconds(-1)))
            .await
            .unwrap();
        assert!(!store.authorize("d1", &grant("u1")).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_authorize_has_one_winner() {
        let store = Arc::new(MemoryDeviceCodeStore::new());
        store
            .insert(device_record("d1", "AAAA-BBBB", Duration::minutes(15)))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.authorize("d1", &grant(&format!("u{i}"))).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn delete_expired_clears_both_indexes() {
        let store = MemoryDeviceCodeStore::new();
        store
            .insert(device_record("old", "AAAA-BBBB", Duration::seconds(-5)))
            .await
            .unwrap();
        store
            .insert(device_record("new", "CCCC-DDDD", Duration::minutes(15)))
            .await
            .unwrap();

        assert_eq!(store.delete_expired(Utc::now()).await.unwrap(), 1);
        assert!(store.find_by_device_code("old").await.unwrap().is_none());
        assert!(store.find_by_user_code("AAAA-BBBB").await.unwrap().is_none());
        assert!(store.find_by_user_code("CCCC-DDDD").await.unwrap().is_some());
    }
}
