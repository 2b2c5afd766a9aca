//! PostgreSQL-backed stores.
//!
//! Unique keys are enforced by the schema in `migrations/`; violations are
//! mapped to [`StoreError::Conflict`]. User updates lock the row with
//! `SELECT … FOR UPDATE` so concurrent link/unlink calls serialize.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::{DeviceCodeStore, StoreError, StoreResult, UserStore};
use crate::models::{
    DeviceCodeRecord, DeviceGrant, Provider, ProviderLink, Role, UnknownProvider, UserRecord,
    UserUpdate, normalize_email,
};

const USER_COLUMNS: &str = "u.id, u.email, u.name, u.avatar, u.role, u.is_active, \
                            u.created_at, u.updated_at, u.last_login_at";

const DEVICE_COLUMNS: &str = "id, device_code, user_code, provider, expires_at, \
                              authorized_at, user_id, access_token, created_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: Option<String>,
    avatar: Option<String>,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct ProviderRow {
    provider: String,
    provider_id: String,
    email: String,
    connected_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    id: String,
    device_code: String,
    user_code: String,
    provider: String,
    expires_at: DateTime<Utc>,
    authorized_at: Option<DateTime<Utc>>,
    user_id: Option<String>,
    access_token: Option<String>,
    created_at: DateTime<Utc>,
}

fn parse_provider(raw: &str) -> StoreResult<Provider> {
    raw.parse()
        .map_err(|e: UnknownProvider| StoreError::Corrupt(e.to_string()))
}

impl UserRow {
    fn into_record(self, providers: Vec<ProviderRow>) -> StoreResult<UserRecord> {
        let role: Role = self.role.parse().map_err(StoreError::Corrupt)?;
        let mut links = BTreeMap::new();
        for row in providers {
            links.insert(
                parse_provider(&row.provider)?,
                ProviderLink {
                    provider_id: row.provider_id,
                    email: row.email,
                    connected_at: row.connected_at,
                },
            );
        }
        Ok(UserRecord {
            id: self.id,
            email: self.email,
            name: self.name,
            avatar: self.avatar,
            role,
            is_active: self.is_active,
            providers: links,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_login_at: self.last_login_at,
        })
    }
}

impl TryFrom<DeviceRow> for DeviceCodeRecord {
    type Error = StoreError;

    fn try_from(row: DeviceRow) -> StoreResult<Self> {
        Ok(DeviceCodeRecord {
            provider: parse_provider(&row.provider)?,
            id: row.id,
            device_code: row.device_code,
            user_code: row.user_code,
            expires_at: row.expires_at,
            authorized_at: row.authorized_at,
            user_id: row.user_id,
            access_token: row.access_token,
            created_at: row.created_at,
        })
    }
}

/// Map a unique-constraint violation to `Conflict`, everything else to `Db`.
fn conflict_or_db(e: sqlx::Error, what: &str) -> StoreError {
    let unique = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if unique {
        StoreError::Conflict(what.to_string())
    } else {
        StoreError::Db(e)
    }
}

// =============================================================================
// Users
// =============================================================================

/// User store over the `users` and `user_providers` tables.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_providers<'e, E>(executor: E, user_id: &str) -> StoreResult<Vec<ProviderRow>>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, ProviderRow>(
            "SELECT provider, provider_id, email, connected_at \
             FROM user_providers WHERE user_id = $1 ORDER BY provider",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    async fn hydrate(&self, row: Option<UserRow>) -> StoreResult<Option<UserRecord>> {
        match row {
            Some(row) => {
                let providers = Self::load_providers(&self.pool, &row.id).await?;
                Ok(Some(row.into_record(providers)?))
            }
            None => Ok(None),
        }
    }

    async fn write_providers(
        tx: &mut Transaction<'_, Postgres>,
        user: &UserRecord,
    ) -> StoreResult<()> {
        let keep: Vec<String> = user.providers.keys().map(|p| p.as_str().to_string()).collect();
        sqlx::query("DELETE FROM user_providers WHERE user_id = $1 AND NOT (provider = ANY($2))")
            .bind(&user.id)
            .bind(&keep)
            .execute(&mut **tx)
            .await?;

        for (provider, link) in &user.providers {
            sqlx::query(
                "INSERT INTO user_providers (user_id, provider, provider_id, email, connected_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (user_id, provider) DO UPDATE \
                 SET provider_id = EXCLUDED.provider_id, \
                     email = EXCLUDED.email, \
                     connected_at = EXCLUDED.connected_at",
            )
            .bind(&user.id)
            .bind(provider.as_str())
            .bind(&link.provider_id)
            .bind(normalize_email(&link.email))
            .bind(link.connected_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| conflict_or_db(e, &format!("identity {provider}:{}", link.provider_id)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.email = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate(row).await
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate(row).await
    }

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u \
             JOIN user_providers p ON p.user_id = u.id \
             WHERE p.provider = $1 AND p.provider_id = $2"
        ))
        .bind(provider.as_str())
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate(row).await
    }

    async fn create(&self, mut user: UserRecord) -> StoreResult<UserRecord> {
        user.email = normalize_email(&user.email);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO users \
             (id, email, name, avatar, role, is_active, created_at, updated_at, last_login_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.avatar)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.last_login_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_db(e, &format!("email {}", user.email)))?;

        Self::write_providers(&mut tx, &user).await?;
        tx.commit().await?;

        for link in user.providers.values_mut() {
            link.email = normalize_email(&link.email);
        }
        debug!(user_id = %user.id, "user created");
        Ok(user)
    }

    async fn update(&self, id: &str, update: UserUpdate) -> StoreResult<UserRecord> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;

        let providers = Self::load_providers(&mut *tx, id).await?;
        let mut user = row.into_record(providers)?;
        update.apply_to(&mut user, Utc::now());

        if user.providers.is_empty() {
            return Err(StoreError::Invariant(format!(
                "user {id} would have no linked providers"
            )));
        }

        sqlx::query(
            "UPDATE users SET name = $2, avatar = $3, role = $4, is_active = $5, \
             last_login_at = $6, updated_at = $7 WHERE id = $1",
        )
        .bind(id)
        .bind(&user.name)
        .bind(&user.avatar)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.last_login_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await?;

        if !update.set_providers.is_empty() || !update.unset_providers.is_empty() {
            Self::write_providers(&mut tx, &user).await?;
        }
        tx.commit().await?;
        Ok(user)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Device codes
// =============================================================================

/// Device code store over the `device_codes` table.
#[derive(Debug, Clone)]
pub struct PgDeviceCodeStore {
    pool: PgPool,
}

impl PgDeviceCodeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceCodeStore for PgDeviceCodeStore {
    async fn insert(&self, record: DeviceCodeRecord) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO device_codes ({DEVICE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(&record.id)
        .bind(&record.device_code)
        .bind(&record.user_code)
        .bind(record.provider.as_str())
        .bind(record.expires_at)
        .bind(record.authorized_at)
        .bind(&record.user_id)
        .bind(&record.access_token)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, &format!("device code {}", record.user_code)))?;
        Ok(())
    }

    async fn find_by_device_code(
        &self,
        device_code: &str,
    ) -> StoreResult<Option<DeviceCodeRecord>> {
        sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM device_codes WHERE device_code = $1"
        ))
        .bind(device_code)
        .fetch_optional(&self.pool)
        .await?
        .map(DeviceCodeRecord::try_from)
        .transpose()
    }

    async fn find_by_user_code(&self, user_code: &str) -> StoreResult<Option<DeviceCodeRecord>> {
        sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM device_codes WHERE user_code = $1"
        ))
        .bind(user_code)
        .fetch_optional(&self.pool)
        .await?
        .map(DeviceCodeRecord::try_from)
        .transpose()
    }

    async fn authorize(&self, device_code: &str, grant: &DeviceGrant) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE device_codes \
             SET authorized_at = $2, user_id = $3, access_token = $4 \
             WHERE device_code = $1 AND authorized_at IS NULL AND expires_at > $2",
        )
        .bind(device_code)
        .bind(grant.authorized_at)
        .bind(&grant.user_id)
        .bind(&grant.access_token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM device_codes WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
