//! API server configuration.

use std::fmt;
use std::str::FromStr;

use agentage_core::auth::jwt::DEFAULT_TOKEN_TTL;
use agentage_core::models::Provider;
use tracing::warn;

/// Which persistence backend the server runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Postgres,
    /// In-process maps; data is lost on restart.
    Memory,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreKind::Postgres),
            "memory" | "mem" => Ok(StoreKind::Memory),
            other => Err(format!("unknown store kind: {other} (expected postgres or memory)")),
        }
    }
}

/// OAuth application credentials for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Must match the redirect URI registered with the provider.
    pub callback_url: String,
}

impl fmt::Debug for OAuthProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthProviderConfig")
            .field("client_id", &self.client_id)
            .field("callback_url", &self.callback_url)
            .finish_non_exhaustive()
    }
}

/// Credentials for every provider that is fully configured.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderConfigs {
    pub github: Option<OAuthProviderConfig>,
    pub google: Option<OAuthProviderConfig>,
    pub microsoft: Option<OAuthProviderConfig>,
}

impl ProviderConfigs {
    pub fn get(&self, provider: Provider) -> Option<&OAuthProviderConfig> {
        match provider {
            Provider::Github => self.github.as_ref(),
            Provider::Google => self.google.as_ref(),
            Provider::Microsoft => self.microsoft.as_ref(),
        }
    }

    pub fn set(&mut self, provider: Provider, config: Option<OAuthProviderConfig>) {
        match provider {
            Provider::Github => self.github = config,
            Provider::Google => self.google = config,
            Provider::Microsoft => self.microsoft = config,
        }
    }

    pub fn enabled(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.get(*p).is_some())
            .collect()
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let mut configs = Self::default();
        for provider in Provider::ALL {
            let prefix = provider.as_str().to_ascii_uppercase();
            let id = lookup(&format!("{prefix}_CLIENT_ID"));
            let secret = lookup(&format!("{prefix}_CLIENT_SECRET"));
            let callback = lookup(&format!("{prefix}_CALLBACK_URL"));
            match (id, secret, callback) {
                (Some(client_id), Some(client_secret), Some(callback_url)) => {
                    configs.set(
                        provider,
                        Some(OAuthProviderConfig {
                            client_id,
                            client_secret,
                            callback_url,
                        }),
                    );
                }
                (None, None, None) => {
                    warn!(%provider, "OAuth not configured - missing credentials");
                }
                _ => {
                    warn!(%provider, "OAuth partially configured - provider disabled");
                }
            }
        }
        configs
    }
}

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "0.0.0.0:3001").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    pub store: StoreKind,
    /// JWT signing secret. Empty means unconfigured, which is fatal at startup.
    pub jwt_secret: String,
    /// Token lifetime, e.g. `7d` or `24h`.
    pub jwt_expires_in: String,
    /// Externally reachable API origin; device verification lives under it.
    pub public_api_url: String,
    /// Web frontend origin that OAuth callbacks redirect to.
    pub frontend_url: String,
    pub providers: ProviderConfigs,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("store", &self.store)
            .field("jwt_expires_in", &self.jwt_expires_in)
            .field("public_api_url", &self.public_api_url)
            .field("frontend_url", &self.frontend_url)
            .field("providers", &self.providers.enabled())
            .finish_non_exhaustive()
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                       | Default                                |
    /// |--------------------------------|----------------------------------------|
    /// | `BIND_ADDR`                    | `0.0.0.0:3001`                         |
    /// | `DATABASE_URL`                 | `postgres://localhost:5432/agentage`   |
    /// | `STORE`                        | `postgres`                             |
    /// | `JWT_SECRET` / `AUTH_SECRET`   | none (startup fails)                   |
    /// | `JWT_EXPIRES_IN`               | `7d`                                   |
    /// | `PUBLIC_API_URL`               | `http://localhost:3001`                |
    /// | `FRONTEND_URL`                 | `http://localhost:3000`                |
    /// | `{GITHUB,GOOGLE,MICROSOFT}_{CLIENT_ID,CLIENT_SECRET,CALLBACK_URL}` | provider disabled |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key source.
    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store = match get("STORE").map(|raw| raw.parse::<StoreKind>()) {
            Some(Ok(kind)) => kind,
            Some(Err(e)) => {
                warn!(error = %e, "falling back to postgres store");
                StoreKind::Postgres
            }
            None => StoreKind::default(),
        };

        Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3001".into()),
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost:5432/agentage".into()),
            store,
            jwt_secret: get("JWT_SECRET").or_else(|| get("AUTH_SECRET")).unwrap_or_default(),
            jwt_expires_in: get("JWT_EXPIRES_IN").unwrap_or_else(|| DEFAULT_TOKEN_TTL.into()),
            public_api_url: get("PUBLIC_API_URL")
                .unwrap_or_else(|| "http://localhost:3001".into()),
            frontend_url: get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            providers: ProviderConfigs::from_lookup(&get),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> ApiConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.bind_addr, "0.0.0.0:3001");
        assert_eq!(config.store, StoreKind::Postgres);
        assert_eq!(config.jwt_expires_in, "7d");
        assert!(config.jwt_secret.is_empty());
        assert!(config.providers.enabled().is_empty());
    }

    #[test]
    fn auth_secret_is_a_fallback_for_jwt_secret() {
        assert_eq!(config_from(&[("AUTH_SECRET", "a")]).jwt_secret, "a");
        assert_eq!(
            config_from(&[("AUTH_SECRET", "a"), ("JWT_SECRET", "j")]).jwt_secret,
            "j"
        );
    }

    #[test]
    fn incomplete_provider_is_disabled() {
        let config = config_from(&[
            ("GITHUB_CLIENT_ID", "id"),
            ("GITHUB_CLIENT_SECRET", "secret"),
            ("GITHUB_CALLBACK_URL", "http://localhost:3001/api/auth/oauth/github/callback"),
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", ""),
        ]);
        assert_eq!(config.providers.enabled(), vec![Provider::Github]);
        assert!(config.providers.get(Provider::Google).is_none());
    }

    #[test]
    fn store_kind_parses() {
        assert_eq!(config_from(&[("STORE", "memory")]).store, StoreKind::Memory);
        assert_eq!("PG".parse::<StoreKind>(), Ok(StoreKind::Postgres));
        assert!("redis".parse::<StoreKind>().is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = config_from(&[
            ("JWT_SECRET", "super-secret"),
            ("GITHUB_CLIENT_ID", "id"),
            ("GITHUB_CLIENT_SECRET", "client-secret"),
            ("GITHUB_CALLBACK_URL", "http://cb"),
        ]);
        let rendered = format!("{config:?} {:?}", config.providers.github);
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("client-secret"));
    }
}
