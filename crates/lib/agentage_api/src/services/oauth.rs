//! OAuth authorization-code flow against GitHub, Google and Microsoft.
//!
//! Provides PKCE state management, code exchange, and profile retrieval. The
//! pending state for a login lives in memory between `begin` and the provider
//! callback; what happens after the callback is decided by its [`OAuthIntent`].

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentage_core::accounts::ProviderProfile;
use agentage_core::accounts::profile::{
    GithubEmail, GithubUser, GoogleUserInfo, MicrosoftUser, ProfileError,
};
use agentage_core::models::Provider;
use dashmap::DashMap;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::config::{OAuthProviderConfig, ProviderConfigs};

/// TTL for pending login state (10 minutes).
const STATE_TTL: Duration = Duration::from_secs(600);

const HTTP_USER_AGENT: &str = concat!("agentage-api/", env!("CARGO_PKG_VERSION"));

/// OAuth flow failures.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("OAuth provider {0} is not configured")]
    NotConfigured(Provider),

    #[error("Invalid or expired OAuth state")]
    InvalidState,

    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// =============================================================================
// PKCE helpers
// =============================================================================

/// Generate a cryptographic PKCE code verifier (43 chars, URL-safe).
pub fn generate_code_verifier() -> String {
    use base64::Engine;
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute S256 code challenge from a code verifier.
pub fn compute_code_challenge(verifier: &str) -> String {
    use base64::Engine;

    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Generate a cryptographic state parameter (CSRF token).
pub fn generate_state() -> String {
    use base64::Engine;
    use rand::RngCore;

    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// =============================================================================
// Pending state
// =============================================================================

/// What to do with the identity once the provider calls back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthIntent {
    /// Plain web login.
    Login,
    /// Finish by authorizing a CLI device code.
    Device { user_code: String },
    /// Hand the token to a desktop app listening on loopback.
    Desktop { callback: Url },
    /// Attach the provider to an already signed-in user.
    Link { user_id: String },
}

/// Pending login stored between `begin` and callback.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub provider: Provider,
    pub intent: OAuthIntent,
    pub pkce_verifier: String,
    pub created_at: Instant,
}

/// In-memory store for pending logins (keyed by state parameter).
#[derive(Debug, Default)]
pub struct OAuthStateStore {
    states: DashMap<String, PendingLogin>,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, state_key: String, pending: PendingLogin) {
        self.states.insert(state_key, pending);
    }

    /// Take (remove and return) a pending login.
    /// Returns `None` if not found or expired.
    pub fn take(&self, state_key: &str) -> Option<PendingLogin> {
        self.take_at(state_key, Instant::now())
    }

    fn take_at(&self, state_key: &str, now: Instant) -> Option<PendingLogin> {
        let (_, pending) = self.states.remove(state_key)?;
        if now.saturating_duration_since(pending.created_at) > STATE_TTL {
            return None;
        }
        Some(pending)
    }

    /// Evict expired entries.
    pub fn cleanup(&self) {
        self.cleanup_at(Instant::now());
    }

    fn cleanup_at(&self, now: Instant) {
        self.states
            .retain(|_, v| now.saturating_duration_since(v.created_at) <= STATE_TTL);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                store.cleanup();
            }
        })
    }
}

// =============================================================================
// Provider endpoints
// =============================================================================

struct Endpoints {
    authorize: &'static str,
    token: &'static str,
    scope: &'static str,
}

fn endpoints(provider: Provider) -> Endpoints {
    match provider {
        Provider::Github => Endpoints {
            authorize: "https://github.com/login/oauth/authorize",
            token: "https://github.com/login/oauth/access_token",
            scope: "read:user user:email",
        },
        Provider::Google => Endpoints {
            authorize: "https://accounts.google.com/o/oauth2/v2/auth",
            token: "https://oauth2.googleapis.com/token",
            scope: "openid email profile",
        },
        Provider::Microsoft => Endpoints {
            authorize: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
            token: "https://login.microsoftonline.com/common/oauth2/v2.0/token",
            scope: "openid email profile User.Read",
        },
    }
}

/// Token endpoint body. GitHub reports failures with HTTP 200 and `error`.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// Drives the provider side of a login.
pub struct OAuthClient {
    http: reqwest::Client,
    providers: ProviderConfigs,
    states: Arc<OAuthStateStore>,
}

impl OAuthClient {
    pub fn new(providers: ProviderConfigs) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            providers,
            states: Arc::new(OAuthStateStore::new()),
        })
    }

    pub fn states(&self) -> &Arc<OAuthStateStore> {
        &self.states
    }

    pub fn config(&self, provider: Provider) -> Result<&OAuthProviderConfig, OAuthError> {
        self.providers
            .get(provider)
            .ok_or(OAuthError::NotConfigured(provider))
    }

    /// Record a pending login and build the provider's authorization URL.
    pub fn begin(&self, provider: Provider, intent: OAuthIntent) -> Result<Url, OAuthError> {
        let config = self.config(provider)?;
        let ep = endpoints(provider);

        let state = generate_state();
        let verifier = generate_code_verifier();
        let challenge = compute_code_challenge(&verifier);

        let mut url = Url::parse_with_params(
            ep.authorize,
            &[
                ("client_id", config.client_id.as_str()),
                ("redirect_uri", config.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", ep.scope),
                ("state", state.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
            ],
        )?;
        if provider == Provider::Microsoft {
            url.query_pairs_mut().append_pair("response_mode", "query");
        }

        debug!(%provider, ?intent, "OAuth login started");
        self.states.insert(
            state,
            PendingLogin {
                provider,
                intent,
                pkce_verifier: verifier,
                created_at: Instant::now(),
            },
        );
        Ok(url)
    }

    /// Consume the pending login for `state`, checking it was started for `provider`.
    pub fn take_state(&self, provider: Provider, state: &str) -> Result<PendingLogin, OAuthError> {
        let pending = self.states.take(state).ok_or(OAuthError::InvalidState)?;
        if pending.provider != provider {
            warn!(expected = %pending.provider, got = %provider, "OAuth state used on wrong provider");
            return Err(OAuthError::InvalidState);
        }
        Ok(pending)
    }

    /// Exchange an authorization code for a provider access token.
    pub async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        code_verifier: &str,
    ) -> Result<String, OAuthError> {
        let config = self.config(provider)?;
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("redirect_uri", config.callback_url.as_str()),
            ("code_verifier", code_verifier),
        ];

        let resp = self
            .http
            .post(endpoints(provider).token)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(OAuthError::Exchange(format!("HTTP {status}: {body}")));
        }

        let body: TokenEndpointResponse = resp.json().await?;
        match body.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(OAuthError::Exchange(
                body.error_description
                    .or(body.error)
                    .unwrap_or_else(|| "no access token in response".into()),
            )),
        }
    }

    /// Fetch the signed-in identity and narrow it to a [`ProviderProfile`].
    pub async fn fetch_profile(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<ProviderProfile, OAuthError> {
        let profile = match provider {
            Provider::Github => {
                let user: GithubUser = self
                    .get_json("https://api.github.com/user", access_token)
                    .await?;
                let public_email = user.email.as_deref().is_some_and(|e| !e.is_empty());
                let emails: Vec<GithubEmail> = if public_email {
                    Vec::new()
                } else {
                    self.get_json("https://api.github.com/user/emails", access_token)
                        .await?
                };
                user.into_profile(&emails)?
            }
            Provider::Google => {
                let info: GoogleUserInfo = self
                    .get_json("https://openidconnect.googleapis.com/v1/userinfo", access_token)
                    .await?;
                ProviderProfile::try_from(info)?
            }
            Provider::Microsoft => {
                let me: MicrosoftUser = self
                    .get_json("https://graph.microsoft.com/v1.0/me", access_token)
                    .await?;
                ProviderProfile::try_from(me)?
            }
        };
        Ok(profile)
    }

    /// Code exchange followed by profile fetch.
    pub async fn complete(
        &self,
        provider: Provider,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderProfile, OAuthError> {
        let token = self.exchange_code(provider, code, code_verifier).await?;
        self.fetch_profile(provider, &token).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T, OAuthError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, HTTP_USER_AGENT)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

// =============================================================================
// Redirect targets
// =============================================================================

/// Accept only `http://localhost` or `http://127.0.0.1` desktop callbacks.
pub fn validate_desktop_callback(raw: &str) -> Result<Url, OAuthError> {
    let url = Url::parse(raw).map_err(|e| OAuthError::InvalidCallback(e.to_string()))?;
    let loopback = match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip == Ipv4Addr::LOCALHOST,
        _ => false,
    };
    if url.scheme() != "http" || !loopback {
        return Err(OAuthError::InvalidCallback(
            "desktop callback must be http://localhost or http://127.0.0.1".into(),
        ));
    }
    Ok(url)
}

/// `{base}{path}?k=v&…` with proper query encoding.
pub fn frontend_url(base: &str, path: &str, params: &[(&str, &str)]) -> Result<Url, OAuthError> {
    let mut url = Url::parse(&format!("{}{path}", base.trim_end_matches('/')))?;
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    Ok(url)
}

/// Append `params` to a validated desktop callback.
pub fn desktop_redirect(callback: &Url, params: &[(&str, &str)]) -> Url {
    let mut url = callback.clone();
    url.query_pairs_mut().extend_pairs(params);
    url
}

// =============================================================================
// Tests
// =============================================================================
