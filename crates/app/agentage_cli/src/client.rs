//! Blocking HTTP client for the Agentage API.

use std::time::Duration;

use agentage_core::device::ProtocolError;
use agentage_core::models::{DeviceCodeResponse, DeviceTokenResponse};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::json;

use crate::{Error, Result};

const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// One poll of the token endpoint.
#[derive(Debug)]
pub enum PollOutcome {
    Authorized(DeviceTokenResponse),
    /// An RFC 8628 error; its disposition says what to do next.
    Rejected(ProtocolError),
}

/// Signed-in user as returned by `/api/auth/me`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Me {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    #[serde(default)]
    pub providers: Vec<String>,
}

#[derive(Deserialize)]
struct MeEnvelope {
    user: Me,
}

pub struct ApiClient {
    http: Client,
    base: String,
}

impl ApiClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("agentage-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// `POST /api/auth/device/code`
    pub fn request_device_code(&self) -> Result<DeviceCodeResponse> {
        let resp = self
            .http
            .post(self.url("/api/auth/device/code"))
            .json(&json!({ "provider": "github" }))
            .send()?;
        if resp.status().is_success() {
            return Ok(resp.json()?);
        }
        Err(rejection(resp))
    }

    /// `POST /api/auth/device/token`
    pub fn poll_token(&self, device_code: &str) -> Result<PollOutcome> {
        let resp = self
            .http
            .post(self.url("/api/auth/device/token"))
            .json(&json!({ "device_code": device_code, "grant_type": DEVICE_GRANT_TYPE }))
            .send()?;
        if resp.status().is_success() {
            return Ok(PollOutcome::Authorized(resp.json()?));
        }
        match rejection(resp) {
            Error::Protocol(e) => Ok(PollOutcome::Rejected(e)),
            other => Err(other),
        }
    }

    /// `GET /api/auth/me`
    pub fn me(&self, token: &str) -> Result<Me> {
        let resp = self
            .http
            .get(self.url("/api/auth/me"))
            .bearer_auth(token)
            .send()?;
        match resp.status() {
            s if s.is_success() => Ok(resp.json::<MeEnvelope>()?.user),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::SessionExpired),
            _ => Err(rejection(resp)),
        }
    }
}

/// Turn an error response into a typed error: an RFC 8628 body when the
/// server sent one, otherwise the raw status and text.
fn rejection(resp: Response) -> Error {
    let status = resp.status().as_u16();
    let body = resp.text().unwrap_or_default();
    match serde_json::from_str::<ProtocolError>(&body) {
        Ok(protocol) => Error::Protocol(protocol),
        Err(_) => Error::Api {
            status,
            message: body,
        },
    }
}
