//! Bearer-token issuance/verification and the per-request gate.
//!
//! Shared by `agentage_api` (HTTP middleware) and the device flow, which
//! mints tokens on authorization.

pub mod duration;
pub mod gate;
pub mod jwt;

use thiserror::Error;

pub use gate::{AuthGate, GateRejection, Identity};
pub use jwt::{TokenClaims, TokenPayload, TokenService, TokenVerification};

/// Token service errors.
///
/// `Configuration` is raised only while constructing the service; callers
/// treat it as a fatal startup condition.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token configuration error: {0}")]
    Configuration(String),

    #[error("Token signing failed: {0}")]
    Signing(String),
}
