//! JWT token generation and verification.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::TokenError;
use super::duration::parse_ttl;
use crate::models::Role;

/// Issuer and audience stamped into every token.
pub const TOKEN_ISSUER: &str = "agentage.io";
pub const TOKEN_AUDIENCE: &str = "agentage.io";

/// Default token lifetime when none is configured.
pub const DEFAULT_TOKEN_TTL: &str = "7d";

/// Identity asserted by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

/// Full JWT claim set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub iss: String,
    pub aud: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Result of verifying a token. Ordinary bad input never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenVerification {
    Valid(TokenPayload),
    /// `expired` separates "log in again" from a tampered or malformed token.
    Invalid { expired: bool, reason: String },
}

impl TokenVerification {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenVerification::Valid(_))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, TokenVerification::Invalid { expired: true, .. })
    }

    pub fn payload(&self) -> Option<&TokenPayload> {
        match self {
            TokenVerification::Valid(payload) => Some(payload),
            TokenVerification::Invalid { .. } => None,
        }
    }
}

/// Stateless HS256 signer/verifier over a pre-shared secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Build the service. Fails on an empty secret or unparseable TTL.
    pub fn new(secret: &str, expires_in: &str) -> Result<Self, TokenError> {
        if secret.trim().is_empty() {
            return Err(TokenError::Configuration(
                "JWT_SECRET is not configured".into(),
            ));
        }
        let ttl = parse_ttl(expires_in)?;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    /// Configured token lifetime in seconds.
    pub fn expires_in_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Sign a token with the configured lifetime.
    pub fn issue(&self, payload: &TokenPayload) -> Result<String, TokenError> {
        self.issue_with_ttl(payload, self.ttl)
    }

    /// Sign a token with an explicit lifetime (may be negative).
    pub fn issue_with_ttl(
        &self,
        payload: &TokenPayload,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Signing(format!("token lifetime out of range: {ttl}")))?;
        let claims = TokenClaims {
            user_id: payload.user_id.clone(),
            email: payload.email.clone(),
            role: payload.role,
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(format!("jwt encode: {e}")))?;
        debug!(user_id = %payload.user_id, role = %payload.role, "token issued");
        Ok(token)
    }

    /// Verify signature, issuer, audience and expiry.
    pub fn verify(&self, token: &str) -> TokenVerification {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = 0;

        match decode::<TokenClaims>(token, &self.decoding, &validation) {
            Ok(data) => TokenVerification::Valid(TokenPayload {
                user_id: data.claims.user_id,
                email: data.claims.email,
                role: data.claims.role,
            }),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => {
                    debug!("token expired");
                    TokenVerification::Invalid {
                        expired: true,
                        reason: "Token expired".into(),
                    }
                }
                ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidIssuer
                | ErrorKind::InvalidAudience
                | ErrorKind::ImmatureSignature
                | ErrorKind::MissingRequiredClaim(_)
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => {
                    debug!(error = %e, "invalid token");
                    TokenVerification::Invalid {
                        expired: false,
                        reason: "Invalid token".into(),
                    }
                }
                _ => {
                    debug!(error = %e, "token verification failed");
                    TokenVerification::Invalid {
                        expired: false,
                        reason: "Token verification failed".into(),
                    }
                }
            },
        }
    }

    /// Decode claims WITHOUT verifying anything. Diagnostics only; never use
    /// the result to authorize an action.
    pub fn decode_unverified(token: &str) -> Option<TokenPayload> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        decode::<TokenPayload>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret", "7d").unwrap()
    }

    fn payload() -> TokenPayload {
        TokenPayload {
            user_id: "user-123".into(),
            email: "dev@x.com".into(),
            role: Role::Admin,
        }
    }

    #[test]
    fn missing_secret_is_a_configuration_error() {
        assert!(matches!(
            TokenService::new("  ", "7d"),
            Err(TokenError::Configuration(_))
        ));
        assert!(matches!(
            TokenService::new("s", "seven days"),
            Err(TokenError::Configuration(_))
        ));
    }

    #[test]
    fn issued_token_verifies_with_same_payload() {
        let svc = service();
        let token = svc.issue(&payload()).unwrap();
        let result = svc.verify(&token);
        assert!(result.is_valid());
        assert_eq!(result.payload(), Some(&payload()));
    }

    #[test]
    fn expired_token_is_distinguished_from_tampered() {
        let svc = service();
        let expired = svc
            .issue_with_ttl(&payload(), Duration::hours(-1))
            .unwrap();
        let result = svc.verify(&expired);
        assert!(!result.is_valid());
        assert!(result.is_expired());

        let mut tampered = svc.issue(&payload()).unwrap();
        tampered.push('x');
        let result = svc.verify(&tampered);
        assert!(!result.is_valid());
        assert!(!result.is_expired());
    }

    #[test]
    fn token_from_other_secret_is_invalid_not_expired() {
        let other = TokenService::new("other-secret", "7d").unwrap();
        let token = other.issue(&payload()).unwrap();
        assert_eq!(
            service().verify(&token),
            TokenVerification::Invalid {
                expired: false,
                reason: "Invalid token".into()
            }
        );
    }

    #[test]
    fn malformed_input_never_panics() {
        let svc = service();
        for junk in ["", "abc", "a.b.c", "....."] {
            assert!(!svc.verify(junk).is_valid());
        }
    }

    #[test]
    fn decode_unverified_reads_claims_without_secret() {
        let token = service().issue(&payload()).unwrap();
        assert_eq!(TokenService::decode_unverified(&token), Some(payload()));
        assert_eq!(TokenService::decode_unverified("garbage"), None);
    }

    #[test]
    fn oversized_ttl_fails_at_construction() {
        for ttl in ["99999999999999999", "100000000d"] {
            assert!(matches!(
                TokenService::new("s", ttl),
                Err(TokenError::Configuration(_))
            ));
        }
    }

    #[test]
    fn out_of_range_lifetime_is_a_signing_error() {
        let result = service().issue_with_ttl(&payload(), Duration::MAX);
        assert!(matches!(result, Err(TokenError::Signing(_))));
    }

    #[test]
    fn expires_in_reflects_configured_ttl() {
        let svc = TokenService::new("s", "24h").unwrap();
        assert_eq!(svc.expires_in_secs(), 86_400);
    }
}
