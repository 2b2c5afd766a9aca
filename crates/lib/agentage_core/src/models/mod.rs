//! Domain models.
//!
//! Persisted records use camelCase field names (`deviceCode`, `lastLoginAt`);
//! RFC 8628 wire responses keep the snake_case names the protocol defines.

pub mod device;
pub mod user;

pub use device::{
    DeviceCodeRecord, DeviceCodeResponse, DeviceCodeState, DeviceGrant, DeviceTokenResponse,
    DeviceUser,
};
pub use user::{
    Provider, ProviderLink, Role, UnknownProvider, UserRecord, UserUpdate, normalize_email,
};
