//! # agentage_core
//!
//! Identity, bearer-token and device-authorization logic for Agentage.
//!
//! Components are constructed explicitly and share store handles through
//! `Arc<dyn …Store>`; nothing here owns ambient global state.

pub mod accounts;
pub mod auth;
pub mod db;
pub mod device;
pub mod models;
pub mod store;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
