//! Services backing the handlers.

pub mod oauth;
