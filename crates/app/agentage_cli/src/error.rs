use agentage_core::device::ProtocolError;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    #[error("Not logged in. Run `agentage login` first.")]
    NotLoggedIn,

    #[error("Session expired or revoked. Run `agentage login` again.")]
    SessionExpired,

    #[error("Login was not completed ({}). Run `agentage login` again.", .0.error_description)]
    LoginRestart(ProtocolError),

    #[error("Login timed out before the code was authorized. Run `agentage login` again.")]
    LoginTimedOut,

    #[error("Server rejected the request: {}", .0)]
    Protocol(ProtocolError),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP::{:?}: {}", .0, .0)]
    Http(#[from] reqwest::Error),

    #[error("Json::{:?}: {}", .0, .0)]
    Json(#[from] serde_json::Error),

    #[error("IO::{:?}: {}", .0, .0)]
    Io(#[from] std::io::Error),

    #[error("FlexiLogger::{:?}: {}", .0, .0)]
    FlexiLogger(#[from] flexi_logger::FlexiLoggerError),
}
