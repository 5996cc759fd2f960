use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("Login not completed within {0:?}")]
    LoginTimeout(Duration),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run lock conflict: another harvesting run is in progress")]
    RunInProgress,

    #[error("Invalid run transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Coarse failure category carried by a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Login,
    Navigation,
    Browser,
    Report,
    Cancelled,
    Internal,
}

impl PulseError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PulseError::Session(_) | PulseError::LoginTimeout(_) => FailureKind::Login,
            PulseError::Navigation { .. } => FailureKind::Navigation,
            PulseError::Browser(_) => FailureKind::Browser,
            PulseError::Report(_) => FailureKind::Report,
            PulseError::Cancelled => FailureKind::Cancelled,
            PulseError::Config(_)
            | PulseError::RunInProgress
            | PulseError::InvalidTransition { .. }
            | PulseError::Anyhow(_) => FailureKind::Internal,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Login => "login",
            FailureKind::Navigation => "navigation",
            FailureKind::Browser => "browser",
            FailureKind::Report => "report",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal",
        };
        f.write_str(s)
    }
}
