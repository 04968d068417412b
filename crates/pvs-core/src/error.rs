// ── Core error types ──
//
// Coordinator-level failures. Consumers never see HTTP status codes or
// JSON parse failures directly; the `From<pvs_api::Error>` impl folds
// transport-layer errors into the three outcomes a poll cycle can have.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Poll outcomes ────────────────────────────────────────────────
    /// Credentials rejected or session unrecoverable. Polling halts until
    /// the host re-authenticates.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Error communicating with gateway: {message}")]
    CommunicationFailed { message: String },

    #[error("Gateway sent an unreadable response: {message}")]
    ProtocolFailed { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Coordinator is shutting down")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` if the host must re-authenticate before polling resumes.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<pvs_api::Error> for CoreError {
    fn from(err: pvs_api::Error) -> Self {
        match err {
            pvs_api::Error::Authentication { message } => CoreError::AuthenticationFailed { message },
            pvs_api::Error::SessionExpired => CoreError::AuthenticationFailed {
                message: "Session expired -- re-authentication required".into(),
            },
            pvs_api::Error::Deserialization { message, body: _ } => {
                CoreError::ProtocolFailed { message }
            }
            pvs_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            pvs_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            other @ (pvs_api::Error::Transport(_)
            | pvs_api::Error::Timeout { .. }
            | pvs_api::Error::Status { .. }
            | pvs_api::Error::WebSocketConnect(_)
            | pvs_api::Error::StaleConnection { .. }) => CoreError::CommunicationFailed {
                message: other.to_string(),
            },
        }
    }
}
