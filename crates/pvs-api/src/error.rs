use thiserror::Error;

/// Top-level error type for the `pvs-api` crate.
///
/// Covers every failure mode of the device surfaces: authentication,
/// HTTP transport, varserver payloads, and the live-data WebSocket.
/// `pvs-core` maps these into coordinator-level failures.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (wrong password, account locked, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Session cookie expired or was revoked (device reboot, firmware update).
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request or handshake timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Device answered with an unexpected HTTP status.
    #[error("Unexpected HTTP status {status} from {endpoint}")]
    Status { status: u16, endpoint: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed or errored mid-stream.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// No frame received within the staleness window; the socket was force-closed.
    #[error("WebSocket stale -- no frames for {idle_secs}s")]
    StaleConnection { idle_secs: u64 },
}

impl Error {
    /// Returns `true` if this error means the session is not (or no longer)
    /// authenticated and a fresh login might resolve it.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::SessionExpired)
    }

    /// Returns `true` if the payload, not the transport, was at fault.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Deserialization { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_classification() {
        assert!(Error::SessionExpired.is_auth_error());
        assert!(
            Error::Authentication {
                message: "bad password".into()
            }
            .is_auth_error()
        );
        assert!(!Error::Timeout { timeout_secs: 10 }.is_auth_error());
        assert!(
            !Error::Deserialization {
                message: "eof".into(),
                body: String::new()
            }
            .is_auth_error()
        );
    }

    #[test]
    fn protocol_classification() {
        assert!(
            Error::Deserialization {
                message: "eof".into(),
                body: "<html>".into()
            }
            .is_protocol_error()
        );
        assert!(!Error::StaleConnection { idle_secs: 91 }.is_protocol_error());
        assert!(
            !Error::Status {
                status: 503,
                endpoint: "/vars".into()
            }
            .is_protocol_error()
        );
    }
}
