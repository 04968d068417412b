//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use pvs_config::ConfigError;
use pvs_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const PROTOCOL: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not communicate with gateway: {message}")]
    #[diagnostic(
        code(pvs::connection_failed),
        help(
            "Check that the gateway is reachable on the local network.\n\
             Try: pvs snapshot --host <ip> --insecure"
        )
    )]
    ConnectionFailed { message: String },

    #[error("Gateway sent an unreadable response: {message}")]
    #[diagnostic(
        code(pvs::protocol),
        help("Firmware may not expose the varserver API. Re-run with -vv for details.")
    )]
    Protocol { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(pvs::auth_failed),
        help(
            "The gateway password is usually the last five characters of its serial number.\n\
             Pass it with --password or set PVS_PASSWORD."
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(pvs::no_credentials),
        help(
            "Set PVS_PASSWORD, pass --password, or set password_env in the profile.\n\
             Keyring entries are read from service 'pvs', user '{profile}/password'."
        )
    )]
    NoCredentials { profile: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(pvs::validation))]
    Validation { field: String, reason: String },

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(pvs::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: pvs config init <ip>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No gateway configured")]
    #[diagnostic(
        code(pvs::no_config),
        help(
            "Pass --host, or create a profile with: pvs config init <ip>\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(pvs::config))]
    Config { message: String },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Interrupted before the gateway answered")]
    #[diagnostic(code(pvs::cancelled))]
    Cancelled,

    #[error("Internal error: {0}")]
    #[diagnostic(code(pvs::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to encode JSON: {0}")]
    #[diagnostic(code(pvs::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Protocol { .. } => exit_code::PROTOCOL,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::CommunicationFailed { message } => Self::ConnectionFailed { message },
            CoreError::ProtocolFailed { message } => Self::Protocol { message },
            CoreError::Config { message } => Self::Config { message },
            CoreError::Cancelled => Self::Cancelled,
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<pvs_api::Error> for CliError {
    fn from(err: pvs_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::UnknownProfile { profile } => Self::ProfileNotFound {
                name: profile,
                available: "(none)".into(),
            },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config {
                message: other.to_string(),
            },
        }
    }
}
