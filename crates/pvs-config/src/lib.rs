//! Shared configuration for the PVS tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `pvs_core::CoordinatorConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pvs_core::{CoordinatorConfig, CoordinatorOptions, TlsVerification};

/// Keyring service name for stored gateway passwords.
const KEYRING_SERVICE: &str = "pvs";

/// Environment variable consulted before the keyring.
pub const PASSWORD_ENV: &str = "PVS_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' not found in config")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named gateway profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Profile name to use when none is given explicitly.
    pub fn active_profile_name(&self) -> &str {
        self.default_profile.as_deref().unwrap_or("default")
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Poll interval in seconds.
    #[serde(default = "default_update_period")]
    pub update_period_s: u64,

    #[serde(default = "default_true")]
    pub enable_live_data: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: false,
            timeout: default_timeout(),
            update_period_s: default_update_period(),
            enable_live_data: default_true(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_update_period() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

/// A named gateway profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Gateway host or IP, without scheme (e.g. "192.168.1.50").
    pub host: String,

    /// Login user. Defaults to the owner account.
    pub user: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override HTTP timeout in seconds.
    pub timeout: Option<u64>,

    /// Override poll interval in seconds.
    pub update_period_s: Option<u64>,

    /// Override live-data enablement.
    pub enable_live_data: Option<bool>,

    /// Override the live-data socket URL.
    pub live_data_url: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "pvs", "pvs").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("pvs");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// Environment keys use `__` as the nesting separator, e.g.
/// `PVS_DEFAULTS__UPDATE_PERIOD_S=30`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PVS_").ignore(&["PASSWORD"]).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the gateway password from the credential chain.
///
/// Order: the profile's `password_env` variable, `PVS_PASSWORD`, the
/// system keyring (`pvs` / `<profile>/password`), then plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(pw));
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

// ── Translation ─────────────────────────────────────────────────────

fn validate_host<'a>(profile: &'a Profile, profile_name: &str) -> Result<&'a str, ConfigError> {
    let host = profile.host.trim();
    if host.is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: format!("profile '{profile_name}' has no host"),
        });
    }
    Ok(host)
}

/// Poll interval for `profile`, validated to be at least one second.
pub fn update_period(profile: &Profile, defaults: &Defaults) -> Result<Duration, ConfigError> {
    let secs = profile.update_period_s.unwrap_or(defaults.update_period_s);
    if secs < 1 {
        return Err(ConfigError::Validation {
            field: "update_period_s".into(),
            reason: format!("must be at least 1 second, got {secs}"),
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Build a `CoordinatorConfig` from a profile, applying global defaults
/// and resolving the password through the credential chain.
pub fn profile_to_coordinator_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<CoordinatorConfig, ConfigError> {
    validate_host(profile, profile_name)?;
    let password = resolve_password(profile, profile_name)?;
    coordinator_config(profile, profile_name, defaults, password)
}

/// Build a `CoordinatorConfig` with an already resolved password.
pub fn coordinator_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    password: SecretString,
) -> Result<CoordinatorConfig, ConfigError> {
    let host = validate_host(profile, profile_name)?;
    let update_period = update_period(profile, defaults)?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::DangerAcceptInvalid // gateways ship self-signed certificates
    };

    let mut config = CoordinatorConfig::new(host, password);
    config.user.clone_from(&profile.user);
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.options = CoordinatorOptions {
        update_period,
        live_data_enabled: profile.enable_live_data.unwrap_or(defaults.enable_live_data),
    };

    if let Some(ref raw) = profile.live_data_url {
        let url = raw.parse::<url::Url>().map_err(|_| ConfigError::Validation {
            field: "live_data_url".into(),
            reason: format!("invalid URL: {raw}"),
        })?;
        config.live.url = Some(url);
    }

    Ok(config)
}
