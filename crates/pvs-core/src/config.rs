// ── Runtime coordinator configuration ──
//
// These types describe *how* to reach a gateway and how often to poll it.
// They carry credential data and tuning, but never touch disk.
// The CLI constructs a `CoordinatorConfig` and hands it in.

use std::time::Duration;

use pvs_api::websocket::ReconnectPolicy;
use pvs_api::{PvsClient, TlsMode, TransportConfig};
use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// Default poll interval.
pub const DEFAULT_UPDATE_PERIOD: Duration = Duration::from_secs(10);

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification. Default: the gateway ships a self-signed certificate.
    #[default]
    DangerAcceptInvalid,
}

/// Options the host may change while the coordinator runs.
///
/// Applied through [`Coordinator::update_options`](crate::Coordinator::update_options);
/// the poll interval takes effect at the next cycle boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorOptions {
    pub update_period: Duration,
    pub live_data_enabled: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            update_period: DEFAULT_UPDATE_PERIOD,
            live_data_enabled: true,
        }
    }
}

/// Live-data channel tuning.
#[derive(Debug, Clone)]
pub struct LiveDataSettings {
    /// Override for the socket URL. `None` means `ws://<host>:9002`.
    pub url: Option<Url>,
    /// Grace period after the host reports it is running.
    pub start_delay: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for LiveDataSettings {
    fn default() -> Self {
        Self {
            url: None,
            start_delay: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Configuration for one gateway.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Gateway host (IP or name), without scheme.
    pub host: String,
    pub password: SecretString,
    /// Login user; `None` uses the owner account.
    pub user: Option<String>,
    pub tls: TlsVerification,
    /// HTTP request timeout.
    pub timeout: Duration,
    pub options: CoordinatorOptions,
    pub live: LiveDataSettings,
    /// How long `shutdown` waits for each background task before aborting it.
    pub shutdown_timeout: Duration,
}

impl CoordinatorConfig {
    pub fn new(host: impl Into<String>, password: SecretString) -> Self {
        Self {
            host: host.into(),
            password,
            user: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            options: CoordinatorOptions::default(),
            live: LiveDataSettings::default(),
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    /// Build the HTTP device client described by this config.
    pub fn device_client(&self) -> Result<PvsClient, CoreError> {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        let transport = TransportConfig {
            tls,
            timeout: self.timeout,
        };

        let client = PvsClient::new(&self.host, self.password.clone(), &transport)?;
        Ok(match &self.user {
            Some(user) => client.with_user(user.clone()),
            None => client,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pvs_api::DeviceClient;

    use super::*;

    #[test]
    fn defaults() {
        let config = CoordinatorConfig::new("192.168.1.50", "pw".to_string().into());
        assert_eq!(config.options.update_period, Duration::from_secs(10));
        assert!(config.options.live_data_enabled);
        assert_eq!(config.live.start_delay, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(config.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn device_client_targets_https_host() {
        let config = CoordinatorConfig::new("192.168.1.50", "pw".to_string().into());
        let client = config.device_client().unwrap();
        assert_eq!(client.base_url().as_str(), "https://192.168.1.50/");
        assert_eq!(client.host(), "192.168.1.50");
    }

    #[test]
    fn invalid_host_is_config_error() {
        let config = CoordinatorConfig::new("bad host/[", "pw".to_string().into());
        assert!(matches!(config.device_client(), Err(CoreError::Config { .. })));
    }
}
