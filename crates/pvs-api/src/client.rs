// PVS HTTP client
//
// Wraps `reqwest::Client` with the gateway's login flow and varserver
// queries. Session auth is cookie-based: `/auth?login` with HTTP basic
// credentials sets a session cookie in the client's jar, and every
// subsequent `/vars` request rides on it.

use std::future::Future;

use secrecy::{ExposeSecret, SecretString};
use strum::IntoEnumIterator;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::model::{DeviceKind, Snapshot};
use crate::transport::TransportConfig;
use crate::varserver::{self, VarTable};

/// Account used for local owner access on current PVS firmware.
pub const DEFAULT_USER: &str = "ssm_owner";

/// The device-facing half of the system: authenticate, then fetch snapshots.
///
/// The coordinator only ever talks to this trait, so tests and alternate
/// transports can stand in for the HTTP client. Implementations own their
/// session state; [`Error::is_auth_error`] tells the caller when that
/// session needs to be rebuilt with another [`setup`](Self::setup).
pub trait DeviceClient: Send + 'static {
    /// Host (IP or name) of the gateway; the live-data socket connects here.
    fn host(&self) -> &str;

    /// Authenticate and discover the gateway.
    fn setup(&mut self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Fetch a complete snapshot of device state.
    fn update(&mut self) -> impl Future<Output = Result<Snapshot, Error>> + Send;
}

/// HTTP client for the gateway's varserver API.
pub struct PvsClient {
    http: reqwest::Client,
    base_url: Url,
    host: String,
    user: String,
    password: SecretString,
    serial_number: Option<String>,
}

impl PvsClient {
    /// Create a client for `https://{host}` from a `TransportConfig`.
    pub fn new(host: &str, password: SecretString, transport: &TransportConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("https://{host}/"))?;
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, password))
    }

    /// Create a client with a pre-built `reqwest::Client` and base URL.
    pub fn with_client(http: reqwest::Client, base_url: Url, password: SecretString) -> Self {
        let host = base_url.host_str().unwrap_or("localhost").to_owned();
        Self {
            http,
            base_url,
            host,
            user: DEFAULT_USER.to_owned(),
            password,
            serial_number: None,
        }
    }

    /// Override the login user (installer accounts use a different name).
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Gateway serial number, known after a successful [`setup`](DeviceClient::setup).
    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Session ─────────────────────────────────────────────────────

    /// Log in with basic credentials; the session cookie lands in the jar.
    pub async fn login(&self) -> Result<(), Error> {
        let url = self.base_url.join("auth?login")?;
        debug!("logging in at {}", url);

        let resp = self
            .http
            .get(url)
            .basic_auth(&self.user, Some(self.password.expose_secret()))
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("login rejected (HTTP {status}): {body}"),
            });
        }
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                endpoint: "/auth?login".into(),
            });
        }

        debug!("login successful");
        Ok(())
    }

    /// End the current session. Failures are the caller's to ignore.
    pub async fn logout(&self) -> Result<(), Error> {
        let url = self.base_url.join("auth?logout")?;
        debug!("logging out at {}", url);
        self.http.get(url).send().await?;
        Ok(())
    }

    // ── Varserver ───────────────────────────────────────────────────

    /// Fetch a single variable by exact name.
    pub async fn get_var(&self, name: &str) -> Result<Option<serde_json::Value>, Error> {
        let mut url = self.base_url.join("vars")?;
        url.query_pairs_mut().append_pair("name", name);
        let mut table = self.fetch_table(url).await?;
        Ok(table.remove(name))
    }

    /// Fetch every variable whose name matches `pattern`.
    pub async fn get_vars(&self, pattern: &str) -> Result<VarTable, Error> {
        let mut url = self.base_url.join("vars")?;
        url.query_pairs_mut()
            .append_pair("match", pattern)
            .append_pair("fmt", "obj");
        self.fetch_table(url).await
    }

    async fn fetch_table(&self, url: Url) -> Result<VarTable, Error> {
        debug!("GET {}", url);
        let endpoint = url.path().to_owned();
        let resp = self.http.get(url).send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::SessionExpired);
        }
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                endpoint,
            });
        }

        let body = resp.text().await?;
        varserver::parse_vars(&body)
    }
}

impl DeviceClient for PvsClient {
    fn host(&self) -> &str {
        &self.host
    }

    async fn setup(&mut self) -> Result<(), Error> {
        self.login().await?;

        let serial = self
            .get_var("/sys/info/sn")
            .await?
            .and_then(|v| v.as_str().map(str::to_owned));
        debug!(serial = ?serial, "gateway discovered");
        self.serial_number = serial;
        Ok(())
    }

    async fn update(&mut self) -> Result<Snapshot, Error> {
        let mut table = VarTable::new();
        for kind in DeviceKind::iter() {
            table.extend(self.get_vars(kind.var_prefix()).await?);
        }

        let snapshot = varserver::snapshot_from_vars(&table);
        debug!(
            inverters = snapshot.inverters.len(),
            meters = snapshot.meters.len(),
            ess = snapshot.ess.len(),
            transfer_switches = snapshot.transfer_switches.len(),
            "varserver poll complete"
        );
        Ok(snapshot)
    }
}
