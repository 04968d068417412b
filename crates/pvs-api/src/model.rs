// ── Device records ──
//
// Typed views of the gateway's varserver tables. A `Snapshot` is the
// complete result of one poll; it is never merged with an older one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};

/// The closed set of device kinds a PVS reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceKind {
    Gateway,
    Inverter,
    Meter,
    Ess,
    TransferSwitch,
}

impl DeviceKind {
    /// Varserver path prefix holding this kind's variables.
    pub fn var_prefix(self) -> &'static str {
        match self {
            Self::Gateway => "/sys/info",
            Self::Inverter => "/sys/devices/inverter",
            Self::Meter => "/sys/devices/meter",
            Self::Ess => "/sys/devices/ess",
            Self::TransferSwitch => "/sys/devices/transfer_switch",
        }
    }
}

/// Gateway identity and health.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gateway {
    pub serial_number: String,
    pub model: Option<String>,
    pub hardware_version: Option<String>,
    pub software_version: Option<String>,
    pub uptime_s: Option<f64>,
    pub ram_usage_percent: Option<f64>,
    pub flash_usage_percent: Option<f64>,
    pub cpu_usage_percent: Option<f64>,
}

/// A microinverter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inverter {
    pub serial_number: String,
    pub model: Option<String>,
    pub last_report_date: Option<DateTime<Utc>>,
    pub last_report_kw: Option<f64>,
    pub last_report_voltage_v: Option<f64>,
    pub last_report_current_a: Option<f64>,
    pub last_report_frequency_hz: Option<f64>,
    pub last_report_temperature_c: Option<f64>,
    pub lte_kwh: Option<f64>,
}

/// A production or consumption meter (built-in CTs).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meter {
    pub serial_number: String,
    pub model: Option<String>,
    pub power_3ph_kw: Option<f64>,
    pub voltage_3ph_v: Option<f64>,
    pub current_3ph_a: Option<f64>,
    pub freq_hz: Option<f64>,
    pub lte_3ph_kwh: Option<f64>,
    pub ct_scale_factor: Option<f64>,
    pub i1_a: Option<f64>,
    pub i2_a: Option<f64>,
    pub neg_lte_kwh: Option<f64>,
    pub net_lte_kwh: Option<f64>,
    pub p1_kw: Option<f64>,
    pub p2_kw: Option<f64>,
    pub pos_lte_kwh: Option<f64>,
    pub q3phsum_kvar: Option<f64>,
    pub s3phsum_kva: Option<f64>,
    pub tot_pf_ratio: Option<f64>,
    pub v12_v: Option<f64>,
    pub v1n_v: Option<f64>,
    pub v2n_v: Option<f64>,
}

/// An energy storage system (battery + inverter).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ess {
    pub serial_number: String,
    pub model: Option<String>,
    pub power_3ph_kw: Option<f64>,
    pub neg_lte_kwh: Option<f64>,
    pub pos_lte_kwh: Option<f64>,
    pub v1n_v: Option<f64>,
    pub v2n_v: Option<f64>,
    pub op_mode: Option<String>,
    pub soc_val: Option<f64>,
    pub customer_soc_val: Option<f64>,
    pub soh_val: Option<f64>,
    pub t_invtr_degc: Option<f64>,
    pub v_batt_v: Option<f64>,
    pub chrg_limit_pmax_kw: Option<f64>,
    pub dischrg_lim_pmax_kw: Option<f64>,
    pub max_t_batt_cell_degc: Option<f64>,
    pub min_t_batt_cell_degc: Option<f64>,
    pub max_v_batt_cell_v: Option<f64>,
    pub min_v_batt_cell_v: Option<f64>,
}

/// A MIDC transfer switch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferSwitch {
    pub serial_number: String,
    pub model: Option<String>,
    pub mid_state: Option<String>,
    pub pvd1_state: Option<String>,
    pub temperature_c: Option<f64>,
    pub v1n_grid_v: Option<f64>,
    pub v1n_v: Option<f64>,
    pub v2n_grid_v: Option<f64>,
    pub v2n_v: Option<f64>,
    pub v_supply_v: Option<f64>,
}

/// One complete poll result. Device maps are keyed by serial number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub gateway: Option<Gateway>,
    pub inverters: BTreeMap<String, Inverter>,
    pub meters: BTreeMap<String, Meter>,
    pub ess: BTreeMap<String, Ess>,
    pub transfer_switches: BTreeMap<String, TransferSwitch>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    /// An empty snapshot stamped with the current time.
    pub fn empty() -> Self {
        Self {
            gateway: None,
            inverters: BTreeMap::new(),
            meters: BTreeMap::new(),
            ess: BTreeMap::new(),
            transfer_switches: BTreeMap::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Number of records of the given kind.
    pub fn count(&self, kind: DeviceKind) -> usize {
        match kind {
            DeviceKind::Gateway => usize::from(self.gateway.is_some()),
            DeviceKind::Inverter => self.inverters.len(),
            DeviceKind::Meter => self.meters.len(),
            DeviceKind::Ess => self.ess.len(),
            DeviceKind::TransferSwitch => self.transfer_switches.len(),
        }
    }
}
