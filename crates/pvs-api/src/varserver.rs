// ── Varserver payload decoding ──
//
// The gateway exposes its state as a flat namespace of variables such as
// `/sys/devices/inverter/3/p3phsumKw`. This module turns those flat maps
// into the typed records in `crate::model`. Values arrive as strings more
// often than as numbers, so every accessor is lenient.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Error;
use crate::model::{DeviceKind, Ess, Gateway, Inverter, Meter, Snapshot, TransferSwitch};

/// Flat variable map as returned by `/vars?...&fmt=obj`.
pub type VarTable = BTreeMap<String, Value>;

/// Parse a varserver response body.
///
/// Accepts both the object form (`{"/sys/info/sn": "..."}`) and the list
/// form (`{"count": 1, "values": [{"name": "...", "value": "..."}]}`).
pub fn parse_vars(body: &str) -> Result<VarTable, Error> {
    let value: Value = serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: body.to_owned(),
    })?;

    let Value::Object(map) = value else {
        return Err(Error::Deserialization {
            message: "expected a JSON object".into(),
            body: body.to_owned(),
        });
    };

    if let Some(Value::Array(values)) = map.get("values") {
        let mut table = VarTable::new();
        for entry in values {
            if let (Some(name), Some(value)) = (entry["name"].as_str(), entry.get("value")) {
                table.insert(name.to_owned(), value.clone());
            }
        }
        return Ok(table);
    }

    Ok(map.into_iter().collect())
}

// ── Per-device view ──────────────────────────────────────────────────

/// The variables belonging to one device, keyed by their leaf name.
#[derive(Debug, Default, Clone)]
pub struct DeviceVars(BTreeMap<String, Value>);

impl DeviceVars {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Text value; numbers are rendered, empty strings dropped.
    pub fn string(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Numeric value from a number or a numeric string.
    pub fn float(&self, field: &str) -> Option<f64> {
        match self.0.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    /// Epoch seconds or an RFC 3339 string.
    pub fn datetime(&self, field: &str) -> Option<DateTime<Utc>> {
        match self.0.get(field)? {
            Value::Number(n) => n.as_i64().and_then(|ts| DateTime::from_timestamp(ts, 0)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .or_else(|| {
                    DateTime::parse_from_rfc3339(s.trim())
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc))
                }),
            _ => None,
        }
    }
}

/// Split `<prefix>/<index>/<field>` variables into one `DeviceVars` per index.
pub fn group_devices(table: &VarTable, kind: DeviceKind) -> BTreeMap<u32, DeviceVars> {
    let prefix = format!("{}/", kind.var_prefix());
    let mut devices: BTreeMap<u32, DeviceVars> = BTreeMap::new();

    for (name, value) in table {
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        let Some((index, field)) = rest.split_once('/') else {
            continue;
        };
        let Ok(index) = index.parse::<u32>() else {
            continue;
        };
        devices
            .entry(index)
            .or_default()
            .0
            .insert(field.to_owned(), value.clone());
    }

    devices
}

/// Gateway variables are not indexed: `/sys/info/<field>`.
pub fn gateway_vars(table: &VarTable) -> DeviceVars {
    let prefix = format!("{}/", DeviceKind::Gateway.var_prefix());
    DeviceVars(
        table
            .iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(&prefix)
                    .filter(|field| !field.contains('/'))
                    .map(|field| (field.to_owned(), value.clone()))
            })
            .collect(),
    )
}

// ── Record construction ──────────────────────────────────────────────

/// Build a gateway record; `None` without a serial number.
pub fn gateway_from_vars(vars: &DeviceVars) -> Option<Gateway> {
    Some(Gateway {
        serial_number: vars.string("sn")?,
        model: vars.string("model"),
        hardware_version: vars.string("hwrev"),
        software_version: vars.string("sw_rev"),
        uptime_s: vars.float("uptime"),
        ram_usage_percent: vars.float("ram_usage"),
        flash_usage_percent: vars.float("flash_usage"),
        cpu_usage_percent: vars.float("cpu_usage"),
    })
}

pub fn inverter_from_vars(vars: &DeviceVars) -> Option<Inverter> {
    Some(Inverter {
        serial_number: vars.string("sn")?,
        model: vars.string("prodMdlNm"),
        last_report_date: vars.datetime("msmtEps"),
        last_report_kw: vars.float("p3phsumKw"),
        last_report_voltage_v: vars.float("vMppt1V"),
        last_report_current_a: vars.float("iMppt1A"),
        last_report_frequency_hz: vars.float("freqHz"),
        last_report_temperature_c: vars.float("tHtsnkDegc"),
        lte_kwh: vars.float("ltea3phsumKwh"),
    })
}

pub fn meter_from_vars(vars: &DeviceVars) -> Option<Meter> {
    Some(Meter {
        serial_number: vars.string("sn")?,
        model: vars.string("prodMdlNm"),
        power_3ph_kw: vars.float("p3phsumKw"),
        voltage_3ph_v: vars.float("vln3phavgV"),
        current_3ph_a: vars.float("i3phsumA"),
        freq_hz: vars.float("freqHz"),
        lte_3ph_kwh: vars.float("ltea3phsumKwh"),
        ct_scale_factor: vars.float("ctSclFctr"),
        i1_a: vars.float("i1A"),
        i2_a: vars.float("i2A"),
        neg_lte_kwh: vars.float("negLtea3phsumKwh"),
        net_lte_kwh: vars.float("netLtea3phsumKwh"),
        p1_kw: vars.float("p1Kw"),
        p2_kw: vars.float("p2Kw"),
        pos_lte_kwh: vars.float("posLtea3phsumKwh"),
        q3phsum_kvar: vars.float("q3phsumKvar"),
        s3phsum_kva: vars.float("s3phsumKva"),
        tot_pf_ratio: vars.float("totPfRto"),
        v12_v: vars.float("v12V"),
        v1n_v: vars.float("v1nV"),
        v2n_v: vars.float("v2nV"),
    })
}

pub fn ess_from_vars(vars: &DeviceVars) -> Option<Ess> {
    Some(Ess {
        serial_number: vars.string("sn")?,
        model: vars.string("prodMdlNm"),
        power_3ph_kw: vars.float("p3phsumKw"),
        neg_lte_kwh: vars.float("negLtea3phsumKwh"),
        pos_lte_kwh: vars.float("posLtea3phsumKwh"),
        v1n_v: vars.float("v1nV"),
        v2n_v: vars.float("v2nV"),
        op_mode: vars.string("opMode"),
        soc_val: vars.float("socVal"),
        customer_soc_val: vars.float("customerSocVal"),
        soh_val: vars.float("sohVal"),
        t_invtr_degc: vars.float("tInvtrDegc"),
        v_batt_v: vars.float("vBattV"),
        chrg_limit_pmax_kw: vars.float("chrgLimitPmaxKw"),
        dischrg_lim_pmax_kw: vars.float("dischrgLimPmaxKw"),
        max_t_batt_cell_degc: vars.float("maxTBattCellDegc"),
        min_t_batt_cell_degc: vars.float("minTBattCellDegc"),
        max_v_batt_cell_v: vars.float("maxVBattCellV"),
        min_v_batt_cell_v: vars.float("minVBattCellV"),
    })
}

pub fn transfer_switch_from_vars(vars: &DeviceVars) -> Option<TransferSwitch> {
    Some(TransferSwitch {
        serial_number: vars.string("sn")?,
        model: vars.string("prodMdlNm"),
        mid_state: vars.string("midStEnum"),
        pvd1_state: vars.string("pvd1StEnum"),
        temperature_c: vars.float("tDegc"),
        v1n_grid_v: vars.float("v1nGridV"),
        v1n_v: vars.float("v1nV"),
        v2n_grid_v: vars.float("v2nGridV"),
        v2n_v: vars.float("v2nV"),
        v_supply_v: vars.float("vSpplyV"),
    })
}

/// Index a kind's devices by serial number, skipping entries without one.
fn collect_by_serial<T>(
    table: &VarTable,
    kind: DeviceKind,
    build: fn(&DeviceVars) -> Option<T>,
    serial: fn(&T) -> &str,
) -> BTreeMap<String, T> {
    group_devices(table, kind)
        .values()
        .filter_map(build)
        .map(|record| (serial(&record).to_owned(), record))
        .collect()
}

/// Assemble a `Snapshot` from the merged variable tables of one poll.
pub fn snapshot_from_vars(table: &VarTable) -> Snapshot {
    Snapshot {
        gateway: gateway_from_vars(&gateway_vars(table)),
        inverters: collect_by_serial(table, DeviceKind::Inverter, inverter_from_vars, |r| {
            r.serial_number.as_str()
        }),
        meters: collect_by_serial(table, DeviceKind::Meter, meter_from_vars, |r| {
            r.serial_number.as_str()
        }),
        ess: collect_by_serial(table, DeviceKind::Ess, ess_from_vars, |r| {
            r.serial_number.as_str()
        }),
        transfer_switches: collect_by_serial(
            table,
            DeviceKind::TransferSwitch,
            transfer_switch_from_vars,
            |r| r.serial_number.as_str(),
        ),
        fetched_at: Utc::now(),
    }
}
