//! `pvs snapshot`: one-shot setup + fetch.

use pvs_api::{DeviceClient, DeviceKind};
use strum::IntoEnumIterator;
use tracing::debug;

use crate::cli::{GlobalOpts, SnapshotArgs};
use crate::config::{self, Overrides};
use crate::error::CliError;

pub async fn handle(args: &SnapshotArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let coordinator_config = config::build_coordinator_config(global, &Overrides::default())?;
    let mut client = coordinator_config.device_client()?;

    client.setup().await?;
    let fetched = client.update().await;
    if let Err(e) = client.logout().await {
        debug!(error = %e, "logout failed");
    }
    let snapshot = fetched?;

    let value = if args.summary {
        let counts: serde_json::Map<String, serde_json::Value> = DeviceKind::iter()
            .map(|kind| (kind.to_string(), snapshot.count(kind).into()))
            .collect();
        serde_json::json!({
            "serial_number": client.serial_number(),
            "fetched_at": snapshot.fetched_at,
            "devices": counts,
        })
    } else {
        serde_json::to_value(&snapshot)?
    };

    let out = if args.compact {
        serde_json::to_string(&value)?
    } else {
        serde_json::to_string_pretty(&value)?
    };
    println!("{out}");
    Ok(())
}
