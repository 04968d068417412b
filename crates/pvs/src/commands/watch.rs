//! `pvs watch`: act as the host for a running coordinator.
//!
//! Runs the first refresh, starts polling, flips the host to running so
//! the live-data channel may connect, then prints snapshots and live
//! changes until Ctrl-C or an authentication failure.

use std::sync::Arc;

use pvs_api::{DeviceKind, Snapshot};
use pvs_core::{
    Coordinator, CoordinatorStatus, HostLifecycle, LIVE_FIELDS, LiveField, Subscription,
};
use tracing::{info, warn};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::config::{self, Overrides};
use crate::error::CliError;

pub async fn handle(args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let fields = selected_fields(&args.fields)?;
    let overrides = Overrides {
        update_period: args.update_period,
        no_live_data: args.no_live_data,
    };
    let coordinator_config = config::build_coordinator_config(global, &overrides)?;
    let client = coordinator_config.device_client()?;

    let lifecycle = HostLifecycle::new();
    let coordinator = Coordinator::new(client, &coordinator_config, lifecycle.clone());

    let first = match coordinator.first_refresh().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            coordinator.shutdown().await;
            return Err(e.into());
        }
    };
    print_snapshot(&first);

    let subscriptions: Vec<Subscription> = fields
        .into_iter()
        .map(|field| {
            let reader = coordinator.clone();
            coordinator.subscribe_live(field.name, move || match reader.live_value(field.name) {
                Some(value) => println!("{} = {value}", field.wire),
                None => println!("{} = -", field.wire),
            })
        })
        .collect();

    if let Err(e) = coordinator.start().await {
        coordinator.shutdown().await;
        return Err(e.into());
    }
    lifecycle.set_running();

    let outcome = watch_loop(&coordinator).await;

    lifecycle.set_stopping();
    coordinator.shutdown().await;
    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    outcome
}

async fn watch_loop<C: pvs_api::DeviceClient>(
    coordinator: &Coordinator<C>,
) -> Result<(), CliError> {
    let mut snapshots = coordinator.subscribe_snapshots();
    let mut status = coordinator.subscribe_status();
    status.borrow_and_update();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("interrupted, shutting down");
                return Ok(());
            }
            changed = snapshots.changed() => {
                let Some(snapshot) = changed else {
                    return Ok(());
                };
                print_snapshot(&snapshot);
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = status.borrow_and_update().clone();
                match current {
                    CoordinatorStatus::NeedsReauth => {
                        return Err(CliError::AuthFailed {
                            message: "gateway rejected the session; polling stopped".into(),
                        });
                    }
                    CoordinatorStatus::Degraded { message } => {
                        warn!(%message, "poll failed, keeping last snapshot");
                    }
                    CoordinatorStatus::Idle | CoordinatorStatus::Ok | CoordinatorStatus::Stopped => {}
                }
            }
        }
    }
}

/// Resolve `--fields` (wire names) against the field map. Empty means all.
fn selected_fields(names: &[String]) -> Result<Vec<&'static LiveField>, CliError> {
    if names.is_empty() {
        return Ok(LIVE_FIELDS.iter().collect());
    }
    names
        .iter()
        .map(|name| {
            LIVE_FIELDS
                .iter()
                .find(|f| f.wire == name.as_str())
                .ok_or_else(|| CliError::Validation {
                    field: "fields".into(),
                    reason: format!("unknown live-data field '{name}' (see: pvs live-fields)"),
                })
        })
        .collect()
}

fn print_snapshot(snapshot: &Arc<Snapshot>) {
    let gateway = snapshot
        .gateway
        .as_ref()
        .map_or("unknown", |g| g.serial_number.as_str());
    println!(
        "[{}] gateway {gateway}: {} inverters, {} meters, {} ess, {} transfer switches",
        snapshot.fetched_at.format("%H:%M:%S"),
        snapshot.count(DeviceKind::Inverter),
        snapshot.count(DeviceKind::Meter),
        snapshot.count(DeviceKind::Ess),
        snapshot.count(DeviceKind::TransferSwitch),
    );
}
