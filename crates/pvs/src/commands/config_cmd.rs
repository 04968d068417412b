//! Config subcommand handlers.

use pvs_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, ConfigInitArgs, GlobalOpts};
use crate::config;
use crate::error::CliError;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", config::config_path(global).display());
            Ok(())
        }
        ConfigCommand::Show => {
            let cfg = config::load_config(global)?;
            print!("{}", format_config_redacted(&cfg));
            Ok(())
        }
        ConfigCommand::Init(ref init) => init_profile(init, global),
    }
}

fn init_profile(args: &ConfigInitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_path(global);
    let mut cfg = config::load_config(global)?;
    let name = args
        .name
        .clone()
        .unwrap_or_else(|| config::active_profile_name(global, &cfg));

    let profile = Profile {
        host: args.gateway.trim().to_owned(),
        password_env: args.password_env.clone(),
        update_period_s: args.update_period,
        ..Profile::default()
    };
    // Reject bad values before they reach the file.
    pvs_config::update_period(&profile, &cfg.defaults)?;
    if profile.host.is_empty() {
        return Err(CliError::Validation {
            field: "host".into(),
            reason: "must not be empty".into(),
        });
    }

    cfg.profiles.insert(name.clone(), profile);
    if args.default || cfg.profiles.len() == 1 {
        cfg.default_profile = Some(name.clone());
    }
    pvs_config::save_config_to(&cfg, &path)?;

    eprintln!("Saved profile '{name}' to {}", path.display());
    Ok(())
}

/// Format config for display, masking sensitive fields.
fn format_config_redacted(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);
    let _ = writeln!(out, "update_period_s = {}", cfg.defaults.update_period_s);
    let _ = writeln!(out, "enable_live_data = {}", cfg.defaults.enable_live_data);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let p = &cfg.profiles[name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "host = \"{}\"", p.host);
        if let Some(ref u) = p.user {
            let _ = writeln!(out, "user = \"{u}\"");
        }
        if p.password.is_some() {
            let _ = writeln!(out, "password = \"****\"");
        }
        if let Some(ref env) = p.password_env {
            let _ = writeln!(out, "password_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(period) = p.update_period_s {
            let _ = writeln!(out, "update_period_s = {period}");
        }
        if let Some(live) = p.enable_live_data {
            let _ = writeln!(out, "enable_live_data = {live}");
        }
        if let Some(ref url) = p.live_data_url {
            let _ = writeln!(out, "live_data_url = \"{url}\"");
        }
    }

    out
}
