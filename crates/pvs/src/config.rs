//! CLI-aware wrappers over `pvs-config`.
//!
//! Resolves the active profile and layers command-line flags on top of it
//! before handing off to the shared translation in `pvs_config`.

use std::path::PathBuf;

use secrecy::SecretString;

use pvs_config::{Config, Profile};
use pvs_core::CoordinatorConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Flags that only some commands carry.
#[derive(Debug, Default)]
pub struct Overrides {
    pub update_period: Option<u64>,
    pub no_live_data: bool,
}

/// Config file path, honoring `--config`.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config_file
        .clone()
        .unwrap_or_else(pvs_config::config_path)
}

pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(pvs_config::load_config_from(&config_path(global))?)
}

/// Profile name: `--profile`, then the file's default.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .unwrap_or_else(|| cfg.active_profile_name().to_owned())
}

/// Build a `CoordinatorConfig` from the config file, profile, and flags.
pub fn build_coordinator_config(
    global: &GlobalOpts,
    overrides: &Overrides,
) -> Result<CoordinatorConfig, CliError> {
    let cfg = load_config(global)?;
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly requested profile must exist.
        None if global.profile.is_some() => {
            let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
            available.sort();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            });
        }
        None if global.host.is_some() => Profile::default(),
        None => {
            return Err(CliError::NoConfig {
                path: config_path(global).display().to_string(),
            });
        }
    };

    apply_overrides(&mut profile, global, overrides);

    let password = match global.password {
        Some(ref pw) => SecretString::from(pw.clone()),
        None => pvs_config::resolve_password(&profile, &profile_name)?,
    };

    Ok(pvs_config::coordinator_config(
        &profile,
        &profile_name,
        &cfg.defaults,
        password,
    )?)
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts, overrides: &Overrides) {
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }
    if overrides.update_period.is_some() {
        profile.update_period_s = overrides.update_period;
    }
    if overrides.no_live_data {
        profile.enable_live_data = Some(false);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use super::*;

    fn global(config_file: PathBuf) -> GlobalOpts {
        GlobalOpts {
            profile: None,
            config_file: Some(config_file),
            host: None,
            password: None,
            insecure: false,
            timeout: None,
            verbose: 0,
        }
    }

    #[test]
    fn flags_alone_are_enough() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = global(dir.path().join("config.toml"));
        opts.host = Some("10.0.0.9".into());
        opts.password = Some("pw".into());

        let overrides = Overrides {
            update_period: Some(3),
            no_live_data: true,
        };
        let config = build_coordinator_config(&opts, &overrides).unwrap();
        assert_eq!(config.host, "10.0.0.9");
        assert_eq!(config.options.update_period, Duration::from_secs(3));
        assert!(!config.options.live_data_enabled);
    }

    #[test]
    fn no_host_and_no_profile() {
        let dir = tempfile::tempdir().unwrap();
        let opts = global(dir.path().join("config.toml"));
        let err = build_coordinator_config(&opts, &Overrides::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));
    }

    #[test]
    fn missing_named_profile_lists_available() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[profiles.garage]\nhost = \"10.0.0.2\"\n\n[profiles.house]\nhost = \"10.0.0.3\"\n",
        )
        .unwrap();

        let mut opts = global(path);
        opts.profile = Some("shed".into());
        let err = build_coordinator_config(&opts, &Overrides::default()).unwrap_err();
        match err {
            CliError::ProfileNotFound { name, available } => {
                assert_eq!(name, "shed");
                assert_eq!(available, "garage, house");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn host_flag_overrides_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[profiles.default]\nhost = \"10.0.0.2\"\nupdate_period_s = 30\n",
        )
        .unwrap();

        let mut opts = global(path);
        opts.host = Some("10.0.0.7".into());
        opts.password = Some("pw".into());
        let config = build_coordinator_config(&opts, &Overrides::default()).unwrap();
        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.options.update_period, Duration::from_secs(30));
    }
}
