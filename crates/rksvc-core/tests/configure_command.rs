//! Integration tests for the configure command

mod support;

use std::path::PathBuf;

use rksvc_core::commands::{ConfigureCommand, ConfigureOptions, InstallCommand, InstallOptions};
use rksvc_core::config::{ConfigOverrides, SettingKey, SettingValue, parse_document};
use rksvc_core::confirm::FixedAnswer;
use rksvc_core::error::LifecycleError;
use rksvc_core::host::Ownership;

use support::Harness;

/// Harness with a completed install.
fn installed() -> Harness {
    let harness = Harness::new();
    let artifact = harness.artifact("reasonkit-web", "1.0.0");
    InstallCommand::new(harness.ctx(), &FixedAnswer::YES)
        .execute(&InstallOptions::default().with_binary(&artifact))
        .expect("Install should succeed");
    harness
}

fn backups(harness: &Harness) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(&harness.definition.config_dir)
        .expect("config dir should exist")
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.to_string_lossy().ends_with(".bak"))
        .collect();
    found.sort();
    found
}

fn env(pairs: &[(&str, &str)]) -> ConfigOverrides {
    let pairs: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ConfigOverrides::from_lookup(|name| {
        pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    })
    .expect("Overrides should parse")
}

fn configure(harness: &Harness, options: &ConfigureOptions) -> Result<rksvc_core::commands::ConfigureReport, LifecycleError> {
    ConfigureCommand::new(harness.ctx()).execute(options)
}

#[test]
fn operator_values_survive_reconfigure() {
    let harness = installed();
    let config = &harness.definition.config_file;
    let custom = "log_level = \"warn\"\ntimeout = 90\nworkers = 16\nlegacy_flag = true\n\n[proxy]\nurl = \"http://proxy:3128\"\n";
    std::fs::write(config, custom).expect("Failed to write custom config");

    let options = ConfigureOptions::new(env(&[("REASONKIT_LOG_LEVEL", "debug")]));
    let report = configure(&harness, &options).expect("Configure should succeed");

    let document = parse_document(config).expect("Config should parse");
    assert_eq!(document.get(SettingKey::LogLevel), Some(&SettingValue::Text("debug".into())));
    assert_eq!(document.get(SettingKey::Timeout), Some(&SettingValue::Number(90)));
    assert_eq!(document.get(SettingKey::Workers), Some(&SettingValue::Number(16)));
    assert_eq!(document.extra().get("legacy_flag"), Some(&toml::Value::Boolean(true)));
    assert!(document.extra().get("proxy").is_some_and(toml::Value::is_table));

    let backup = report.backup.expect("A backup should have been taken");
    assert_eq!(std::fs::read_to_string(backup).unwrap(), custom);
}

#[test]
fn missing_keys_are_filled_on_rewrite() {
    let harness = installed();
    let config = &harness.definition.config_file;
    std::fs::write(config, "timeout = 90\n").unwrap();

    configure(
        &harness,
        &ConfigureOptions::new(env(&[("REASONKIT_WORKERS", "2")])),
    )
    .expect("Configure should succeed");

    let document = parse_document(config).unwrap();
    assert!(document.missing_keys().is_empty());
    assert_eq!(document.get(SettingKey::Timeout), Some(&SettingValue::Number(90)));
    assert_eq!(document.get(SettingKey::Headless), Some(&SettingValue::Flag(true)));
}

#[test]
fn successive_overrides_accumulate() {
    let harness = installed();

    configure(&harness, &ConfigureOptions::new(env(&[("REASONKIT_TIMEOUT", "60")])))
        .expect("First configure should succeed");
    configure(&harness, &ConfigureOptions::new(env(&[("REASONKIT_WORKERS", "8")])))
        .expect("Second configure should succeed");

    let document = parse_document(&harness.definition.config_file).unwrap();
    assert_eq!(document.get(SettingKey::Timeout), Some(&SettingValue::Number(60)));
    assert_eq!(document.get(SettingKey::Workers), Some(&SettingValue::Number(8)));
    assert_eq!(backups(&harness).len(), 2);
}

#[test]
fn unchanged_configure_writes_nothing() {
    let harness = installed();
    let before = std::fs::read_to_string(&harness.definition.config_file).unwrap();

    let report = configure(&harness, &ConfigureOptions::default()).expect("Configure should succeed");

    assert!(report.backup.is_none());
    assert!(report.steps.iter().all(|step| !step.outcome.changed()), "{:#?}", report.steps);
    assert!(backups(&harness).is_empty());
    assert_eq!(std::fs::read_to_string(&harness.definition.config_file).unwrap(), before);
}

#[test]
fn invalid_value_leaves_document_untouched() {
    let harness = installed();
    let before = std::fs::read_to_string(&harness.definition.config_file).unwrap();

    let err = ConfigOverrides::from_lookup(|name| {
        (name == "REASONKIT_WORKERS").then(|| "1000".to_string())
    })
    .expect_err("Out of range workers should be rejected");

    assert!(matches!(err, LifecycleError::InvalidSetting { ref key, .. } if key == "workers"));
    assert_eq!(std::fs::read_to_string(&harness.definition.config_file).unwrap(), before);
}

#[test]
fn drifted_permissions_are_restored() {
    use std::os::unix::fs::PermissionsExt;

    let harness = installed();
    let config = &harness.definition.config_file;
    std::fs::set_permissions(config, std::fs::Permissions::from_mode(0o644)).unwrap();
    harness
        .host
        .owners
        .borrow_mut()
        .insert(config.clone(), Ownership::new("root", "root"));

    let report = configure(&harness, &ConfigureOptions::default()).expect("Configure should succeed");

    let mode = std::fs::metadata(config).unwrap().permissions().mode() & 0o7777;
    assert_eq!(mode, 0o640);
    assert_eq!(
        harness.host.owners.borrow().get(config),
        Some(&Ownership::new("root", "reasonkit"))
    );
    assert!(report.backup.is_none());
}

#[test]
fn stale_example_is_regenerated() {
    let harness = installed();
    let example = &harness.definition.example_config_file;
    std::fs::write(example, "# outdated\n").unwrap();

    configure(&harness, &ConfigureOptions::default()).expect("Configure should succeed");

    let content = std::fs::read_to_string(example).unwrap();
    for key in SettingKey::ALL {
        assert!(content.contains(key.env_var()), "missing {}", key.env_var());
    }
}

#[test]
fn running_service_is_restarted_only_on_request() {
    let harness = installed();

    let report = configure(&harness, &ConfigureOptions::new(env(&[("REASONKIT_TIMEOUT", "45")])))
        .expect("Configure should succeed");
    assert_eq!(harness.supervisor.count("restart"), 0);
    assert!(report.warnings.iter().any(|w| w.contains("restart it to apply")));

    let report = configure(
        &harness,
        &ConfigureOptions::new(env(&[("REASONKIT_TIMEOUT", "50")])).with_start(true),
    )
    .expect("Configure should succeed");
    assert_eq!(harness.supervisor.count("restart"), 1);
    assert!(report.warnings.is_empty());
    assert!(report.status.active);
}

#[test]
fn start_brings_up_stopped_service() {
    let harness = installed();
    harness.supervisor.active.set(false);
    harness.supervisor.enabled.set(false);

    let report = configure(
        &harness,
        &ConfigureOptions::default().with_start(true).with_enable(true),
    )
    .expect("Configure should succeed");

    assert!(report.status.active);
    assert!(report.status.enabled);
    assert_eq!(harness.supervisor.count("restart"), 0);
}

#[test]
fn configure_before_install_writes_defaults() {
    let harness = Harness::new();
    harness.host.add_account("reasonkit", "reasonkit");

    let report = configure(&harness, &ConfigureOptions::default()).expect("Configure should succeed");

    assert!(report.backup.is_none());
    let document = parse_document(&harness.definition.config_file).unwrap();
    assert!(document.missing_keys().is_empty());
}

#[test]
fn override_replaces_an_out_of_range_value() {
    let harness = installed();
    let config = &harness.definition.config_file;
    std::fs::write(config, "timeout = 90\nworkers = 512\n").unwrap();

    configure(
        &harness,
        &ConfigureOptions::new(env(&[("REASONKIT_WORKERS", "8")])),
    )
    .expect("Configure should succeed");

    let document = parse_document(config).unwrap();
    assert_eq!(document.get(SettingKey::Workers), Some(&SettingValue::Number(8)));
    assert_eq!(document.get(SettingKey::Timeout), Some(&SettingValue::Number(90)));
    assert!(document.rejected_keys().is_empty());
}

#[test]
fn unrecognised_value_is_written_back_verbatim() {
    let harness = installed();
    let config = &harness.definition.config_file;
    std::fs::write(config, "log_level = \"verbose\"\ntimeout = 90\n").unwrap();

    configure(
        &harness,
        &ConfigureOptions::new(env(&[("REASONKIT_TIMEOUT", "60")])),
    )
    .expect("Configure should succeed");

    let table: toml::Table = toml::from_str(&std::fs::read_to_string(config).unwrap()).unwrap();
    assert_eq!(table.get("log_level"), Some(&toml::Value::String("verbose".into())));
    assert_eq!(table.get("timeout"), Some(&toml::Value::Integer(60)));
    assert_eq!(table.get("workers"), Some(&toml::Value::Integer(4)));
}

#[test]
fn reinstall_tolerates_invalid_values() {
    let harness = installed();
    let config = &harness.definition.config_file;
    std::fs::write(config, "workers = 512\n").unwrap();

    let artifact = harness.artifact("reasonkit-web", "1.0.0");
    InstallCommand::new(harness.ctx(), &FixedAnswer::YES)
        .execute(&InstallOptions::default().with_binary(&artifact))
        .expect("Reinstall should succeed");

    assert_eq!(std::fs::read_to_string(config).unwrap(), "workers = 512\n");
}

#[test]
fn rewritten_document_is_restricted_before_it_appears() {
    let harness = installed();
    let config = &harness.definition.config_file;
    harness.host.chowned.borrow_mut().clear();

    configure(
        &harness,
        &ConfigureOptions::new(env(&[("REASONKIT_TIMEOUT", "75")])),
    )
    .expect("Configure should succeed");

    let chowned = harness.host.chowned.borrow();
    let staged = chowned
        .iter()
        .find(|path| {
            path.parent() == config.parent()
                && path.file_name().is_some_and(|name| {
                    let name = name.to_string_lossy();
                    name.starts_with(".config.toml.") && name.ends_with(".tmp")
                })
        })
        .expect("temp file should be chowned before the rename");
    assert!(!staged.exists());
    assert_eq!(
        harness.host.owners.borrow().get(staged),
        Some(&Ownership::new("root", "reasonkit"))
    );
}
