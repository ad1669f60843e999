//! Integration tests for the install command

mod support;

use std::os::unix::fs::PermissionsExt;

use rksvc_core::commands::{InstallCommand, InstallOptions};
use rksvc_core::confirm::FixedAnswer;
use rksvc_core::error::LifecycleError;
use rksvc_core::host::{Host, Ownership, SupervisorAvailability};
use rksvc_core::lock::InvocationLock;
use rksvc_core::state::InstallationState;

use support::{FakeHost, Harness};

fn install(harness: &Harness, options: &InstallOptions) -> Result<rksvc_core::commands::InstallReport, LifecycleError> {
    InstallCommand::new(harness.ctx(), &FixedAnswer::YES).execute(options)
}

#[test]
fn fresh_install_provisions_everything() {
    let harness = Harness::new();
    let artifact = harness.artifact("reasonkit-web", "1.0.0");

    let report = install(&harness, &InstallOptions::default().with_binary(&artifact))
        .expect("Install should succeed");

    assert!(report.changed());
    assert_eq!(report.installed_version.as_deref(), Some("reasonkit-web 1.0.0"));
    assert!(report.status.active);
    assert!(report.status.enabled);

    let state = InstallationState::probe(&harness.ctx());
    assert!(state.group_exists);
    assert!(state.account_exists);
    assert!(state.directories.iter().all(|dir| dir.exists && dir.conforms), "{:?}", state.directories);
    assert!(state.binary_installed);
    assert_eq!(state.symlink_target.as_deref(), Some(harness.definition.binary_path.as_path()));
    assert!(state.config_present);
    assert!(state.unit_present);
    assert!(harness.definition.logrotate_path.is_file());
    assert!(harness.definition.tmpfiles_path.is_file());
    assert!(harness.definition.example_config_file.is_file());
}

#[test]
fn install_applies_permission_matrix() {
    let harness = Harness::new();
    let artifact = harness.artifact("reasonkit-web", "1.0.0");
    install(&harness, &InstallOptions::default().with_binary(&artifact)).expect("Install should succeed");

    let def = &harness.definition;
    let mode = |path: &std::path::Path| {
        std::fs::metadata(path).expect("path should exist").permissions().mode() & 0o7777
    };
    assert_eq!(mode(&def.binary_dir), 0o755);
    assert_eq!(mode(&def.config_dir), 0o750);
    assert_eq!(mode(&def.data_dir), 0o750);
    assert_eq!(mode(&def.log_dir), 0o750);
    assert_eq!(mode(&def.runtime_dir), 0o755);
    assert_eq!(mode(&def.binary_path), 0o755);
    assert_eq!(mode(&def.config_file), 0o640);

    let owners = harness.host.owners.borrow();
    assert_eq!(owners.get(&def.config_dir), Some(&Ownership::new("root", "reasonkit")));
    assert_eq!(owners.get(&def.data_dir), Some(&Ownership::new("reasonkit", "reasonkit")));
    assert_eq!(owners.get(&def.config_file), Some(&Ownership::new("root", "reasonkit")));
    assert_eq!(owners.get(&def.unit_path), Some(&Ownership::new("root", "root")));
}

#[test]
fn second_install_changes_nothing() {
    let harness = Harness::new();
    let artifact = harness.artifact("reasonkit-web", "1.0.0");
    let options = InstallOptions::default().with_binary(&artifact);

    install(&harness, &options).expect("First install should succeed");
    let first = InstallationState::probe(&harness.ctx());
    let unit = std::fs::read(&harness.definition.unit_path).expect("unit should exist");

    let report = install(&harness, &options).expect("Second install should succeed");
    let second = InstallationState::probe(&harness.ctx());

    assert_eq!(first, second);
    assert!(!report.changed(), "{:#?}", report.steps);
    assert_eq!(harness.host.accounts_created.get(), 1);
    assert_eq!(std::fs::read(&harness.definition.unit_path).unwrap(), unit);
    assert_eq!(harness.supervisor.count("start"), 1);
}

#[test]
fn unprivileged_install_touches_nothing() {
    let host = FakeHost::default();
    host.euid.set(1000);
    let harness = Harness::with_host(host);
    let artifact = harness.artifact("reasonkit-web", "1.0.0");

    let err = install(&harness, &InstallOptions::default().with_binary(&artifact))
        .expect_err("Install should be refused");

    assert!(matches!(err, LifecycleError::PrivilegeError { uid: 1000 }));
    assert!(!harness.definition.lock_path.exists());
    assert!(!harness.definition.config_dir.exists());
    assert!(!harness.host.group_exists("reasonkit"));
    assert!(harness.supervisor.calls.borrow().is_empty());
}

#[test]
fn install_without_any_binary_is_rejected() {
    let harness = Harness::new();

    let err = install(&harness, &InstallOptions::default()).expect_err("Install should fail");

    assert!(matches!(err, LifecycleError::BinaryInvalid { .. }));
}

#[test]
fn reinstall_without_binary_keeps_installed_one() {
    let harness = Harness::new();
    let artifact = harness.artifact("reasonkit-web", "1.0.0");
    install(&harness, &InstallOptions::default().with_binary(&artifact)).expect("Install should succeed");

    let report = install(&harness, &InstallOptions::default()).expect("Reinstall should succeed");

    assert_eq!(report.installed_version.as_deref(), Some("reasonkit-web 1.0.0"));
}

#[test]
fn non_executable_artifact_is_made_executable() {
    let harness = Harness::new();
    let artifact = harness.artifact("reasonkit-web", "1.0.0");
    std::fs::set_permissions(&artifact, std::fs::Permissions::from_mode(0o644)).unwrap();

    let report = install(&harness, &InstallOptions::default().with_binary(&artifact))
        .expect("Install should succeed");

    assert!(report.warnings.iter().any(|w| w.contains("was not executable")));
    assert!(InstallationState::probe(&harness.ctx()).binary_installed);
}

#[test]
fn missing_artifact_is_rejected() {
    let harness = Harness::new();
    let missing = harness.temp.path().join("nowhere/reasonkit-web");

    let err = install(&harness, &InstallOptions::default().with_binary(&missing))
        .expect_err("Install should fail");

    assert!(matches!(err, LifecycleError::BinaryInvalid { ref reason, .. } if reason == "does not exist"));
}

#[test]
fn silent_artifact_installs_with_warning() {
    let harness = Harness::new();
    let artifact = harness.artifact("reasonkit-web", "1.0.0");
    std::fs::write(&artifact, "").unwrap();

    let report = install(&harness, &InstallOptions::default().with_binary(&artifact))
        .expect("Install should succeed");

    assert!(report.warnings.iter().any(|w| w.contains("did not report a version")));
    assert_eq!(report.installed_version, None);
}

#[test]
fn foreign_symlink_is_repointed_with_warning() {
    let harness = Harness::new();
    let def = &harness.definition;
    std::fs::create_dir_all(def.symlink_path.parent().unwrap()).unwrap();
    std::os::unix::fs::symlink("/usr/bin/true", &def.symlink_path).unwrap();
    let artifact = harness.artifact("reasonkit-web", "1.0.0");

    let report = install(&harness, &InstallOptions::default().with_binary(&artifact))
        .expect("Install should succeed");

    assert!(report.warnings.iter().any(|w| w.contains("pointed to /usr/bin/true")));
    assert_eq!(std::fs::read_link(&def.symlink_path).unwrap(), def.binary_path);
}

#[test]
fn regular_file_at_symlink_path_is_left_alone() {
    let harness = Harness::new();
    let def = &harness.definition;
    std::fs::create_dir_all(def.symlink_path.parent().unwrap()).unwrap();
    std::fs::write(&def.symlink_path, "operator script").unwrap();
    let artifact = harness.artifact("reasonkit-web", "1.0.0");

    let report = install(&harness, &InstallOptions::default().with_binary(&artifact))
        .expect("Install should succeed");

    assert!(report.warnings.iter().any(|w| w.contains("not a symlink")));
    assert_eq!(std::fs::read_to_string(&def.symlink_path).unwrap(), "operator script");
}

#[test]
fn untested_platform_requires_confirmation() {
    let host = FakeHost::default();
    *host.os_release.borrow_mut() = Some("ID=ubuntu\nVERSION_ID=\"18.04\"\n".to_string());
    let harness = Harness::with_host(host);
    let artifact = harness.artifact("reasonkit-web", "1.0.0");
    let options = InstallOptions::default().with_binary(&artifact);

    let declined = InstallCommand::new(harness.ctx(), &FixedAnswer::NO).execute(&options);
    assert!(matches!(declined, Err(LifecycleError::PlatformMismatch(_))));
    assert!(!harness.definition.config_dir.exists());

    let report = install(&harness, &options).expect("Confirmed install should succeed");
    assert!(report.warnings.iter().any(|w| w.contains("older than the minimum")));
}

#[test]
fn missing_supervisor_is_fatal() {
    let harness = Harness::new();
    harness.supervisor.availability.set(SupervisorAvailability::Missing);
    let artifact = harness.artifact("reasonkit-web", "1.0.0");

    let err = install(&harness, &InstallOptions::default().with_binary(&artifact))
        .expect_err("Install should fail");

    assert!(matches!(err, LifecycleError::MissingDependency(_)));
    assert!(!harness.host.group_exists("reasonkit"));
}

#[test]
fn missing_utilities_are_installed_unless_skipped() {
    let host = FakeHost::default();
    host.commands.borrow_mut().remove("curl");
    let harness = Harness::with_host(host);
    let artifact = harness.artifact("reasonkit-web", "1.0.0");

    let report = install(
        &harness,
        &InstallOptions::default()
            .with_binary(&artifact)
            .with_skip_dependencies(true),
    )
    .expect("Install should succeed");
    assert!(report.warnings.iter().any(|w| w.contains("curl")));
    assert!(harness.host.installed_packages.borrow().is_empty());

    install(&harness, &InstallOptions::default().with_binary(&artifact))
        .expect("Install should succeed");
    assert_eq!(*harness.host.installed_packages.borrow(), vec!["curl".to_string()]);
}

#[test]
fn skip_account_requires_existing_account() {
    let harness = Harness::new();
    let artifact = harness.artifact("reasonkit-web", "1.0.0");
    let options = InstallOptions::default()
        .with_binary(&artifact)
        .with_skip_account(true);

    let err = install(&harness, &options).expect_err("Install should fail");
    assert!(matches!(err, LifecycleError::AccountProvisioningError { .. }));

    harness.host.add_account("reasonkit", "reasonkit");
    install(&harness, &options).expect("Install should succeed with pre-made account");
    assert_eq!(harness.host.accounts_created.get(), 0);
}

#[test]
fn concurrent_invocation_is_refused() {
    let harness = Harness::new();
    let artifact = harness.artifact("reasonkit-web", "1.0.0");
    let _held = InvocationLock::acquire(&harness.definition.lock_path).expect("lock should be free");

    let err = install(&harness, &InstallOptions::default().with_binary(&artifact))
        .expect_err("Install should be refused");

    assert!(matches!(err, LifecycleError::ConcurrentInvocation { .. }));
    assert!(!harness.definition.config_dir.exists());
}
