//! Production implementations backed by the running host.

use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::process::{Command, Output};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use nix::unistd::{Gid, Group, Uid, User};
use tracing::debug;

use crate::fs::is_executable_file;

use super::{Host, Ownership, PackageManager, Supervisor, SupervisorAvailability};

const CA_BUNDLES: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
];
const NOLOGIN_SHELLS: &[&str] = &["/usr/sbin/nologin", "/sbin/nologin"];
const KILL_GRACE_POLLS: u32 = 10;
const KILL_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// `useradd`/`userdel` exit code when the entry already exists / is absent.
const EXIT_ALREADY_EXISTS: i32 = 9;
const EXIT_NOT_FOUND: i32 = 6;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }
}

fn run(command: &mut Command) -> anyhow::Result<Output> {
    debug!(?command, "running");
    let output = command
        .output()
        .with_context(|| format!("Failed to execute {:?}", command.get_program()))?;
    if !output.status.success() {
        anyhow::bail!(
            "{:?} exited with {}: {}",
            command.get_program(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output)
}

/// Run a command that treats `tolerated` as success.
fn run_tolerating(command: &mut Command, tolerated: i32) -> anyhow::Result<()> {
    let output = command
        .output()
        .with_context(|| format!("Failed to execute {:?}", command.get_program()))?;
    if output.status.success() || output.status.code() == Some(tolerated) {
        return Ok(());
    }
    anyhow::bail!(
        "{:?} exited with {}: {}",
        command.get_program(),
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    )
}

impl Host for SystemHost {
    fn effective_uid(&self) -> u32 {
        nix::unistd::geteuid().as_raw()
    }

    fn os_release(&self) -> Option<String> {
        std::fs::read_to_string("/etc/os-release")
            .or_else(|_| std::fs::read_to_string("/usr/lib/os-release"))
            .ok()
    }

    fn has_command(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }

    fn is_executable(&self, path: &Path) -> bool {
        is_executable_file(path)
    }

    fn has_ca_bundle(&self) -> bool {
        CA_BUNDLES.iter().any(|bundle| Path::new(bundle).is_file())
    }

    fn install_packages(&self, manager: PackageManager, packages: &[&str]) -> anyhow::Result<()> {
        match manager {
            PackageManager::Apt => {
                run(Command::new("apt-get")
                    .args(["update", "-qq"])
                    .env("DEBIAN_FRONTEND", "noninteractive"))?;
                run(Command::new("apt-get")
                    .args(["install", "-y", "-qq"])
                    .args(packages)
                    .env("DEBIAN_FRONTEND", "noninteractive"))?;
            }
            PackageManager::Dnf | PackageManager::Yum => {
                run(Command::new(manager.command())
                    .args(["install", "-y", "-q"])
                    .args(packages))?;
            }
        }
        Ok(())
    }

    fn group_exists(&self, name: &str) -> bool {
        matches!(Group::from_name(name), Ok(Some(_)))
    }

    fn user_exists(&self, name: &str) -> bool {
        matches!(User::from_name(name), Ok(Some(_)))
    }

    fn create_group(&self, name: &str) -> anyhow::Result<()> {
        run_tolerating(
            Command::new("groupadd").arg("--system").arg(name),
            EXIT_ALREADY_EXISTS,
        )
    }

    fn create_user(&self, name: &str, group: &str) -> anyhow::Result<()> {
        let shell = NOLOGIN_SHELLS
            .iter()
            .find(|shell| Path::new(shell).exists())
            .copied()
            .unwrap_or("/usr/sbin/nologin");
        run_tolerating(
            Command::new("useradd")
                .arg("--system")
                .args(["--gid", group])
                .args(["--home-dir", "/nonexistent"])
                .arg("--no-create-home")
                .args(["--shell", shell])
                .args(["--comment", "ReasonKit service account"])
                .arg(name),
            EXIT_ALREADY_EXISTS,
        )
    }

    fn delete_user(&self, name: &str) -> anyhow::Result<()> {
        run_tolerating(Command::new("userdel").arg(name), EXIT_NOT_FOUND)
    }

    fn delete_group(&self, name: &str) -> anyhow::Result<()> {
        run_tolerating(Command::new("groupdel").arg(name), EXIT_NOT_FOUND)
    }

    fn kill_user_processes(&self, name: &str) -> anyhow::Result<()> {
        // pkill exits 1 when nothing matched.
        run_tolerating(Command::new("pkill").args(["-TERM", "-u", name]), 1)?;
        for _ in 0..KILL_GRACE_POLLS {
            let still_running = Command::new("pgrep")
                .args(["-u", name])
                .output()
                .map(|out| out.status.success())
                .unwrap_or(false);
            if !still_running {
                return Ok(());
            }
            thread::sleep(KILL_POLL_INTERVAL);
        }
        run_tolerating(Command::new("pkill").args(["-KILL", "-u", name]), 1)
    }

    fn owner(&self, path: &Path) -> anyhow::Result<Ownership> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let user = User::from_uid(Uid::from_raw(meta.uid()))
            .ok()
            .flatten()
            .map(|user| user.name)
            .unwrap_or_else(|| meta.uid().to_string());
        let group = Group::from_gid(Gid::from_raw(meta.gid()))
            .ok()
            .flatten()
            .map(|group| group.name)
            .unwrap_or_else(|| meta.gid().to_string());
        Ok(Ownership { user, group })
    }

    fn set_owner(&self, path: &Path, owner: &Ownership) -> anyhow::Result<()> {
        let user = User::from_name(&owner.user)
            .with_context(|| format!("Failed to look up user {}", owner.user))?
            .ok_or_else(|| anyhow::anyhow!("No such user: {}", owner.user))?;
        let group = Group::from_name(&owner.group)
            .with_context(|| format!("Failed to look up group {}", owner.group))?
            .ok_or_else(|| anyhow::anyhow!("No such group: {}", owner.group))?;
        nix::unistd::chown(path, Some(user.uid), Some(group.gid))
            .with_context(|| format!("Failed to chown {}", path.display()))?;
        Ok(())
    }

    fn binary_version(&self, binary: &Path) -> Option<String> {
        let output = Command::new(binary).arg("--version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }

    fn listening_sockets(&self, pid: u32) -> anyhow::Result<Vec<String>> {
        let output = run(Command::new("ss").arg("-Hlntup"))?;
        let marker = format!("pid={pid},");
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| line.contains(&marker))
            .filter_map(|line| line.split_whitespace().nth(4).map(str::to_string))
            .collect())
    }

    fn error_log_lines(&self, unit: &str, window: Duration) -> anyhow::Result<usize> {
        let since = format!("-{}s", window.as_secs());
        let output = run(Command::new("journalctl")
            .args(["-u", unit])
            .args(["--since", &since])
            .args(["-p", "err", "-q", "--no-pager", "-o", "cat"]))?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count())
    }

    fn hostname(&self) -> String {
        nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// `systemctl` front-end.
#[derive(Debug, Default, Clone, Copy)]
pub struct Systemctl;

impl Systemctl {
    pub fn new() -> Self {
        Self
    }

    fn control(&self, verb: &str, unit: &str) -> anyhow::Result<()> {
        run(Command::new("systemctl").args([verb, unit]))?;
        Ok(())
    }

    fn show(&self, unit: &str, property: &str) -> Option<String> {
        let output = Command::new("systemctl")
            .args(["show", unit, "-p", property, "--value"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn quiet(&self, verb: &str, unit: &str) -> bool {
        Command::new("systemctl")
            .args([verb, "--quiet", unit])
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl Supervisor for Systemctl {
    fn availability(&self) -> SupervisorAvailability {
        if which::which("systemctl").is_err() {
            return SupervisorAvailability::Missing;
        }
        if !Path::new("/run/systemd/system").is_dir() {
            return SupervisorAvailability::NotBooted;
        }
        SupervisorAvailability::Operational
    }

    fn daemon_reload(&self) -> anyhow::Result<()> {
        run(Command::new("systemctl").arg("daemon-reload"))?;
        Ok(())
    }

    fn start(&self, unit: &str) -> anyhow::Result<()> {
        self.control("start", unit)
    }

    fn stop(&self, unit: &str) -> anyhow::Result<()> {
        self.control("stop", unit)
    }

    fn restart(&self, unit: &str) -> anyhow::Result<()> {
        self.control("restart", unit)
    }

    fn enable(&self, unit: &str) -> anyhow::Result<()> {
        self.control("enable", unit)
    }

    fn disable(&self, unit: &str) -> anyhow::Result<()> {
        self.control("disable", unit)
    }

    fn is_active(&self, unit: &str) -> bool {
        self.quiet("is-active", unit)
    }

    fn is_enabled(&self, unit: &str) -> bool {
        self.quiet("is-enabled", unit)
    }

    fn main_pid(&self, unit: &str) -> Option<u32> {
        self.show(unit, "MainPID")
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|pid| *pid != 0)
    }

    fn memory_bytes(&self, unit: &str) -> Option<u64> {
        // "[not set]" when accounting is off.
        self.show(unit, "MemoryCurrent")
            .and_then(|value| value.parse::<u64>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_lookup_searches_path() {
        let host = SystemHost::new();
        assert!(host.has_command("sh"));
        assert!(!host.has_command("rksvc-no-such-command"));
    }

    #[test]
    fn executable_check_requires_exec_bit() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("tool");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        let host = SystemHost::new();
        assert!(!host.is_executable(&path));

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(host.is_executable(&path));
        assert!(!host.is_executable(temp.path()));
    }
}
