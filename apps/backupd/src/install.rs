use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;
use std::process::Command;

const SERVICE_NAME: &str = "valheim-backupd";
const SERVICE_PATH: &str = "/etc/systemd/system/valheim-backupd.service";

pub fn install(user: Option<String>, config: &Path) -> Result<()> {
    ensure_root()?;

    let exe = std::env::current_exe().context("Failed to resolve valheim-backupd path")?;
    let resolved_user = resolve_service_user(user);

    let unit = build_unit_file(&exe.to_string_lossy(), &config.to_string_lossy(), resolved_user.as_deref());
    fs::write(SERVICE_PATH, unit).with_context(|| format!("Failed to write {SERVICE_PATH}"))?;

    systemctl(&["daemon-reload"])?;
    systemctl(&["enable", "--now", SERVICE_NAME])?;

    println!("{SERVICE_NAME} service installed and started.");
    Ok(())
}

pub fn uninstall() -> Result<()> {
    ensure_root()?;

    if Path::new(SERVICE_PATH).exists() {
        systemctl(&["disable", "--now", SERVICE_NAME])?;
        fs::remove_file(SERVICE_PATH).with_context(|| format!("Failed to remove {SERVICE_PATH}"))?;
        systemctl(&["daemon-reload"])?;
        println!("{SERVICE_NAME} service removed.");
    } else {
        println!("{SERVICE_NAME} service is not installed.");
    }
    Ok(())
}

fn ensure_root() -> Result<()> {
    if !cfg!(target_os = "linux") {
        bail!("Service install is only supported on Linux systemd hosts.");
    }

    #[cfg(target_os = "linux")]
    {
        if unsafe { libc::geteuid() } != 0 {
            bail!("Service install requires root. Re-run with sudo.");
        }
    }
    Ok(())
}

fn systemctl(args: &[&str]) -> Result<()> {
    let status = Command::new("systemctl")
        .args(args)
        .status()
        .with_context(|| format!("Failed to run systemctl {}", args.join(" ")))?;
    if !status.success() {
        bail!("systemctl {} exited with {status}", args.join(" "));
    }
    Ok(())
}

fn resolve_service_user(explicit: Option<String>) -> Option<String> {
    if let Some(value) = explicit.map(|value| value.trim().to_string()) {
        if !value.is_empty() {
            return Some(value);
        }
    }

    if let Ok(value) = std::env::var("SUDO_USER") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    None
}

fn build_unit_file(exec_path: &str, config_path: &str, user: Option<&str>) -> String {
    let mut unit = String::new();
    unit.push_str("[Unit]\n");
    unit.push_str("Description=Valheim world backup service\n");
    unit.push_str("After=local-fs.target\n\n");
    unit.push_str("[Service]\n");
    unit.push_str("Type=notify\n");
    if let Some(user) = user {
        unit.push_str(&format!("User={}\n", user));
    }
    unit.push_str(&format!("ExecStart={} run --config {}\n", exec_path, config_path));
    // the startup backup runs before READY=1
    unit.push_str("TimeoutStartSec=infinity\n");
    unit.push_str("Restart=on-failure\n");
    unit.push_str("RestartSec=5\n");
    unit.push_str("Environment=RUST_LOG=info\n\n");
    unit.push_str("[Install]\n");
    unit.push_str("WantedBy=multi-user.target\n");
    unit
}
