//! QEMU command implementations

use std::path::Path;
use std::time::Duration;

use rhil_core::{AppConfig, AppDescriptor};
use rhil_qemu::args::parse_qmp_value;
use rhil_qemu::{ProvisionConfig, QemuCommand, QemuConfig, QemuSession, QmpClient};

use crate::cli::{AppArgs, QemuArgs};

impl From<&QemuArgs> for QemuConfig {
    fn from(args: &QemuArgs) -> Self {
        QemuConfig {
            image_path: args.qemu_image_path.clone(),
            prog_path: args.qemu_prog_path.clone(),
            cli_args: args.qemu_cli_args.clone(),
            extra_args: args.qemu_extra_args.clone(),
            efuse_path: args.qemu_efuse_path.clone(),
            dut_index: args.dut_index,
        }
    }
}

fn assemble(app: &AppArgs, qemu: &QemuArgs) -> Result<QemuCommand, Box<dyn std::error::Error>> {
    let app = AppDescriptor::load(&AppConfig::from(app))?;
    Ok(QemuCommand::assemble(&QemuConfig::from(qemu), &app)?)
}

fn client(qmp: &str) -> Result<QmpClient, Box<dyn std::error::Error>> {
    let (addr, _) = parse_qmp_value(qmp)?;
    Ok(QmpClient::new(addr))
}

/// Print the assembled command line
pub fn cmd_cmdline(app: &AppArgs, qemu: &QemuArgs) -> Result<(), Box<dyn std::error::Error>> {
    let command = assemble(app, qemu)?;
    println!("{}", command.to_shell_string());
    Ok(())
}

/// Run the emulator until it exits, or until `expect` shows up
pub fn cmd_run(
    app: &AppArgs,
    qemu: &QemuArgs,
    expect: Option<&str>,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = QemuSession::spawn(assemble(app, qemu)?)?;
    println!("QMP listening on {}", session.command().qmp());

    match expect {
        Some(pattern) => {
            session.expect_exact(pattern, timeout)?;
            println!("Found '{}'", pattern);
            session.terminate()?;
        }
        None => {
            let status = session.wait()?;
            if !status.success() {
                return Err(format!("QEMU exited with {}", status).into());
            }
        }
    }
    Ok(())
}

/// Reset a running emulator
pub fn cmd_reset(qmp: &str) -> Result<(), Box<dyn std::error::Error>> {
    client(qmp)?.system_reset()?;
    println!("Reset sent");
    Ok(())
}

/// Save a running emulator's display
pub fn cmd_screenshot(qmp: &str, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    client(qmp)?.screendump(output)?;
    println!("Saved screenshot to {}", output.display());
    Ok(())
}

/// Start a session with a fresh efuse file and run each efuse command on it
pub fn cmd_efuse(
    app: &AppArgs,
    qemu: &QemuArgs,
    commands: &[String],
    config: &ProvisionConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if qemu.qemu_efuse_path.is_none() {
        return Err("--qemu-efuse-path is required for efuse commands".into());
    }

    let mut session = QemuSession::spawn(assemble(app, qemu)?)?;
    for command in commands {
        log::info!("Efuse command: {}", command);
        session.execute_efuse_command(command, config)?;
    }
    session.terminate()?;

    if let Some(path) = session.command().efuse_path() {
        println!("Efuse file updated: {}", path.display());
    }
    Ok(())
}
