//! Efuse provisioning through a throwaway emulator instance
//!
//! The efuse utility talks to the chip's ROM bootloader over a serial port,
//! so it can't use the main session. Instead a second instance is started in
//! download strap mode with its UART on a loopback TCP socket, the utility
//! is pointed at `socket://localhost:<port>`, and the instance is killed
//! afterwards no matter how the utility fared.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use rhil_core::Target;

use crate::args::{split_args, LOCALHOST};
use crate::command::QemuCommand;
use crate::efuse::{efuse_args, STRAP_MODE_DOWNLOAD};
use crate::error::{QemuError, Result};
use crate::port::free_tcp_port;
use crate::process::QemuProcess;
use crate::qmp::QmpClient;

/// Utility flag that would otherwise prompt for confirmation
const DO_NOT_CONFIRM: &str = "--do-not-confirm";

/// Provisioning runner settings
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// Efuse utility program
    pub espefuse_program: String,
    /// Console text marking the instance as ready
    pub banner: String,
    /// How long to wait for the banner
    pub banner_timeout: Duration,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            espefuse_program: "espefuse.py".to_string(),
            banner: "qemu".to_string(),
            banner_timeout: Duration::from_secs(30),
        }
    }
}

/// Arguments for the provisioning instance
pub fn provision_args(target: &Target, image: &Path, efuse: &Path, serial_port: u16) -> Vec<String> {
    let mut args = vec![
        "-nographic".to_string(),
        "-machine".to_string(),
        target.to_string(),
        "-drive".to_string(),
        format!("file={},if=mtd,format=raw", image.display()),
    ];
    args.extend(efuse_args(target, efuse, STRAP_MODE_DOWNLOAD));
    args.push("-serial".to_string());
    args.push(format!("tcp::{},server,nowait", serial_port));
    args
}

/// Arguments for the efuse utility
///
/// The user's `--do-not-confirm` is dropped since it is always passed.
pub fn espefuse_args(command: &str, serial_port: u16) -> Result<Vec<String>> {
    let mut args = vec![
        "--port".to_string(),
        format!("socket://localhost:{}", serial_port),
        "--before".to_string(),
        "no_reset".to_string(),
        DO_NOT_CONFIRM.to_string(),
    ];
    args.extend(split_args(command)?.into_iter().filter(|a| a != DO_NOT_CONFIRM));
    Ok(args)
}

/// Run an efuse utility command against the session's efuse file
///
/// After the utility has run (successfully or not) the main session is
/// reset over `qmp` so it picks up the new efuse values. The provisioning
/// instance is terminated on every path.
pub fn execute_efuse_command(
    session: &QemuCommand,
    qmp: &QmpClient,
    command: &str,
    config: &ProvisionConfig,
) -> Result<()> {
    let efuse_path = session.efuse_path().ok_or(QemuError::NoEfusePath)?;
    let serial_port = free_tcp_port(LOCALHOST)?;
    let utility_args = espefuse_args(command, serial_port)?;
    let args = provision_args(session.target(), session.image_path(), efuse_path, serial_port);

    let mut instance = QemuProcess::spawn(session.program(), &args)?;

    let result = instance
        .expect_exact(&config.banner, config.banner_timeout)
        .map(|_| run_utility(&config.espefuse_program, &utility_args));

    let outcome = match result {
        Ok(utility) => {
            let reset = qmp.system_reset();
            utility.and(reset)
        }
        Err(e) => Err(e),
    };

    if let Err(e) = instance.terminate() {
        log::warn!("Failed to terminate provisioning instance: {}", e);
    }
    outcome
}

fn run_utility(program: &str, args: &[String]) -> Result<()> {
    log::info!("Running {} {}", program, args.join(" "));
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|source| QemuError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(QemuError::ProvisionFailed {
            program: program.to_string(),
            status: status.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_args() {
        let args = provision_args(
            &Target::new("esp32"),
            Path::new("/b/flash_image.bin"),
            Path::new("/b/efuse.bin"),
            5555,
        );
        assert_eq!(
            args,
            vec![
                "-nographic",
                "-machine",
                "esp32",
                "-drive",
                "file=/b/flash_image.bin,if=mtd,format=raw",
                "-global",
                "driver=esp32.gpio,property=strap_mode,value=0x0f",
                "-drive",
                "file=/b/efuse.bin,if=none,format=raw,id=efuse",
                "-global",
                "driver=nvram.esp32.efuse,property=drive,value=efuse",
                "-serial",
                "tcp::5555,server,nowait",
            ]
        );
    }

    #[test]
    fn test_espefuse_args() {
        let args = espefuse_args("--do-not-confirm burn_efuse JTAG_DISABLE 1", 4000).unwrap();
        assert_eq!(
            args,
            vec![
                "--port",
                "socket://localhost:4000",
                "--before",
                "no_reset",
                "--do-not-confirm",
                "burn_efuse",
                "JTAG_DISABLE",
                "1",
            ]
        );
    }
}

#[cfg(all(test, unix))]
mod runner_tests {
    use super::*;
    use crate::command::QemuConfig;
    use crate::qmp::tests::{fake_qmp_server, ok_reply};
    use rhil_core::AppDescriptor;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    struct Fixture {
        _dir: tempfile::TempDir,
        command: QemuCommand,
        qmp: QmpClient,
        requests: std::sync::mpsc::Receiver<serde_json::Value>,
    }

    /// Session whose "emulator" is a script printing a monitor prompt
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let fake_qemu = dir.path().join("fake-qemu");
        fs::write(&fake_qemu, "#!/bin/sh\nprintf '(qemu) '\nsleep 30\n").unwrap();
        fs::set_permissions(&fake_qemu, fs::Permissions::from_mode(0o755)).unwrap();
        let image = dir.path().join("flash_image.bin");
        fs::write(&image, [0u8; 16]).unwrap();

        let (addr, requests) = fake_qmp_server(ok_reply);
        let config = QemuConfig {
            image_path: Some(image),
            prog_path: Some(fake_qemu.display().to_string()),
            cli_args: Some(format!("-nographic -qmp {}", addr.server_arg())),
            efuse_path: Some(dir.path().join("efuse.bin")),
            ..QemuConfig::default()
        };
        let app = AppDescriptor::Absent {
            app_path: PathBuf::from("/nonexistent"),
        };
        let command = QemuCommand::assemble(&config, &app).unwrap();

        Fixture {
            _dir: dir,
            command,
            qmp: QmpClient::new(addr),
            requests,
        }
    }

    fn provision_config(program: &str) -> ProvisionConfig {
        ProvisionConfig {
            espefuse_program: program.to_string(),
            banner_timeout: Duration::from_secs(10),
            ..ProvisionConfig::default()
        }
    }

    #[test]
    fn test_success_resets_session() {
        let f = fixture();
        execute_efuse_command(&f.command, &f.qmp, "burn_efuse JTAG_DISABLE 1", &provision_config("true"))
            .unwrap();

        assert_eq!(f.requests.recv().unwrap()["execute"], "qmp_capabilities");
        assert_eq!(f.requests.recv().unwrap()["execute"], "system_reset");
    }

    #[test]
    fn test_failure_still_resets() {
        let f = fixture();
        let err = execute_efuse_command(&f.command, &f.qmp, "summary", &provision_config("false"))
            .unwrap_err();
        assert!(matches!(err, QemuError::ProvisionFailed { .. }));

        f.requests.recv().unwrap();
        assert_eq!(f.requests.recv().unwrap()["execute"], "system_reset");
    }

    #[test]
    fn test_requires_efuse_path() {
        let f = fixture();
        let config = QemuConfig {
            image_path: Some(f.command.image_path().to_path_buf()),
            prog_path: Some(f.command.program().to_string()),
            ..QemuConfig::default()
        };
        let app = AppDescriptor::Absent {
            app_path: PathBuf::from("/nonexistent"),
        };
        let command = QemuCommand::assemble(&config, &app).unwrap();

        assert!(matches!(
            execute_efuse_command(&command, &f.qmp, "summary", &ProvisionConfig::default()),
            Err(QemuError::NoEfusePath)
        ));
    }
}
