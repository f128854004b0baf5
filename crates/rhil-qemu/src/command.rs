//! QEMU command line assembly
//!
//! [`QemuCommand::assemble`] turns a [`QemuConfig`] and an application
//! descriptor into the full argument list for one emulator instance:
//!
//! ```text
//! <program> <cli args> <extra args> [efuse args] -drive file=<image>,if=mtd,format=raw
//! ```
//!
//! The QMP control socket is either taken from the user's `-qmp` flag
//! (shifted by the instance index) or allocated on a free loopback port.

use std::path::{Path, PathBuf};

use rhil_core::{AppDescriptor, Target};

use crate::args::{offset_qmp_arg, split_args, strip_outer_quotes, QmpAddr, LOCALHOST, QMP_FLAG};
use crate::efuse::{self, STRAP_MODE_BOOT};
use crate::error::{QemuError, Result};
use crate::port::free_tcp_port;

/// Flash image used when none is configured
pub const DEFAULT_IMAGE_FN: &str = "flash_image.bin";

/// Emulator program when there is no application to derive it from
pub const QEMU_PROG_PATH: &str = "qemu-system-xtensa";

/// Default arguments when there is no application to derive them from
pub const QEMU_DEFAULT_ARGS: &str = "-nographic -machine esp32";

/// Emulator configuration, one field per recognized option
#[derive(Debug, Clone, Default)]
pub struct QemuConfig {
    /// Flash image; defaults to [`DEFAULT_IMAGE_FN`]
    pub image_path: Option<PathBuf>,
    /// Emulator program; derived from the target architecture by default
    pub prog_path: Option<String>,
    /// Replaces the default arguments
    pub cli_args: Option<String>,
    /// Appended after the (default or explicit) arguments
    pub extra_args: Option<String>,
    /// Efuse file; when set it is overwritten with a blank image
    pub efuse_path: Option<PathBuf>,
    /// Instance index added to a user-supplied QMP port
    pub dut_index: u16,
}

/// Fully assembled emulator command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QemuCommand {
    program: String,
    args: Vec<String>,
    qmp: QmpAddr,
    image_path: PathBuf,
    efuse_path: Option<PathBuf>,
    target: Target,
}

/// Emulator program for the application's target
pub fn qemu_prog_name(app: &AppDescriptor) -> String {
    match app.target() {
        Some(target) => format!("qemu-system-{}", target.arch()),
        None => QEMU_PROG_PATH.to_string(),
    }
}

/// Default emulator arguments for the application's target
pub fn qemu_default_args(app: &AppDescriptor) -> String {
    match app.target() {
        Some(target) => format!("-nographic -machine {}", target),
        None => QEMU_DEFAULT_ARGS.to_string(),
    }
}

impl QemuCommand {
    /// Assemble the command line
    ///
    /// Fails without side effects if the image is missing, an argument
    /// string is malformed, the QMP flag isn't a TCP socket, or an efuse
    /// file is requested for a target without a default efuse image. When
    /// an efuse path is configured the file is (over)written.
    pub fn assemble(config: &QemuConfig, app: &AppDescriptor) -> Result<Self> {
        // empty options fall back to the defaults
        let image_path = config
            .image_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_FN));
        if !image_path.exists() {
            return Err(QemuError::ImageNotFound(image_path));
        }

        let program = config
            .prog_path
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| qemu_prog_name(app));
        let target = app.target().cloned().unwrap_or_default();

        let cli_args = match config
            .cli_args
            .as_deref()
            .map(strip_outer_quotes)
            .filter(|s| !s.trim().is_empty())
        {
            Some(s) => split_args(s)?,
            None => split_args(&qemu_default_args(app))?,
        };
        let mut extra_args = split_args(config.extra_args.as_deref().unwrap_or(""))?;

        if let Some(efuse_path) = &config.efuse_path {
            // validate before touching the file
            if !efuse::is_supported(&target) {
                return Err(QemuError::UnsupportedEfuseTarget(target.name().to_string()));
            }
            extra_args.extend(efuse::efuse_args(&target, efuse_path, STRAP_MODE_BOOT));
        }

        let (cli_args, qmp) = match offset_qmp_arg(cli_args, config.dut_index)? {
            (args, Some(addr)) => (args, addr),
            (mut args, None) => {
                // freshly allocated, so the instance index doesn't apply
                let addr = QmpAddr::new(LOCALHOST, free_tcp_port(LOCALHOST)?);
                args.push(QMP_FLAG.to_string());
                args.push(addr.server_arg());
                (args, addr)
            }
        };

        if let Some(efuse_path) = &config.efuse_path {
            efuse::write_default_efuse(efuse_path, &target)?;
        }

        let mut args = cli_args;
        args.extend(extra_args);
        args.push("-drive".to_string());
        args.push(format!("file={},if=mtd,format=raw", image_path.display()));

        log::debug!("QEMU command: {} {}", program, args.join(" "));

        Ok(Self {
            program,
            args,
            qmp,
            image_path,
            efuse_path: config.efuse_path.clone(),
            target,
        })
    }

    /// Emulator program
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments after the program name
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// QMP control socket address
    pub fn qmp(&self) -> &QmpAddr {
        &self.qmp
    }

    /// Flash image attached as the MTD drive
    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    /// Efuse file attached to the instance, if any
    pub fn efuse_path(&self) -> Option<&Path> {
        self.efuse_path.as_deref()
    }

    /// Target chip the instance emulates
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Program followed by arguments
    pub fn to_vec(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Command line quoted for a POSIX shell
    pub fn to_shell_string(&self) -> String {
        shlex::try_join(self.to_vec().iter().map(String::as_str))
            .unwrap_or_else(|_| self.to_vec().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhil_core::AppConfig;
    use std::fs;

    fn absent_app() -> AppDescriptor {
        AppDescriptor::Absent {
            app_path: PathBuf::from("/nonexistent"),
        }
    }

    fn built_app(dir: &Path, target: &str) -> AppDescriptor {
        let build = dir.join("build");
        fs::create_dir_all(build.join("config")).unwrap();
        fs::write(
            build.join("config/sdkconfig.json"),
            format!(r#"{{"IDF_TARGET": "{}"}}"#, target),
        )
        .unwrap();
        let config = AppConfig::new(dir).with_part_tool(dir.join("missing.py"));
        AppDescriptor::load(&config).unwrap()
    }

    fn image(dir: &Path) -> PathBuf {
        let path = dir.join("flash_image.bin");
        fs::write(&path, vec![0xffu8; 4096]).unwrap();
        path
    }

    fn qmp_values(cmd: &QemuCommand) -> Vec<&str> {
        cmd.args()
            .windows(2)
            .filter(|w| w[0] == QMP_FLAG)
            .map(|w| w[1].as_str())
            .collect()
    }

    #[test]
    fn test_missing_image() {
        let config = QemuConfig {
            image_path: Some(PathBuf::from("/nonexistent/flash_image.bin")),
            ..QemuConfig::default()
        };
        assert!(matches!(
            QemuCommand::assemble(&config, &absent_app()),
            Err(QemuError::ImageNotFound(_))
        ));
    }

    #[test]
    fn test_legacy_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let image = image(dir.path());
        let config = QemuConfig {
            image_path: Some(image.clone()),
            ..QemuConfig::default()
        };

        let cmd = QemuCommand::assemble(&config, &absent_app()).unwrap();
        assert_eq!(cmd.program(), "qemu-system-xtensa");
        assert_eq!(&cmd.args()[..3], ["-nographic", "-machine", "esp32"]);
        assert_eq!(
            cmd.args().last().unwrap(),
            &format!("file={},if=mtd,format=raw", image.display())
        );
        assert_eq!(cmd.target().name(), "esp32");
    }

    #[test]
    fn test_target_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let app = built_app(dir.path(), "esp32c3");
        let config = QemuConfig {
            image_path: Some(image(dir.path())),
            ..QemuConfig::default()
        };

        let cmd = QemuCommand::assemble(&config, &app).unwrap();
        assert_eq!(cmd.program(), "qemu-system-riscv32");
        assert_eq!(&cmd.args()[..3], ["-nographic", "-machine", "esp32c3"]);
    }

    #[test]
    fn test_explicit_args_and_prog() {
        let dir = tempfile::tempdir().unwrap();
        let config = QemuConfig {
            image_path: Some(image(dir.path())),
            prog_path: Some("/opt/qemu/bin/qemu-system-xtensa".to_string()),
            cli_args: Some("\"-nographic -machine esp32 -m 4M\"".to_string()),
            extra_args: Some("-d guest_errors".to_string()),
            ..QemuConfig::default()
        };

        let cmd = QemuCommand::assemble(&config, &absent_app()).unwrap();
        assert_eq!(cmd.program(), "/opt/qemu/bin/qemu-system-xtensa");
        assert_eq!(
            &cmd.args()[..5],
            ["-nographic", "-machine", "esp32", "-m", "4M"]
        );
        let pos = cmd.args().iter().position(|a| a == "-d").unwrap();
        assert_eq!(cmd.args()[pos + 1], "guest_errors");
        // extra args follow the cli args, including the generated -qmp
        assert!(pos > cmd.args().iter().position(|a| a == QMP_FLAG).unwrap());
    }

    #[test]
    fn test_empty_options_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let image = image(dir.path());
        let app = built_app(dir.path(), "esp32c3");

        for cli_args in ["", "\"\"", "''", "  "] {
            let config = QemuConfig {
                image_path: Some(image.clone()),
                prog_path: Some(String::new()),
                cli_args: Some(cli_args.to_string()),
                ..QemuConfig::default()
            };

            let cmd = QemuCommand::assemble(&config, &app).unwrap();
            assert_eq!(cmd.program(), "qemu-system-riscv32");
            assert_eq!(&cmd.args()[..3], ["-nographic", "-machine", "esp32c3"]);
        }
    }

    #[test]
    fn test_empty_image_path_uses_default_name() {
        let config = QemuConfig {
            image_path: Some(PathBuf::new()),
            ..QemuConfig::default()
        };
        // the default file name is resolved against the working directory
        match QemuCommand::assemble(&config, &absent_app()) {
            Err(QemuError::ImageNotFound(path)) => {
                assert_eq!(path, PathBuf::from(DEFAULT_IMAGE_FN))
            }
            Ok(cmd) => assert_eq!(cmd.image_path(), Path::new(DEFAULT_IMAGE_FN)),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_qmp_offset_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let config = QemuConfig {
            image_path: Some(image(dir.path())),
            cli_args: Some("-nographic -machine esp32 -qmp tcp:127.0.0.1:4488,server,wait=off".to_string()),
            dut_index: 2,
            ..QemuConfig::default()
        };

        let cmd = QemuCommand::assemble(&config, &absent_app()).unwrap();
        assert_eq!(qmp_values(&cmd), vec!["tcp:127.0.0.1:4490,server,wait=off"]);
        assert_eq!(cmd.qmp(), &QmpAddr::new("127.0.0.1", 4490));
    }

    #[test]
    fn test_qmp_allocated() {
        let dir = tempfile::tempdir().unwrap();
        let config = QemuConfig {
            image_path: Some(image(dir.path())),
            dut_index: 5,
            ..QemuConfig::default()
        };

        let cmd = QemuCommand::assemble(&config, &absent_app()).unwrap();
        let values = qmp_values(&cmd);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], cmd.qmp().server_arg());
        assert_eq!(cmd.qmp().host, LOCALHOST);
        assert_ne!(cmd.qmp().port, 0);
    }

    #[test]
    fn test_qmp_not_tcp() {
        let dir = tempfile::tempdir().unwrap();
        let config = QemuConfig {
            image_path: Some(image(dir.path())),
            cli_args: Some("-nographic -qmp unix:/tmp/qmp.sock,server".to_string()),
            ..QemuConfig::default()
        };
        assert!(matches!(
            QemuCommand::assemble(&config, &absent_app()),
            Err(QemuError::QmpNotTcp(_))
        ));
    }

    #[test]
    fn test_efuse_args_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let app = built_app(dir.path(), "esp32c3");
        let efuse_path = dir.path().join("efuse.bin");
        let config = QemuConfig {
            image_path: Some(image(dir.path())),
            efuse_path: Some(efuse_path.clone()),
            ..QemuConfig::default()
        };

        let cmd = QemuCommand::assemble(&config, &app).unwrap();
        let efuse_arg = format!("file={},if=none,format=raw,id=efuse", efuse_path.display());
        for expected in [
            "driver=esp32c3.gpio,property=strap_mode,value=0x08",
            efuse_arg.as_str(),
            "driver=nvram.esp32c3.efuse,property=drive,value=efuse",
        ] {
            assert_eq!(cmd.args().iter().filter(|a| *a == expected).count(), 1);
        }
        assert_eq!(fs::metadata(&efuse_path).unwrap().len(), 1024);
        assert_eq!(cmd.efuse_path(), Some(efuse_path.as_path()));
    }

    #[test]
    fn test_efuse_unsupported_target() {
        let dir = tempfile::tempdir().unwrap();
        let app = built_app(dir.path(), "esp32s3");
        let efuse_path = dir.path().join("efuse.bin");
        let config = QemuConfig {
            image_path: Some(image(dir.path())),
            efuse_path: Some(efuse_path.clone()),
            ..QemuConfig::default()
        };

        assert!(matches!(
            QemuCommand::assemble(&config, &app),
            Err(QemuError::UnsupportedEfuseTarget(t)) if t == "esp32s3"
        ));
        assert!(!efuse_path.exists());
    }

    #[test]
    fn test_shell_string() {
        let dir = tempfile::tempdir().unwrap();
        let config = QemuConfig {
            image_path: Some(image(dir.path())),
            cli_args: Some("-nographic -qmp tcp:127.0.0.1:4000,server,wait=off".to_string()),
            ..QemuConfig::default()
        };
        let cmd = QemuCommand::assemble(&config, &absent_app()).unwrap();
        assert!(cmd
            .to_shell_string()
            .starts_with("qemu-system-xtensa -nographic -qmp"));
        assert_eq!(cmd.to_vec().len(), cmd.args().len() + 1);
    }
}
