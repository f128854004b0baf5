//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a number of seconds into a [`std::time::Duration`]
fn parse_secs(s: &str) -> Result<std::time::Duration, String> {
    s.parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(std::time::Duration::from_secs_f64)
        .ok_or_else(|| format!("Invalid number of seconds: {}", s))
}

#[derive(Parser)]
#[command(name = "rhil")]
#[command(author, version, about = "Emulator-backed firmware test harness", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where to find the application's build output
#[derive(clap::Args, Debug, Clone, Default)]
pub struct AppArgs {
    /// Application root (defaults to the current directory)
    #[arg(long)]
    pub app_path: Option<PathBuf>,

    /// Build directory, absolute or relative to the application root
    #[arg(long)]
    pub build_dir: Option<PathBuf>,

    /// Partition tool (defaults to gen_esp32part.py under $IDF_PATH)
    #[arg(long)]
    pub part_tool: Option<PathBuf>,
}

/// Emulator options shared across commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct QemuArgs {
    /// Flash image (defaults to flash_image.bin)
    #[arg(long)]
    pub qemu_image_path: Option<PathBuf>,

    /// Emulator program (defaults to qemu-system-<arch> for the target)
    #[arg(long)]
    pub qemu_prog_path: Option<String>,

    /// Replace the default emulator arguments
    #[arg(long, allow_hyphen_values = true)]
    pub qemu_cli_args: Option<String>,

    /// Append to the emulator arguments
    #[arg(long, allow_hyphen_values = true)]
    pub qemu_extra_args: Option<String>,

    /// Efuse file, overwritten with the target's blank image
    #[arg(long)]
    pub qemu_efuse_path: Option<PathBuf>,

    /// Instance index, added to a user-supplied QMP port
    #[arg(long, default_value_t = 0)]
    pub dut_index: u16,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Application build output
    #[command(subcommand)]
    App(AppCommands),

    /// Emulator operations
    #[command(subcommand)]
    Qemu(QemuCommands),
}

/// Application subcommands
#[derive(Subcommand)]
pub enum AppCommands {
    /// Show what was found in the build directory
    Show {
        #[command(flatten)]
        app: AppArgs,
    },
}

/// Emulator subcommands
#[derive(Subcommand)]
pub enum QemuCommands {
    /// Print the emulator command line without running it
    Cmdline {
        #[command(flatten)]
        app: AppArgs,

        #[command(flatten)]
        qemu: QemuArgs,
    },

    /// Run the emulator
    Run {
        #[command(flatten)]
        app: AppArgs,

        #[command(flatten)]
        qemu: QemuArgs,

        /// Stop once this text appears on the console
        #[arg(long)]
        expect: Option<String>,

        /// Seconds to wait for --expect
        #[arg(long, default_value = "30", value_parser = parse_secs)]
        timeout: std::time::Duration,
    },

    /// Reset a running emulator over QMP
    Reset {
        /// QMP socket, e.g. tcp:127.0.0.1:4488
        #[arg(long)]
        qmp: String,
    },

    /// Save a running emulator's display over QMP
    Screenshot {
        /// QMP socket, e.g. tcp:127.0.0.1:4488
        #[arg(long)]
        qmp: String,

        /// Output file (PPM)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Start the emulator with a fresh efuse file and run efuse commands
    Efuse {
        #[command(flatten)]
        app: AppArgs,

        #[command(flatten)]
        qemu: QemuArgs,

        /// Efuse utility command, e.g. "burn_efuse JTAG_DISABLE 1" (repeatable)
        #[arg(short, long = "command", required = true, allow_hyphen_values = true)]
        commands: Vec<String>,

        /// Efuse utility program
        #[arg(long, default_value = "espefuse.py")]
        espefuse: String,

        /// Seconds to wait for the provisioning instance to come up
        #[arg(long, default_value = "30", value_parser = parse_secs)]
        banner_timeout: std::time::Duration,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_qemu_flags() {
        let cli = Cli::try_parse_from([
            "rhil",
            "qemu",
            "cmdline",
            "--app-path",
            "hello_world",
            "--qemu-extra-args",
            "-d guest_errors",
            "--dut-index",
            "1",
        ])
        .unwrap();

        match cli.command {
            Commands::Qemu(QemuCommands::Cmdline { app, qemu }) => {
                assert_eq!(app.app_path, Some(PathBuf::from("hello_world")));
                assert_eq!(qemu.qemu_extra_args.as_deref(), Some("-d guest_errors"));
                assert_eq!(qemu.dut_index, 1);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_efuse_requires_command() {
        assert!(Cli::try_parse_from(["rhil", "qemu", "efuse"]).is_err());
    }

    #[test]
    fn test_parse_secs() {
        assert_eq!(parse_secs("1.5").unwrap(), std::time::Duration::from_millis(1500));
        assert!(parse_secs("-1").is_err());
        assert!(parse_secs("soon").is_err());
    }
}
