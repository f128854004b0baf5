//! rhil - Emulator-backed firmware test harness
//!
//! Discovers an application's build output, assembles the QEMU command line
//! for it, and drives running instances over QMP:
//!
//! - `rhil app show` prints the flash plan, partition table and target
//! - `rhil qemu cmdline|run` assembles (and starts) an instance
//! - `rhil qemu reset|screenshot` talk to a running instance
//! - `rhil qemu efuse` provisions efuses through a throwaway instance

mod cli;
mod commands;

use clap::Parser;
use cli::{AppCommands, Cli, Commands, QemuCommands};
use rhil_qemu::ProvisionConfig;

/// Default log filter for the given `-v` count; `RUST_LOG` still wins
fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.verbose)),
    )
    .init();

    match cli.command {
        Commands::App(AppCommands::Show { app }) => commands::app::cmd_show(&app),
        Commands::Qemu(subcmd) => match subcmd {
            QemuCommands::Cmdline { app, qemu } => commands::qemu::cmd_cmdline(&app, &qemu),
            QemuCommands::Run {
                app,
                qemu,
                expect,
                timeout,
            } => commands::qemu::cmd_run(&app, &qemu, expect.as_deref(), timeout),
            QemuCommands::Reset { qmp } => commands::qemu::cmd_reset(&qmp),
            QemuCommands::Screenshot { qmp, output } => {
                commands::qemu::cmd_screenshot(&qmp, &output)
            }
            QemuCommands::Efuse {
                app,
                qemu,
                commands: efuse_commands,
                espefuse,
                banner_timeout,
            } => {
                let config = ProvisionConfig {
                    espefuse_program: espefuse,
                    banner_timeout,
                    ..ProvisionConfig::default()
                };
                commands::qemu::cmd_efuse(&app, &qemu, &efuse_commands, &config)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_filter() {
        assert_eq!(log_filter(0), "info");
        assert_eq!(log_filter(1), "debug");
        assert_eq!(log_filter(2), "trace");
        assert_eq!(log_filter(5), "trace");
    }

    #[test]
    fn test_verbose_flag_reaches_filter() {
        let cli = Cli::try_parse_from(["rhil", "-v", "app", "show"]).unwrap();
        assert_eq!(log_filter(cli.verbose), "debug");

        let cli = Cli::try_parse_from(["rhil", "app", "show", "-vv"]).unwrap();
        assert_eq!(log_filter(cli.verbose), "trace");
    }
}
