//! Running emulator session

use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use crate::command::QemuCommand;
use crate::error::Result;
use crate::process::QemuProcess;
use crate::provision::{self, ProvisionConfig};
use crate::qmp::QmpClient;

/// One emulator instance together with its control channel
///
/// Dropping the session kills the process.
pub struct QemuSession {
    command: QemuCommand,
    process: QemuProcess,
    qmp: QmpClient,
}

impl QemuSession {
    /// Launch the emulator described by `command`
    pub fn spawn(command: QemuCommand) -> Result<Self> {
        let process = QemuProcess::spawn(command.program(), command.args())?;
        let qmp = QmpClient::new(command.qmp().clone());
        log::info!(
            "QEMU started (pid {}), QMP on {}",
            process.id(),
            command.qmp()
        );
        Ok(Self {
            command,
            process,
            qmp,
        })
    }

    /// Command line the session was started with
    pub fn command(&self) -> &QemuCommand {
        &self.command
    }

    /// Control channel client
    pub fn qmp(&self) -> &QmpClient {
        &self.qmp
    }

    /// Reset the emulated machine
    pub fn hard_reset(&self) -> Result<()> {
        self.qmp.system_reset()
    }

    /// Dump the emulated display to `path`
    pub fn take_screenshot(&self, path: &Path) -> Result<()> {
        self.qmp.screendump(path)
    }

    /// Run an efuse utility command and reset the session afterwards
    pub fn execute_efuse_command(&self, command: &str, config: &ProvisionConfig) -> Result<()> {
        provision::execute_efuse_command(&self.command, &self.qmp, command, config)
    }

    /// Wait for `pattern` on the console, see [`QemuProcess::expect_exact`]
    pub fn expect_exact(&mut self, pattern: &str, timeout: Duration) -> Result<String> {
        self.process.expect_exact(pattern, timeout)
    }

    /// Send bytes to the emulator's console
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.process.write(data)
    }

    /// Exit status if the emulator has already exited
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.process.try_wait()
    }

    /// Block until the emulator exits on its own
    pub fn wait(&mut self) -> Result<ExitStatus> {
        self.process.wait()
    }

    /// Kill the emulator
    pub fn terminate(&mut self) -> Result<()> {
        self.process.terminate()
    }
}
