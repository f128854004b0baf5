//! Error types for QEMU operations

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// QEMU launcher, QMP and provisioning errors
#[derive(Debug, Error)]
pub enum QemuError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Flash image passed to QEMU doesn't exist
    #[error("QEMU image path doesn't exist: {}", .0.display())]
    ImageNotFound(PathBuf),

    /// An argument string couldn't be split into shell words
    #[error("Invalid QEMU argument string: {0}")]
    InvalidArgs(String),

    /// QMP was configured with something other than a TCP socket
    #[error("Please use TCP for qmp, example: -qmp tcp:localhost:4488,server,wait=off (got '{0}')")]
    QmpNotTcp(String),

    /// QMP address doesn't have the `tcp:<host>:<port>` shape
    #[error("Malformed QMP address: '{0}'")]
    QmpAddress(String),

    /// Instance index pushed the QMP port past 65535
    #[error("QMP port {port} + instance index {index} is out of range")]
    PortOverflow { port: u16, index: u16 },

    /// No default efuse image exists for the target
    #[error("No default efuse image for target '{0}'")]
    UnsupportedEfuseTarget(String),

    /// Operation needs an efuse file but none was configured
    #[error("No efuse file configured for this QEMU session")]
    NoEfusePath,

    /// Failed to write the efuse file
    #[error("Failed to write efuse file '{path}': {source}")]
    EfuseWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to start a process
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Failed to connect to the QMP socket
    #[error("QMP connection to {addr} failed: {source}")]
    QmpConnect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// QMP server sent something unexpected
    #[error("QMP protocol error: {0}")]
    QmpProtocol(String),

    /// QMP server answered with an error object
    #[error("QMP command '{command}' failed: {class}: {desc}")]
    QmpCommand {
        command: String,
        class: String,
        desc: String,
    },

    /// Operation didn't finish in time
    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    /// Console closed before the expected output appeared
    #[error("Console closed before '{0}' appeared")]
    ConsoleClosed(String),

    /// Provisioning utility exited with failure
    #[error("'{program}' failed with {status}")]
    ProvisionFailed { program: String, status: String },
}

/// Result type for QEMU operations
pub type Result<T> = std::result::Result<T, QemuError>;
