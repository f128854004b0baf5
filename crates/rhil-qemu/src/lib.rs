//! rhil-qemu - Emulator side of the hardware-in-the-loop harness
//!
//! - [`command`]: assemble the QEMU command line for one instance
//! - [`qmp`]: blocking client for the QMP control socket
//! - [`session`]: spawned instance with console capture
//! - [`provision`]: efuse provisioning through a throwaway instance
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use rhil_core::{AppConfig, AppDescriptor};
//! use rhil_qemu::{QemuCommand, QemuConfig, QemuSession};
//!
//! let app = AppDescriptor::load(&AppConfig::new("."))?;
//! let command = QemuCommand::assemble(&QemuConfig::default(), &app)?;
//! let mut session = QemuSession::spawn(command)?;
//! session.expect_exact("Hello world!", Duration::from_secs(30))?;
//! session.hard_reset()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod args;
pub mod command;
pub mod efuse;
pub mod error;
pub mod port;
pub mod process;
pub mod provision;
pub mod qmp;
pub mod session;

pub use args::QmpAddr;
pub use command::{QemuCommand, QemuConfig, DEFAULT_IMAGE_FN};
pub use error::{QemuError, Result};
pub use provision::ProvisionConfig;
pub use qmp::QmpClient;
pub use session::QemuSession;
