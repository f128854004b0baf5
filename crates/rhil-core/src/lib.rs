//! rhil-core - Build artifact model for emulator-backed firmware tests
//!
//! This crate turns the heterogeneous output of a firmware build into one
//! normalized, immutable [`AppDescriptor`]:
//!
//! - [`flash`]: flash plan from the `flasher_args.json` manifest
//! - [`partition`]: partition table decoded by the SDK partition tool
//! - [`sdkconfig`]: build configuration snapshot and target chip
//! - [`target`]: target chip identifiers and architecture families
//!
//! # Example
//!
//! ```no_run
//! use rhil_core::{AppConfig, AppDescriptor};
//!
//! let app = AppDescriptor::load(&AppConfig::new("examples/hello_world"))?;
//! if let Some(built) = app.built() {
//!     println!("target: {}", built.target());
//!     for file in built.flash().map(|p| p.files()).unwrap_or_default() {
//!         println!("{:#x} {}", file.offset, file.path.display());
//!     }
//! }
//! # Ok::<(), rhil_core::CoreError>(())
//! ```

pub mod app;
pub mod error;
pub mod flash;
pub mod partition;
pub mod sdkconfig;
pub mod target;
mod util;

pub use app::{AppConfig, AppDescriptor, BuiltApp};
pub use error::{CandidateFailure, CoreError, Result};
pub use flash::{FlashFile, FlashPlan, FlashSettings};
pub use partition::{PartitionEntry, PartitionTable, PartitionTool};
pub use sdkconfig::SdkConfig;
pub use target::{Arch, Target};
