//! Flash plan support
//!
//! A flash plan is the set of binaries the build wants written into device
//! storage, each at its own offset, plus the flash tool settings that go with
//! them. It is read from the `flasher_args.json` manifest:
//!
//! ```ignore
//! if let Some(plan) = read_flash_args(Path::new("build"))? {
//!     for file in plan.files() {
//!         println!("{:#x} {}", file.offset, file.path.display());
//!     }
//! }
//! ```

mod manifest;
mod types;

pub use manifest::{read_flash_args, FLASH_ARGS_FILENAME};
pub use types::*;
