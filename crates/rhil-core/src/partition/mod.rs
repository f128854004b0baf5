//! Partition table support
//!
//! The partition table is only available in binary form inside the flash
//! plan. It is decoded by running the SDK's partition tool over each
//! candidate file and parsing the CSV it prints:
//!
//! ```ignore
//! let tool = PartitionTool::locate(None).expect("IDF_PATH not set");
//! if let Some(resolved) = tool.resolve(&plan, binary_dir)? {
//!     let factory = resolved.table.get("factory");
//! }
//! ```

mod csv;
mod tool;
mod types;

pub use csv::parse_partition_csv;
pub use tool::{PartitionTool, ResolvedPartitions, IDF_PATH_ENV};
pub use types::*;
