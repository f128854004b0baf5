//! Flash argument manifest parsing
//!
//! The build writes `flasher_args.json` next to its binaries:
//!
//! ```json
//! {
//!     "flash_settings": { "flash_mode": "dio", "flash_size": "2MB", "flash_freq": "40m" },
//!     "flash_files": {
//!         "0x1000": "bootloader/bootloader.bin",
//!         "0x8000": "partition_table/partition-table.bin",
//!         "0x10000": "hello_world.bin"
//!     },
//!     "bootloader": { "offset": "0x1000", "file": "bootloader/bootloader.bin", "encrypted": "false" },
//!     "app": { "offset": "0x10000", "file": "hello_world.bin", "encrypted": "true" }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{FlashFile, FlashPlan};
use crate::error::{CoreError, Result};
use crate::util::parse_int;

/// File name of the flash manifest inside the binary directory
pub const FLASH_ARGS_FILENAME: &str = "flasher_args.json";

#[derive(Debug, Deserialize)]
struct FlashArgsFile {
    #[serde(default)]
    flash_files: BTreeMap<String, String>,
    #[serde(default)]
    flash_settings: BTreeMap<String, Value>,
    /// Per-tool metadata entries; anything that isn't an object is ignored
    #[serde(flatten)]
    entries: Map<String, Value>,
}

/// Read the flash manifest from a binary directory
///
/// Returns `Ok(None)` when the directory has no manifest, which is the
/// case for host-only builds.
pub fn read_flash_args(binary_dir: &Path) -> Result<Option<FlashPlan>> {
    let path = binary_dir.join(FLASH_ARGS_FILENAME);
    if !path.is_file() {
        log::debug!("{} not found, nothing to flash", path.display());
        return Ok(None);
    }

    let text = fs::read_to_string(&path).map_err(|source| CoreError::Io {
        path: path.clone(),
        source,
    })?;
    let plan = parse_flash_args(&text, binary_dir).map_err(|e| match e {
        ParseError::Json(source) => CoreError::Json {
            path: path.clone(),
            source,
        },
        ParseError::Offset(offset) => CoreError::InvalidOffset {
            path: path.clone(),
            offset,
        },
    })?;

    log::debug!(
        "Loaded {} flash files from {} (encrypt={})",
        plan.len(),
        path.display(),
        plan.settings().encrypt()
    );
    Ok(Some(plan))
}

#[derive(Debug)]
enum ParseError {
    Json(serde_json::Error),
    Offset(String),
}

fn parse_flash_args(text: &str, binary_dir: &Path) -> std::result::Result<FlashPlan, ParseError> {
    let args: FlashArgsFile = serde_json::from_str(text).map_err(ParseError::Json)?;

    let mut files = Vec::with_capacity(args.flash_files.len());
    for (offset_str, rel_path) in &args.flash_files {
        let offset = parse_int(offset_str).ok_or_else(|| ParseError::Offset(offset_str.clone()))?;
        let encrypted = is_encrypted(&args.entries, offset_str, offset, rel_path);
        files.push(FlashFile::new(offset, binary_dir.join(rel_path), encrypted));
    }

    Ok(FlashPlan::new(files, args.flash_settings))
}

/// Look up the `encrypted` flag of the metadata entry for `(offset, file)`
///
/// Entries that don't have the `{offset, file, encrypted}` shape are skipped.
fn is_encrypted(entries: &Map<String, Value>, offset_str: &str, offset: u64, file: &str) -> bool {
    for entry in entries.values() {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        let (Some(entry_offset), Some(entry_file)) = (obj.get("offset"), obj.get("file")) else {
            continue;
        };

        let offset_matches = match entry_offset {
            Value::String(s) => s == offset_str,
            Value::Number(n) => n.as_u64() == Some(offset),
            _ => false,
        };
        if offset_matches && entry_file.as_str() == Some(file) {
            return match obj.get("encrypted") {
                Some(Value::String(s)) => s == "true",
                Some(Value::Bool(b)) => *b,
                _ => false,
            };
        }
    }

    false
}
