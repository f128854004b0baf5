//! Flash plan types

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;

/// A binary blob to be written at a fixed flash offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashFile {
    /// Flash offset in bytes
    pub offset: u64,
    /// Absolute path of the blob
    pub path: PathBuf,
    /// Whether the blob is written with flash encryption
    pub encrypted: bool,
}

impl FlashFile {
    /// Create a new flash file entry
    pub fn new(offset: u64, path: impl Into<PathBuf>, encrypted: bool) -> Self {
        Self {
            offset,
            path: path.into(),
            encrypted,
        }
    }

    /// File name component of the blob path
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Flash tool settings from the build manifest
///
/// `encrypt` is derived from the flash files of the owning [`FlashPlan`]
/// and can't be set independently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlashSettings {
    options: BTreeMap<String, Value>,
    encrypt: bool,
}

impl FlashSettings {
    /// Look up a flash tool option (`flash_mode`, `flash_size`, ...)
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    /// Look up a flash tool option as a string
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// All flash tool options, sorted by name
    pub fn options(&self) -> &BTreeMap<String, Value> {
        &self.options
    }

    /// True if any flash file is encrypted
    pub fn encrypt(&self) -> bool {
        self.encrypt
    }
}

/// Ordered set of flash files plus the settings used to write them
///
/// Files are unique by offset and sorted ascending, which is the order
/// flashing tools expect them in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlashPlan {
    files: Vec<FlashFile>,
    settings: FlashSettings,
}

impl FlashPlan {
    /// Build a plan from unordered files and raw tool options
    ///
    /// A later file with the same offset replaces an earlier one.
    pub fn new(files: impl IntoIterator<Item = FlashFile>, options: BTreeMap<String, Value>) -> Self {
        let by_offset: BTreeMap<u64, FlashFile> =
            files.into_iter().map(|f| (f.offset, f)).collect();
        let files: Vec<FlashFile> = by_offset.into_values().collect();
        let encrypt = files.iter().any(|f| f.encrypted);

        Self {
            files,
            settings: FlashSettings { options, encrypt },
        }
    }

    /// Flash files in ascending offset order
    pub fn files(&self) -> &[FlashFile] {
        &self.files
    }

    /// Flash tool settings
    pub fn settings(&self) -> &FlashSettings {
        &self.settings
    }

    /// Files whose name marks them as a partition table candidate
    pub fn partition_candidates(&self) -> impl Iterator<Item = &FlashFile> {
        self.files
            .iter()
            .filter(|f| f.file_name().is_some_and(|n| n.contains("partition")))
    }

    /// Number of flash files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if there is nothing to flash
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
