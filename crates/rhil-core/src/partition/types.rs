//! Partition table types

/// One named region of the on-device partition table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    /// Partition name (unique within a table)
    pub name: String,
    /// Partition type tag (`app`, `data`, ...)
    pub kind: String,
    /// Partition subtype tag (`factory`, `nvs`, `ota_0`, ...)
    pub subtype: String,
    /// Start offset in bytes
    pub offset: u64,
    /// Size in bytes
    pub size: u64,
    /// Raw flags column (`encrypted`, `readonly`, or empty)
    pub flags: String,
}

impl PartitionEntry {
    /// End offset (exclusive), clamped to `u64::MAX`
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    /// Check if `encrypted` is among the flags
    pub fn is_encrypted(&self) -> bool {
        self.flags.split(':').any(|f| f.trim() == "encrypted")
    }
}

/// Partition table keyed by partition name, in table order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionTable {
    entries: Vec<PartitionEntry>,
}

impl PartitionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any entry with the same name in place
    pub fn insert(&mut self, entry: PartitionEntry) {
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Find a partition by name
    pub fn get(&self, name: &str) -> Option<&PartitionEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// All partitions in table order
    pub fn entries(&self) -> &[PartitionEntry] {
        &self.entries
    }

    /// Iterate over partitions of the given type
    pub fn by_type<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a PartitionEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// Get the number of partitions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Parse a partition size: plain decimal bytes, or a `K`/`M` suffixed count
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let (digits, multiplier) = if let Some(n) = s.strip_suffix('K') {
        (n, KIB)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, MIB)
    } else {
        (s, 1)
    };

    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}

/// Format a size the way the partition tool prints it
///
/// Exact multiples of 1 MiB or 1 KiB use the `M`/`K` suffix.
pub fn format_size(size: u64) -> String {
    if size != 0 && size % MIB == 0 {
        format!("{}M", size / MIB)
    } else if size != 0 && size % KIB == 0 {
        format!("{}K", size / KIB)
    } else {
        size.to_string()
    }
}
