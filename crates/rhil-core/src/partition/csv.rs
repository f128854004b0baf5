//! Partition tool output parsing
//!
//! The partition tool prints the decoded table as CSV:
//!
//! ```text
//! # ESP-IDF Partition Table
//! # Name, Type, SubType, Offset, Size, Flags
//! nvs,data,nvs,0x9000,24K,
//! phy_init,data,phy,0xf000,4K,
//! factory,app,factory,0x10000,1M,
//! ```

use super::{parse_size, PartitionEntry, PartitionTable};
use crate::util::parse_int;

/// Parse partition tool CSV output
///
/// Comment lines are ignored. Lines without exactly six fields, or with an
/// offset or size that doesn't parse, are dropped.
pub fn parse_partition_csv(text: &str) -> PartitionTable {
    let mut table = PartitionTable::new();

    for line in text.lines() {
        if line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some(entry) => table.insert(entry),
            None if !line.trim().is_empty() => log::debug!("Skipping partition line: {:?}", line),
            None => {}
        }
    }

    table
}

fn parse_line(line: &str) -> Option<PartitionEntry> {
    let fields: Vec<&str> = line.split(',').collect();
    let [name, kind, subtype, offset, size, flags] = fields[..] else {
        return None;
    };

    Some(PartitionEntry {
        name: name.trim().to_string(),
        kind: kind.trim().to_string(),
        subtype: subtype.trim().to_string(),
        offset: parse_int(offset)?,
        size: parse_size(size)?,
        flags: flags.trim().to_string(),
    })
}
