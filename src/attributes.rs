//! Partition attribute bits.
//!
//! ```
//! use gptlabel::{attributes, parttype};
//!
//! let bits = attributes::REQUIRED | attributes::HIDDEN;
//! assert_eq!(attributes::describe(bits, &parttype::BASIC_DATA), "0:RequiredPartition,62:Hidden");
//! assert_eq!(attributes::describe(bits, &parttype::LINUX_FILESYSTEM), "0:RequiredPartition,62");
//! ```

use crate::guid::Guid;
use crate::parttype::BASIC_DATA;

/// The platform needs the partition to function.
pub const REQUIRED: u64 = 1 << 0;
/// Firmware must not produce a block I/O protocol for the partition.
pub const NO_BLOCK_IO: u64 = 1 << 1;
/// Legacy BIOS bootable.
pub const LEGACY_BOOTABLE: u64 = 1 << 2;
/// First bit whose meaning depends on the partition type.
pub const TYPE_SPECIFIC_SHIFT: u32 = 48;

/// Microsoft basic data: read-only.
pub const READ_ONLY: u64 = 1 << 60;
/// Microsoft basic data: shadow copy.
pub const SHADOW_COPY: u64 = 1 << 61;
/// Microsoft basic data: hidden.
pub const HIDDEN: u64 = 1 << 62;
/// Microsoft basic data: no drive letter.
pub const NO_DRIVE_LETTER: u64 = 1 << 63;

/// Name of bit `bit` for a partition of type `type_guid`, if it has one.
pub fn bit_name(bit: u32, type_guid: &Guid) -> Option<&'static str> {
    match bit {
        0 => Some("RequiredPartition"),
        1 => Some("NoBlockIOProtocol"),
        2 => Some("LegacyBIOSBootable"),
        x if x < TYPE_SPECIFIC_SHIFT => Some("Reserved"),
        60 if *type_guid == BASIC_DATA => Some("ReadOnly"),
        61 if *type_guid == BASIC_DATA => Some("ShadowCopy"),
        62 if *type_guid == BASIC_DATA => Some("Hidden"),
        63 if *type_guid == BASIC_DATA => Some("NoDriveLetter"),
        _ => None,
    }
}

/// Render the bits set in `attributes` as a comma separated list of `bit:Name`, or just `bit`
/// for type specific bits without a known meaning.
pub fn describe(attributes: u64, type_guid: &Guid) -> String {
    (0..64)
        .filter(|i| attributes & (1 << i) != 0)
        .map(|i| match bit_name(i, type_guid) {
            Some(name) => format!("{}:{}", i, name),
            None => format!("{}", i),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a list of bit numbers such as `0,2,60`.
pub fn parse_bits(value: &str) -> Option<u64> {
    value
        .split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .try_fold(0u64, |acc, x| match x.parse::<u32>() {
            Ok(bit) if bit < 64 => Some(acc | 1 << bit),
            _ => None,
        })
}
