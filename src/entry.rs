//! Partition entries and the partition entry array.

use crate::crc32;
use crate::device::BlockDevice;
use crate::guid::Guid;
use crate::header::Header;
use crate::{Error, Result};
use bincode::{deserialize, serialize_into};
use log::{debug, warn};
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Size in bytes of the fields of a partition entry.
pub const ENTRY_SIZE: u32 = 128;
/// Capacity of a partition name in UTF-16 code units.
pub const NAME_UNITS: usize = 36;

/// How a string fitted in a [`PartitionName`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameFit {
    /// The whole string is stored.
    Exact,
    /// The string was cut.
    Truncated {
        /// Number of UTF-16 code units that did not fit.
        dropped: usize,
    },
}

/// A wrapper type for `String` that represents a partition's name.
///
/// On disk a name is at most 36 UTF-16LE code units, padded with NULs. The code units read from
/// disk are kept as they are, so an untouched name is written back byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionName {
    text: String,
    units: [u16; NAME_UNITS],
}

impl PartitionName {
    /// Build a name from `value`, cutting it to what fits on disk. A surrogate pair is never
    /// split and the name stops at the first NUL.
    ///
    /// # Examples
    ///
    /// ```
    /// use gptlabel::{NameFit, PartitionName};
    ///
    /// let (name, fit) = PartitionName::new("A Robot Named Fight!");
    /// assert_eq!(name.as_str(), "A Robot Named Fight!");
    /// assert_eq!(fit, NameFit::Exact);
    ///
    /// let (name, fit) = PartitionName::new(&"x".repeat(40));
    /// assert_eq!(name.as_str().len(), 36);
    /// assert_eq!(fit, NameFit::Truncated { dropped: 4 });
    /// ```
    pub fn new(value: &str) -> (PartitionName, NameFit) {
        let units: Vec<u16> = value.encode_utf16().collect();
        let nul = units.iter().position(|x| *x == 0).unwrap_or(units.len());

        let mut end = nul.min(NAME_UNITS);
        if end < nul && (0xD800..0xDC00).contains(&units[end - 1]) {
            end -= 1;
        }

        let mut raw = [0; NAME_UNITS];
        raw[..end].copy_from_slice(&units[..end]);
        let name = PartitionName {
            text: String::from_utf16_lossy(&units[..end]),
            units: raw,
        };
        let fit = match units.len() - end {
            0 => NameFit::Exact,
            dropped => {
                warn!("partition name {:?} truncated to {:?}", value, name.text);
                NameFit::Truncated { dropped }
            }
        };

        (name, fit)
    }

    /// Extracts a string slice containing the entire `PartitionName`.
    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }

    /// Returns `true` for the empty name.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl Default for PartitionName {
    fn default() -> PartitionName {
        PartitionName {
            text: String::new(),
            units: [0; NAME_UNITS],
        }
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

struct Utf16LeVisitor;

impl<'de> Visitor<'de> for Utf16LeVisitor {
    type Value = PartitionName;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("36 UTF-16LE code units (72 bytes)")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<PartitionName, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut units = [0; NAME_UNITS];
        let mut len = NAME_UNITS;
        for (i, unit) in units.iter_mut().enumerate() {
            *unit = seq
                .next_element()?
                .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
            if *unit == 0 && len == NAME_UNITS {
                len = i;
            }
        }

        Ok(PartitionName {
            text: String::from_utf16_lossy(&units[..len]),
            units,
        })
    }
}

impl<'de> Deserialize<'de> for PartitionName {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_tuple(NAME_UNITS, Utf16LeVisitor)
    }
}

impl Serialize for PartitionName {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_tuple(NAME_UNITS)?;
        for x in self.units.iter() {
            seq.serialize_element(x)?;
        }
        seq.end()
    }
}

/// A GPT partition's entry in the partition array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Partition type. The zero GUID marks an unused entry.
    pub type_guid: Guid,
    /// Unique GUID of the partition.
    pub unique_guid: Guid,
    /// First sector of the partition.
    pub first_lba: u64,
    /// Last sector of the partition (inclusive).
    pub last_lba: u64,
    /// The attribute bits. See [`crate::attributes`].
    pub attributes: u64,
    /// The partition name.
    pub name: PartitionName,
    /// Bytes of the slot past the 128 bytes of fields, kept as read. Empty when they are all
    /// zero.
    #[serde(skip)]
    pub tail: Vec<u8>,
}

impl Entry {
    /// Creates an empty partition entry
    pub fn empty() -> Entry {
        Entry::default()
    }

    /// Returns `true` if the partition entry is not used (zero type GUID)
    pub fn is_unused(&self) -> bool {
        self.type_guid.is_zero()
    }

    /// Returns `true` if the partition entry is used (non-zero type GUID)
    pub fn is_used(&self) -> bool {
        !self.is_unused()
    }

    /// Returns the number of sectors in the partition, or `None` if `last_lba` is lower than
    /// `first_lba`.
    pub fn size(&self) -> Option<u64> {
        if self.last_lba < self.first_lba {
            None
        } else {
            Some(self.last_lba - self.first_lba + 1)
        }
    }

    /// Returns `true` if `lba` belongs to this partition.
    pub fn contains(&self, lba: u64) -> bool {
        self.first_lba <= lba && lba <= self.last_lba
    }
}

fn slot_size(entry_size: u32) -> Result<usize> {
    if entry_size < ENTRY_SIZE || entry_size % ENTRY_SIZE != 0 {
        return Err(Error::BadSpec("entry size must be a multiple of 128"));
    }

    Ok(entry_size as usize)
}

/// Append the slot of `entry`: its fields, then its tail, zero-padded up to `size` bytes.
fn encode_slot(data: &mut Vec<u8>, entry: &Entry, size: usize) -> Result<()> {
    let start = data.len();
    serialize_into(&mut *data, entry)?;
    data.extend(entry.tail.iter().take(size - ENTRY_SIZE as usize));
    data.resize(start + size, 0);

    Ok(())
}

/// Serialize `entries` into an array of `entries.len() * entry_size` bytes.
pub fn encode_array(entries: &[Entry], entry_size: u32) -> Result<Vec<u8>> {
    let size = slot_size(entry_size)?;
    let mut data = Vec::with_capacity(entries.len() * size);
    for entry in entries {
        encode_slot(&mut data, entry, size)?;
    }

    Ok(data)
}

/// Parse `entry_count` slots of `entry_size` bytes.
pub fn decode_array(data: &[u8], entry_count: u32, entry_size: u32) -> Result<Vec<Entry>> {
    let size = entry_size as usize;
    if size < ENTRY_SIZE as usize || data.len() < entry_count as usize * size {
        return Err(Error::BufferSize(data.len()));
    }

    data.chunks(size)
        .take(entry_count as usize)
        .map(|slot| {
            let mut entry: Entry = deserialize(&slot[..ENTRY_SIZE as usize])?;
            let tail = &slot[ENTRY_SIZE as usize..];
            if tail.iter().any(|x| *x != 0) {
                entry.tail = tail.to_vec();
            }
            Ok(entry)
        })
        .collect()
}

/// CRC32 of the array made of `entries`.
pub fn array_crc32(entries: &[Entry], entry_size: u32) -> Result<u32> {
    let size = slot_size(entry_size)?;
    let mut digest = crc32::digest();
    let mut slot = Vec::with_capacity(size);
    for entry in entries {
        slot.clear();
        encode_slot(&mut slot, entry, size)?;
        digest.update(&slot);
    }

    Ok(digest.finalize())
}

/// Read the array described by `header`. Returns the entries and the CRC32 of the raw bytes,
/// which the caller compares with `header.entry_array_crc32`.
pub fn read_array<D: BlockDevice + ?Sized>(
    device: &mut D,
    header: &Header,
) -> Result<(Vec<Entry>, u32)> {
    let sector_size = device.sector_size();
    let mut data = vec![0; (header.array_sectors(sector_size) * sector_size) as usize];
    device.read_at(header.entry_array_lba, &mut data)?;

    let bytes = header.array_bytes() as usize;
    let crc = crc32::checksum(&data[..bytes]);
    debug!(
        "{} entries of {} bytes at LBA {}, CRC32 {:#010x}",
        header.entry_count, header.entry_size, header.entry_array_lba, crc
    );

    Ok((
        decode_array(&data[..bytes], header.entry_count, header.entry_size)?,
        crc,
    ))
}

/// Serialize `entries` into whole sectors, the trailing bytes zeroed.
pub fn encode_sectors(entries: &[Entry], entry_size: u32, sector_size: u64) -> Result<Vec<u8>> {
    let mut data = encode_array(entries, entry_size)?;
    let sectors = (data.len() as u64 + sector_size - 1) / sector_size;
    data.resize((sectors * sector_size) as usize, 0);

    Ok(data)
}

#[cfg(test)]
mod test {
    use super::*;

    const LINUX_FS: &str = "0FC63DAF-8483-4772-8E79-3D69D8477DE4";

    fn sample() -> Entry {
        Entry {
            type_guid: LINUX_FS.parse().unwrap(),
            unique_guid: Guid::from_bytes([0x11; 16]),
            first_lba: 2048,
            last_lba: 206_847,
            attributes: 1 << 60,
            name: PartitionName::new("root").0,
            tail: Vec::new(),
        }
    }

    #[test]
    fn entry_layout() {
        let entry = sample();
        let data = encode_array(&[entry.clone()], 128).unwrap();

        assert_eq!(data.len(), 128);
        assert_eq!(&data[0..16], entry.type_guid.as_bytes());
        assert_eq!(&data[0..4], &[0xAF, 0x3D, 0xC6, 0x0F]);
        assert_eq!(&data[16..32], &[0x11; 16]);
        assert_eq!(&data[32..40], &2048u64.to_le_bytes());
        assert_eq!(&data[40..48], &206_847u64.to_le_bytes());
        assert_eq!(&data[48..56], &(1u64 << 60).to_le_bytes());
        assert_eq!(&data[56..64], &[b'r', 0, b'o', 0, b'o', 0, b't', 0]);
        assert!(data[64..].iter().all(|x| *x == 0));

        assert_eq!(decode_array(&data, 1, 128).unwrap(), vec![entry]);
    }

    #[test]
    fn larger_entries_are_zero_padded() {
        let entries = vec![sample(), Entry::empty()];
        let data = encode_array(&entries, 256).unwrap();

        assert_eq!(data.len(), 512);
        assert!(data[128..256].iter().all(|x| *x == 0));
        assert_eq!(decode_array(&data, 2, 256).unwrap(), entries);
        assert!(matches!(
            encode_array(&entries, 200),
            Err(Error::BadSpec(_))
        ));
    }

    #[test]
    fn bytes_past_the_fields_survive_a_rewrite() {
        let mut data = encode_array(&[sample(), Entry::empty()], 256).unwrap();
        data[200] = 0x77;
        data[511] = 0x01;

        let entries = decode_array(&data, 2, 256).unwrap();
        assert_eq!(entries[0].tail.len(), 128);
        assert_eq!(entries[0].tail[72], 0x77);
        assert!(entries[1].is_unused());
        assert_eq!(encode_array(&entries, 256).unwrap(), data);
        assert_eq!(array_crc32(&entries, 256).unwrap(), crc32::checksum(&data));
    }

    #[test]
    fn unused_slots_decode_as_empty() {
        let entries = decode_array(&[0; 128 * 4], 4, 128).unwrap();

        assert_eq!(entries.len(), 4);
        assert!(entries.iter().all(|x| x.is_unused() && x.name.is_empty()));
    }

    #[test]
    fn name_decoding_stops_at_nul_and_replaces_invalid_units() {
        let mut data = encode_array(&[sample()], 128).unwrap();
        data[66..68].copy_from_slice(&[b'x', 0]);
        let decoded = decode_array(&data, 1, 128).unwrap();
        assert_eq!(decoded[0].name.as_str(), "root");
        // the bytes after the NUL survive a rewrite
        assert_eq!(encode_array(&decoded, 128).unwrap(), data);

        data[56..58].copy_from_slice(&0xDC00u16.to_le_bytes());
        assert_eq!(
            decode_array(&data, 1, 128).unwrap()[0].name.as_str(),
            "\u{FFFD}oot"
        );
    }

    #[test]
    fn names_are_truncated_to_36_units() {
        let (name, fit) = PartitionName::new(&"a".repeat(36));
        assert_eq!(fit, NameFit::Exact);
        assert_eq!(name.as_str().len(), 36);

        // 35 ASCII units followed by a surrogate pair: the pair does not fit
        let long = format!("{}\u{1F600}", "a".repeat(35));
        let (name, fit) = PartitionName::new(&long);
        assert_eq!(name.as_str(), "a".repeat(35));
        assert_eq!(fit, NameFit::Truncated { dropped: 2 });

        let (name, fit) = PartitionName::new("\u{1F600}\u{1F600}");
        assert_eq!(name.as_str(), "\u{1F600}\u{1F600}");
        assert_eq!(fit, NameFit::Exact);

        let (name, fit) = PartitionName::new("ab\0cd");
        assert_eq!(name.as_str(), "ab");
        assert_eq!(fit, NameFit::Truncated { dropped: 3 });
    }

    #[test]
    fn truncated_names_are_what_gets_stored() {
        let mut entry = sample();
        entry.name = PartitionName::new(&"é".repeat(50)).0;

        let data = encode_array(&[entry.clone()], 128).unwrap();
        let decoded = decode_array(&data, 1, 128).unwrap();
        assert_eq!(decoded[0].name, entry.name);
        assert_eq!(decoded[0].name.as_str().chars().count(), 36);
    }

    #[test]
    fn size_and_contains() {
        let entry = sample();
        assert_eq!(entry.size(), Some(204_800));
        assert!(entry.contains(2048));
        assert!(entry.contains(206_847));
        assert!(!entry.contains(206_848));

        let mut reversed = entry;
        reversed.first_lba = 300_000;
        assert_eq!(reversed.size(), None);
    }

    #[test]
    fn array_crc_matches_the_raw_bytes() {
        let entries = vec![sample(); 128];
        let data = encode_sectors(&entries, 128, 512).unwrap();

        assert_eq!(data.len(), 128 * 128);
        assert_eq!(
            array_crc32(&entries, 128).unwrap(),
            crc32::checksum(&data)
        );
    }
}
