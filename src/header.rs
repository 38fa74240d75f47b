//! The GPT header.

use crate::crc32;
use crate::device::BlockDevice;
use crate::geometry::Segment;
use crate::guid::Guid;
use crate::verify::{Fault, HeaderReason, Which};
use crate::Result;
use bincode::{deserialize, serialize};
use log::debug;
use serde::{Deserialize, Serialize};

/// Signature of a GPT header.
pub const SIGNATURE: [u8; 8] = *b"EFI PART";
/// Revision written by this crate.
pub const REVISION_1_0: u32 = 0x0001_0000;
/// Accepted revisions.
pub const REVISIONS: [u32; 3] = [0x0001_0200, REVISION_1_0, 0x0000_9900];
/// Size of the header fields in bytes.
pub const HEADER_SIZE: u32 = 92;
/// LBA of the primary header.
pub const PRIMARY_LBA: u64 = 1;

const CRC_FIELD: std::ops::Range<usize> = 16..20;

/// A GUID partition table header.
///
/// The fields are kept exactly as they appear on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Has to be `b"EFI PART"`.
    pub signature: [u8; 8],
    /// Revision of the format.
    pub revision: u32,
    /// Number of bytes covered by `header_crc32`. Usually 92.
    pub header_size: u32,
    /// CRC32 of the first `header_size` bytes, computed with this field zeroed.
    pub header_crc32: u32,
    /// Must be zero.
    pub reserved: u32,
    /// LBA of this header.
    pub my_lba: u64,
    /// LBA of the other header.
    pub alt_lba: u64,
    /// First LBA a partition may use.
    pub first_usable_lba: u64,
    /// Last LBA a partition may use (inclusive).
    pub last_usable_lba: u64,
    /// Disk GUID.
    pub disk_guid: Guid,
    /// First LBA of the partition entry array.
    pub entry_array_lba: u64,
    /// Number of partition entries.
    pub entry_count: u32,
    /// Size of one partition entry in bytes.
    pub entry_size: u32,
    /// CRC32 of the partition entry array.
    pub entry_array_crc32: u32,
    /// Bytes between the end of the fields and `header_size`, kept as read. Empty when they are
    /// all zero.
    #[serde(skip)]
    pub tail: Vec<u8>,
}

impl Header {
    /// A primary header for a medium of `total_sectors` sectors with an empty array of
    /// `entry_count` entries. The usable range starts at `first_usable_lba` and ends right
    /// before the backup array.
    ///
    /// CRCs are left at zero.
    pub fn new_primary(
        total_sectors: u64,
        sector_size: u64,
        entry_count: u32,
        first_usable_lba: u64,
        disk_guid: Guid,
    ) -> Header {
        let mut header = Header {
            signature: SIGNATURE,
            revision: REVISION_1_0,
            header_size: HEADER_SIZE,
            header_crc32: 0,
            reserved: 0,
            my_lba: PRIMARY_LBA,
            alt_lba: total_sectors - 1,
            first_usable_lba,
            last_usable_lba: 0,
            disk_guid,
            entry_array_lba: PRIMARY_LBA + 1,
            entry_count,
            entry_size: crate::entry::ENTRY_SIZE,
            entry_array_crc32: 0,
            tail: Vec::new(),
        };
        header.last_usable_lba = total_sectors - 2 - header.array_sectors(sector_size);

        header
    }

    /// The sibling of this header, located at `my_lba` with its array at `entry_array_lba`.
    /// Its header CRC is updated.
    pub fn mirror(&self, my_lba: u64, entry_array_lba: u64) -> Header {
        let mut header = self.clone();
        header.my_lba = my_lba;
        header.alt_lba = self.my_lba;
        header.entry_array_lba = entry_array_lba;
        header.update_crc32_checksum();

        header
    }

    /// The backup header matching this primary header: at its `alt_lba`, with the array right
    /// before it.
    pub fn backup_of(&self, sector_size: u64) -> Header {
        let my_lba = self.alt_lba;

        self.mirror(my_lba, my_lba - self.array_sectors(sector_size))
    }

    /// The primary header matching this backup header.
    pub fn primary_of(&self) -> Header {
        self.mirror(PRIMARY_LBA, PRIMARY_LBA + 1)
    }

    /// Size of the partition entry array in bytes.
    pub fn array_bytes(&self) -> u64 {
        self.entry_count as u64 * self.entry_size as u64
    }

    /// Number of sectors occupied by the partition entry array.
    pub fn array_sectors(&self, sector_size: u64) -> u64 {
        (self.array_bytes() + sector_size - 1) / sector_size
    }

    /// Sectors occupied by the partition entry array, or `None` for an empty array.
    pub fn array_segment(&self, sector_size: u64) -> Option<Segment> {
        match self.array_sectors(sector_size) {
            0 => None,
            n => Some(Segment::new(
                self.entry_array_lba,
                self.entry_array_lba.saturating_add(n - 1),
            )),
        }
    }

    /// The usable range, or `None` if it is empty.
    pub fn usable(&self) -> Option<Segment> {
        if self.first_usable_lba <= self.last_usable_lba {
            Some(Segment::new(self.first_usable_lba, self.last_usable_lba))
        } else {
            None
        }
    }

    /// Compute the header CRC over the first `header_size` bytes with the CRC field zeroed.
    pub fn generate_crc32_checksum(&self) -> u32 {
        let mut data = self.to_bytes();
        data[CRC_FIELD].copy_from_slice(&[0; 4]);
        data.truncate(self.header_size as usize);

        crc32::checksum(&data)
    }

    /// The fields followed by the tail, zero-padded up to `header_size`.
    fn to_bytes(&self) -> Vec<u8> {
        let size = self.header_size.max(HEADER_SIZE) as usize;
        let mut data = serialize(self).unwrap_or_default();
        data.resize(HEADER_SIZE as usize, 0);
        data.extend(self.tail.iter().take(size - HEADER_SIZE as usize));
        data.resize(size, 0);

        data
    }

    /// Store the freshly computed header CRC.
    pub fn update_crc32_checksum(&mut self) {
        self.header_crc32 = self.generate_crc32_checksum();
    }

    /// Serialize into a zero-padded sector of `sector_size` bytes.
    pub fn encode(&self, sector_size: u64) -> Result<Vec<u8>> {
        let mut data = serialize(self)?;
        data.extend(self.tail.iter());
        data.truncate(self.header_size.max(HEADER_SIZE) as usize);
        data.resize(sector_size as usize, 0);

        Ok(data)
    }

    /// Parse and check the header found in `sector`, that was read from `lba`.
    pub fn decode(sector: &[u8], lba: u64) -> std::result::Result<Header, HeaderReason> {
        if sector.len() < HEADER_SIZE as usize {
            return Err(HeaderReason::Size);
        }

        let mut header: Header = deserialize(&sector[..HEADER_SIZE as usize])
            .map_err(|_| HeaderReason::Signature)?;

        if header.signature != SIGNATURE {
            return Err(HeaderReason::Signature);
        }
        if header.header_size < HEADER_SIZE || header.header_size as usize > sector.len() {
            return Err(HeaderReason::Size);
        }
        if header.my_lba != lba {
            return Err(HeaderReason::MyLba);
        }

        let mut scratch = sector[..header.header_size as usize].to_vec();
        scratch[CRC_FIELD].copy_from_slice(&[0; 4]);
        if crc32::checksum(&scratch) != header.header_crc32 {
            return Err(HeaderReason::Crc);
        }

        if !REVISIONS.contains(&header.revision) {
            return Err(HeaderReason::Revision);
        }

        let tail = &sector[HEADER_SIZE as usize..header.header_size as usize];
        if tail.iter().any(|x| *x != 0) {
            header.tail = tail.to_vec();
        }

        Ok(header)
    }

    /// Read and check the header stored at `lba`.
    ///
    /// A header that does not pass the checks is returned as [`crate::Error::Invalid`] with a
    /// [`Fault::HeaderInvalid`].
    pub fn read_from<D: BlockDevice + ?Sized>(
        device: &mut D,
        lba: u64,
        which: Which,
    ) -> Result<Header> {
        let mut sector = vec![0; device.sector_size() as usize];
        device.read_at(lba, &mut sector)?;

        let header = Header::decode(&sector, lba).map_err(|reason| {
            debug!("{} header at LBA {} rejected: {}", which, lba, reason);
            Fault::HeaderInvalid { which, reason }
        })?;
        debug!(
            "{} header at LBA {}: usable {}-{}, {} entries at LBA {}",
            which,
            lba,
            header.first_usable_lba,
            header.last_usable_lba,
            header.entry_count,
            header.entry_array_lba
        );

        Ok(header)
    }

    /// Write this header as a whole sector at its `my_lba`.
    pub fn write_into<D: BlockDevice + ?Sized>(&self, device: &mut D) -> Result<()> {
        let data = self.encode(device.sector_size())?;

        device.write_at(self.my_lba, &data)
    }
}
