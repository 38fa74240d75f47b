//! The protective MBR stored in LBA 0.

use crate::device::BlockDevice;
use crate::{Error, Result};
use bincode::{deserialize, serialize};
use log::debug;
use serde::{Deserialize, Serialize};

/// MBR partition type of the record that covers a GPT disk.
pub const OS_TYPE_GPT: u8 = 0xEE;
/// Boot signature at the end of an MBR.
pub const MBR_SIGNATURE: u16 = 0xAA55;

const BOOT_CODE_SIZE: usize = 440;
const MBR_SIZE: usize = 512;

/// A partition record of an MBR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbrRecord {
    /// Boot indicator (0x80 for active).
    pub boot_indicator: u8,
    /// Starting CHS address.
    pub start_chs: [u8; 3],
    /// Partition type.
    pub os_type: u8,
    /// Ending CHS address.
    pub end_chs: [u8; 3],
    /// Starting LBA.
    pub starting_lba: u32,
    /// Size in sectors.
    pub size_in_lba: u32,
}

impl MbrRecord {
    /// Returns `true` if the record describes nothing.
    pub fn is_empty(&self) -> bool {
        self.os_type == 0
    }

    /// The single record of a protective MBR for a medium of `total_sectors` sectors.
    pub fn protective(total_sectors: u64) -> MbrRecord {
        MbrRecord {
            boot_indicator: 0,
            start_chs: [0x00, 0x02, 0x00],
            os_type: OS_TYPE_GPT,
            end_chs: [0xFE, 0xFF, 0xFF],
            starting_lba: 1,
            size_in_lba: protective_size(total_sectors),
        }
    }
}

/// Number of sectors a protective record covers: everything after LBA 0, saturated to what 32
/// bits can express.
pub fn protective_size(total_sectors: u64) -> u32 {
    total_sectors.saturating_sub(1).min(u32::MAX as u64) as u32
}

/// Classification of the MBR found in LBA 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmbrKind {
    /// Missing, malformed, or a legacy MBR.
    Invalid,
    /// A single 0xEE record covering the whole medium.
    Protective,
    /// A 0xEE record mixed with legacy records.
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tail {
    disk_signature: u32,
    reserved: u16,
    records: [MbrRecord; 4],
    signature: u16,
}

/// The content of LBA 0.
///
/// The whole sector is kept so that rewriting it preserves the boot code.
#[derive(Debug, Clone)]
pub struct Pmbr {
    sector: Vec<u8>,
    /// Unique MBR disk signature.
    pub disk_signature: u32,
    /// The four partition records.
    pub records: [MbrRecord; 4],
    /// Boot signature, 0xAA55 on a valid MBR.
    pub signature: u16,
}

impl Pmbr {
    /// A protective MBR with no boot code, for a medium of `total_sectors` sectors of
    /// `sector_size` bytes.
    pub fn protective(total_sectors: u64, sector_size: u64) -> Pmbr {
        Pmbr {
            sector: vec![0; sector_size as usize],
            disk_signature: 0,
            records: [
                MbrRecord::protective(total_sectors),
                MbrRecord::default(),
                MbrRecord::default(),
                MbrRecord::default(),
            ],
            signature: MBR_SIGNATURE,
        }
    }

    /// Parse the content of LBA 0.
    pub fn decode(sector: &[u8]) -> Result<Pmbr> {
        if sector.len() < MBR_SIZE {
            return Err(Error::BufferSize(sector.len()));
        }

        let tail: Tail = deserialize(&sector[BOOT_CODE_SIZE..MBR_SIZE])?;

        Ok(Pmbr {
            sector: sector.to_vec(),
            disk_signature: tail.disk_signature,
            records: tail.records,
            signature: tail.signature,
        })
    }

    /// Read and parse LBA 0.
    pub fn read_from<D: BlockDevice + ?Sized>(device: &mut D) -> Result<Pmbr> {
        let mut sector = vec![0; device.sector_size() as usize];
        device.read_at(0, &mut sector)?;

        Pmbr::decode(&sector)
    }

    /// Serialize into a sector of `sector_size` bytes. Bytes outside of the MBR fields are kept
    /// as they were read.
    pub fn encode(&self, sector_size: u64) -> Result<Vec<u8>> {
        let mut sector = self.sector.clone();
        sector.resize(sector_size as usize, 0);

        let tail = serialize(&Tail {
            disk_signature: self.disk_signature,
            reserved: 0,
            records: self.records,
            signature: self.signature,
        })?;
        sector[BOOT_CODE_SIZE..MBR_SIZE].copy_from_slice(&tail);

        Ok(sector)
    }

    /// The legacy boot code area.
    pub fn boot_code(&self) -> &[u8] {
        &self.sector[..BOOT_CODE_SIZE]
    }

    /// A protective MBR for `total_sectors` sectors that keeps this MBR's boot code.
    pub fn to_protective(&self, total_sectors: u64) -> Pmbr {
        Pmbr {
            sector: self.sector.clone(),
            disk_signature: 0,
            records: Pmbr::protective(total_sectors, 0).records,
            signature: MBR_SIGNATURE,
        }
    }

    /// Classify this MBR for a medium of `total_sectors` sectors.
    pub fn kind(&self, total_sectors: u64) -> PmbrKind {
        if self.signature != MBR_SIGNATURE {
            return PmbrKind::Invalid;
        }

        let used: Vec<&MbrRecord> = self.records.iter().filter(|x| !x.is_empty()).collect();
        let gpt = used.iter().filter(|x| x.os_type == OS_TYPE_GPT).count();

        match (gpt, used.len()) {
            (0, _) => PmbrKind::Invalid,
            (_, n) if n > gpt => PmbrKind::Hybrid,
            (1, 1)
                if used[0].starting_lba == 1
                    && used[0].size_in_lba == protective_size(total_sectors) =>
            {
                PmbrKind::Protective
            }
            _ => PmbrKind::Invalid,
        }
    }
}

/// Write a protective MBR with zeroed boot code into LBA 0. A hybrid MBR is never overwritten.
pub fn write_protective<D: BlockDevice + ?Sized>(device: &mut D) -> Result<()> {
    let total_sectors = device.total_sectors();

    if let Ok(existing) = Pmbr::read_from(device) {
        if existing.kind(total_sectors) == PmbrKind::Hybrid {
            return Err(Error::HybridMbr);
        }
    }

    let sector_size = device.sector_size();
    let data = Pmbr::protective(total_sectors, sector_size).encode(sector_size)?;
    debug!("writing protective MBR covering {} sectors", protective_size(total_sectors));
    device.write_at(0, &data)
}
