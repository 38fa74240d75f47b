//! I/O topology of a device and the alignment it implies.

/// Default alignment grain, in bytes.
pub const DEFAULT_GRAIN: u64 = 1 << 20;

/// Physical characteristics of a device. Every size is in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    /// Logical sector size: the unit of every LBA.
    pub logical_sector_size: u64,
    /// Physical sector size. Never smaller than the logical one.
    pub physical_sector_size: u64,
    /// Minimum I/O size.
    pub minimum_io_size: u64,
    /// Optimal I/O size.
    pub optimal_io_size: u64,
}

impl Topology {
    /// A topology where everything is known to be the logical sector size.
    pub fn new(logical_sector_size: u64) -> Topology {
        Topology {
            logical_sector_size,
            physical_sector_size: logical_sector_size,
            minimum_io_size: logical_sector_size,
            optimal_io_size: logical_sector_size,
        }
    }

    /// Build a topology from the values reported by a device. Zero or missing values are
    /// unknown and default to the logical sector size.
    pub fn from_device(
        logical_sector_size: u64,
        physical_sector_size: Option<u64>,
        minimum_io_size: Option<u64>,
        optimal_io_size: Option<u64>,
    ) -> Topology {
        let known = |x: Option<u64>| {
            x.filter(|x| *x > 0)
                .unwrap_or(logical_sector_size)
                .max(logical_sector_size)
        };

        Topology {
            logical_sector_size,
            physical_sector_size: known(physical_sector_size),
            minimum_io_size: known(minimum_io_size),
            optimal_io_size: known(optimal_io_size),
        }
    }

    /// Alignment grain in bytes for a medium of `total_sectors` sectors.
    ///
    /// The grain is the optimal I/O size or 1 MiB, whichever is larger. A medium too small to
    /// hold four grains falls back to the physical sector size.
    pub fn grain(&self, total_sectors: u64) -> u64 {
        let grain = self.optimal_io_size.max(DEFAULT_GRAIN);

        if total_sectors <= grain * 4 / self.logical_sector_size {
            self.physical_sector_size
        } else {
            grain
        }
    }

    /// Alignment grain in sectors, at least 1.
    pub fn grain_sectors(&self, total_sectors: u64) -> u64 {
        (self.grain(total_sectors) / self.logical_sector_size).max(1)
    }

    /// Preferred first usable LBA: LBA 34 rounded up to the grain.
    pub fn first_lba_hint(&self, total_sectors: u64) -> u64 {
        align_up(34, self.grain_sectors(total_sectors))
    }
}

/// Round `lba` up to the next multiple of `align` sectors.
///
/// # Examples
///
/// ```
/// assert_eq!(gptlabel::align_up(34, 2048), 2048);
/// assert_eq!(gptlabel::align_up(4096, 2048), 4096);
/// ```
pub fn align_up(lba: u64, align: u64) -> u64 {
    if align <= 1 {
        return lba;
    }

    match lba % align {
        0 => lba,
        rem => lba.saturating_add(align - rem),
    }
}

/// Round `lba` down to a multiple of `align` sectors.
pub fn align_down(lba: u64, align: u64) -> u64 {
    if align <= 1 {
        lba
    } else {
        lba - lba % align
    }
}
