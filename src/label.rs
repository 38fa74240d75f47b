//! The in-memory disk label: both headers, the partition entry array and the protective MBR of a
//! device, and every operation that changes them.

use crate::device::BlockDevice;
use crate::entry::{self, Entry, NameFit, PartitionName, ENTRY_SIZE};
use crate::geometry::{FreeStats, Geometry, RangeSpec, Segment};
use crate::guid::Guid;
use crate::header::{Header, PRIMARY_LBA};
use crate::pmbr::{Pmbr, PmbrKind};
use crate::verify::{
    self, ArrayReason, EntryReason, Fault, HeaderField, HeaderReason, Report, Subject, Which,
};
use crate::{Error, Result, WriteStep};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::ops::Index;

/// Where a label stands with respect to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The label matches what is on the device.
    Loaded,
    /// The label has changes that are not written yet.
    Dirty,
    /// A write failed half way. The label refuses every further change and write.
    Poisoned,
}

/// How [`Label::open_with`] deals with damaged tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// At least one copy must be fully valid.
    Strict,
    /// A copy whose headers are valid but whose partition entry array has a wrong CRC is
    /// accepted when no better copy exists.
    Recovery,
}

impl Default for OpenMode {
    fn default() -> OpenMode {
        OpenMode::Strict
    }
}

/// Parameters of [`Label::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    /// Number of entries of the partition entry array. At least 128.
    pub entry_count: u32,
    /// First usable LBA. By default the first aligned sector after the primary array.
    pub first_usable_lba: Option<u64>,
    /// Disk GUID. Random by default.
    pub disk_guid: Option<Guid>,
}

impl Default for CreateOptions {
    fn default() -> CreateOptions {
        CreateOptions {
            entry_count: 128,
            first_usable_lba: None,
            disk_guid: None,
        }
    }
}

impl CreateOptions {
    /// Set the number of entries.
    pub fn entry_count(mut self, entry_count: u32) -> CreateOptions {
        self.entry_count = entry_count;
        self
    }

    /// Set the first usable LBA.
    pub fn first_usable_lba(mut self, lba: u64) -> CreateOptions {
        self.first_usable_lba = Some(lba);
        self
    }

    /// Set the disk GUID.
    pub fn disk_guid(mut self, guid: Guid) -> CreateOptions {
        self.disk_guid = Some(guid);
        self
    }
}

/// Description of a partition to add with [`Label::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddSpec {
    /// Partition number to use. The first unused slot by default.
    pub index: Option<u32>,
    /// Sectors of the partition.
    pub range: RangeSpec,
    /// Partition type GUID. Cannot be zero.
    pub type_guid: Guid,
    /// Partition name.
    pub name: Option<String>,
    /// Attribute bits.
    pub attributes: u64,
}

impl AddSpec {
    /// A partition of type `type_guid` placed according to `range`.
    pub fn new(type_guid: Guid, range: RangeSpec) -> AddSpec {
        AddSpec {
            index: None,
            range,
            type_guid,
            name: None,
            attributes: 0,
        }
    }

    /// Use partition number `index`.
    pub fn index(mut self, index: u32) -> AddSpec {
        self.index = Some(index);
        self
    }

    /// Name the partition.
    pub fn name(mut self, name: &str) -> AddSpec {
        self.name = Some(name.to_string());
        self
    }

    /// Set the attribute bits.
    pub fn attributes(mut self, attributes: u64) -> AddSpec {
        self.attributes = attributes;
        self
    }
}

/// What [`Label::add`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Added {
    /// Number of the new partition.
    pub partno: u32,
    /// How the requested name fitted in the entry.
    pub name_fit: NameFit,
}

/// Outcome of [`Label::reorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reorder {
    /// Entries have been moved.
    Reordered,
    /// Entries were already in order.
    Unchanged,
}

#[derive(Debug)]
struct TableCopy {
    header: Header,
    entries: Vec<Entry>,
}

/// What reading one copy of the table gave.
#[derive(Debug)]
enum Outcome {
    Good(TableCopy),
    /// Valid header but the array does not match its CRC.
    Damaged(TableCopy, Fault),
    Lost(Fault),
}

impl Outcome {
    fn fault(&self) -> Option<Fault> {
        match self {
            Outcome::Good(_) => None,
            Outcome::Damaged(_, fault) | Outcome::Lost(fault) => Some(fault.clone()),
        }
    }

    fn header(&self) -> Option<&Header> {
        match self {
            Outcome::Good(copy) | Outcome::Damaged(copy, _) => Some(&copy.header),
            Outcome::Lost(_) => None,
        }
    }
}

/// A GUID partition table loaded from a [`BlockDevice`].
///
/// The label owns the device. Every change happens in memory, with both header CRCs and the
/// entry array CRC kept up to date, until [`Label::write`] persists it.
///
/// Partitions are numbered from 1: partition `n` is stored in slot `n - 1` of the entry array.
#[derive(Debug)]
pub struct Label<D> {
    device: D,
    sector_size: u64,
    total_sectors: u64,
    align: u64,
    pmbr: Pmbr,
    primary: Header,
    backup: Header,
    entries: Vec<Entry>,
    /// Entries of the backup copy when both copies are valid but disagree.
    alternate: Option<Vec<Entry>>,
    report: Report,
    state: State,
}

impl<D: BlockDevice> Label<D> {
    /// Read the label of `device`. One valid copy is enough: the other one is rebuilt in memory
    /// and repaired on the next write.
    pub fn open(device: D) -> Result<Label<D>> {
        Label::open_with(device, OpenMode::Strict)
    }

    /// Read the label of `device` in the given mode.
    ///
    /// Problems found while reading are kept in [`Label::report`], along with the result of
    /// [`Label::verify`] on what has been loaded.
    pub fn open_with(mut device: D, mode: OpenMode) -> Result<Label<D>> {
        let sector_size = device.sector_size();
        let total_sectors = device.total_sectors();
        let mut report = Report::new();

        let pmbr = Pmbr::read_from(&mut device)?;
        match pmbr.kind(total_sectors) {
            PmbrKind::Invalid => return Err(Error::NotAGpt),
            PmbrKind::Hybrid => report.push(Fault::HybridMbr),
            PmbrKind::Protective => {}
        }

        let primary = read_copy(&mut device, PRIMARY_LBA, Which::Primary)?;
        let last_lba = total_sectors.saturating_sub(1);
        let backup_lba = match primary.header() {
            Some(header) if header.alt_lba > PRIMARY_LBA && header.alt_lba < total_sectors => {
                header.alt_lba
            }
            _ => last_lba,
        };
        let backup = read_copy(&mut device, backup_lba, Which::Backup)?;

        let rebuild_backup = |copy: &TableCopy| {
            let array_lba = backup_lba.saturating_sub(copy.header.array_sectors(sector_size));
            copy.header.mirror(backup_lba, array_lba)
        };

        let (primary, backup, entries, alternate) = match (primary, backup) {
            (Outcome::Good(p), Outcome::Good(b)) => {
                let alternate = if p.entries != b.entries {
                    warn!("the primary and the backup partition entry arrays differ");
                    Some(b.entries)
                } else {
                    None
                };
                (p.header, b.header, p.entries, alternate)
            }
            (Outcome::Good(p), b) => {
                report.extend(b.fault());
                let backup = rebuild_backup(&p);
                (p.header, backup, p.entries, None)
            }
            (p, Outcome::Good(b)) => {
                report.extend(p.fault());
                (b.header.primary_of(), b.header, b.entries, None)
            }
            (Outcome::Damaged(p, fault), b) if mode == OpenMode::Recovery => {
                report.push(fault);
                report.extend(b.fault());
                let backup = rebuild_backup(&p);
                (p.header, backup, p.entries, None)
            }
            (p, Outcome::Damaged(b, fault)) if mode == OpenMode::Recovery => {
                report.extend(p.fault());
                report.push(fault);
                (b.header.primary_of(), b.header, b.entries, None)
            }
            (Outcome::Damaged(_, primary), Outcome::Damaged(_, backup))
            | (Outcome::Damaged(_, primary), Outcome::Lost(backup))
            | (Outcome::Lost(primary), Outcome::Damaged(_, backup))
            | (Outcome::Lost(primary), Outcome::Lost(backup)) => {
                return Err(Error::Unrecoverable { primary, backup })
            }
        };

        for fault in report.faults() {
            warn!("{}", fault);
        }

        let mut label = Label {
            align: device.topology().grain_sectors(total_sectors),
            device,
            sector_size,
            total_sectors,
            pmbr,
            primary,
            backup,
            entries,
            alternate,
            report,
            state: State::Loaded,
        };
        if label.has_damaged_array() {
            label.recompute_crcs()?;
        }

        let found = label.verify();
        label.report.extend(found.faults().iter().cloned());
        info!(
            "loaded partition table {} with {} partition(s): {}",
            label.primary.disk_guid,
            label.entries.iter().filter(|x| x.is_used()).count(),
            label.report
        );

        Ok(label)
    }

    /// Write a new, empty label to `device` and return it.
    ///
    /// The first usable LBA defaults to the first sector aligned on the device's grain, unless
    /// that leaves no room. A hybrid MBR on the device is never replaced.
    pub fn create(mut device: D, options: CreateOptions) -> Result<Label<D>> {
        let sector_size = device.sector_size();
        let total_sectors = device.total_sectors();
        let topology = device.topology();

        if options.entry_count < 128 {
            return Err(Error::BadSpec(
                "the partition entry array needs at least 128 entries",
            ));
        }
        let array_bytes = options.entry_count as u64 * ENTRY_SIZE as u64;
        if array_bytes % sector_size != 0 {
            return Err(Error::BadSpec(
                "the partition entry array must fill whole sectors",
            ));
        }
        let array_sectors = array_bytes / sector_size;
        let min_first = PRIMARY_LBA + 1 + array_sectors;
        let last_usable = total_sectors
            .checked_sub(2 + array_sectors)
            .filter(|last| *last >= min_first)
            .ok_or(Error::DeviceTooSmall {
                sectors: total_sectors,
            })?;

        let first_usable_lba = match options.first_usable_lba {
            Some(lba) if lba >= min_first && lba <= last_usable => lba,
            Some(_) => {
                return Err(Error::BadSpec(
                    "the first usable LBA must lie between the two partition entry arrays",
                ))
            }
            None => {
                let hint = topology.first_lba_hint(total_sectors);
                if min_first < hint && hint < last_usable {
                    hint
                } else {
                    min_first
                }
            }
        };

        if Pmbr::read_from(&mut device)?.kind(total_sectors) == PmbrKind::Hybrid {
            return Err(Error::HybridMbr);
        }

        let disk_guid = options.disk_guid.unwrap_or_else(Guid::generate);
        let primary = Header::new_primary(
            total_sectors,
            sector_size,
            options.entry_count,
            first_usable_lba,
            disk_guid,
        );
        let backup = primary.backup_of(sector_size);

        let mut label = Label {
            device,
            sector_size,
            total_sectors,
            align: topology.grain_sectors(total_sectors),
            pmbr: Pmbr::protective(total_sectors, sector_size),
            primary,
            backup,
            entries: vec![Entry::empty(); options.entry_count as usize],
            alternate: None,
            report: Report::new(),
            state: State::Dirty,
        };
        label.recompute_crcs()?;
        label.write()?;
        info!(
            "created partition table {}: usable sectors {}-{}",
            disk_guid, first_usable_lba, last_usable
        );

        Ok(label)
    }

    fn has_damaged_array(&self) -> bool {
        self.report.faults().iter().any(|x| {
            matches!(
                x,
                Fault::ArrayInvalid {
                    reason: ArrayReason::Crc,
                    ..
                }
            )
        })
    }

    /// Run every consistency check over the label as it is in memory.
    pub fn verify(&self) -> Report {
        Subject {
            pmbr: self.pmbr.kind(self.total_sectors),
            primary: &self.primary,
            backup: &self.backup,
            entries: &self.entries,
            total_sectors: self.total_sectors,
            sector_size: self.sector_size,
        }
        .check()
    }

    /// Faults found when the label was opened, or by the last successful write.
    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Where the label stands with respect to the device.
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns `true` if the label has changes that are not written yet.
    pub fn is_dirty(&self) -> bool {
        self.state == State::Dirty
    }

    /// The primary header.
    pub fn primary(&self) -> &Header {
        &self.primary
    }

    /// The backup header.
    pub fn backup(&self) -> &Header {
        &self.backup
    }

    /// The MBR of LBA 0.
    pub fn pmbr(&self) -> &Pmbr {
        &self.pmbr
    }

    /// Classification of the MBR of LBA 0.
    pub fn pmbr_kind(&self) -> PmbrKind {
        self.pmbr.kind(self.total_sectors)
    }

    /// Logical sector size of the device.
    pub fn sector_size(&self) -> u64 {
        self.sector_size
    }

    /// Number of sectors of the device.
    pub fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    /// Alignment, in sectors, used when placing new partitions.
    pub fn alignment(&self) -> u64 {
        self.align
    }

    /// Change the alignment used when placing new partitions.
    pub fn set_alignment(&mut self, sectors: u64) -> Result<()> {
        if sectors == 0 {
            return Err(Error::BadSpec("the alignment must be at least one sector"));
        }
        self.align = sectors;

        Ok(())
    }

    /// The device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The device. Writing to it behind the label's back makes the label stale.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Give the device back.
    pub fn into_device(self) -> D {
        self.device
    }

    /// Every slot of the entry array, unused ones included.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Iterate over every slot with its partition number, starting at 1.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Entry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, x)| (i as u32 + 1, x))
    }

    /// Used partitions with their partition number.
    pub fn list(&self) -> Vec<(u32, &Entry)> {
        self.iter().filter(|(_, x)| x.is_used()).collect()
    }

    /// Partition `partno`, if it exists and is used.
    pub fn get(&self, partno: u32) -> Option<&Entry> {
        partno
            .checked_sub(1)
            .and_then(|i| self.entries.get(i as usize))
            .filter(|x| x.is_used())
    }

    /// The free space analysis of the usable range.
    pub fn geometry(&self) -> Geometry<'_> {
        Geometry::new(self.primary.usable(), &self.entries, self.align)
    }

    /// Maximal runs of free sectors in the usable range.
    pub fn free_segments(&self) -> Vec<Segment> {
        self.geometry().free_segments()
    }

    /// The largest free segment.
    pub fn largest_free(&self) -> Option<Segment> {
        self.geometry().largest_free()
    }

    /// The first aligned place holding `sectors` sectors.
    pub fn first_fit(&self, sectors: u64) -> Option<Segment> {
        self.geometry().first_fit(sectors)
    }

    /// Sectors a partition stored at `partno` would get for `spec`, without adding it.
    pub fn allocate(&self, partno: u32, spec: &RangeSpec) -> Result<Segment> {
        self.geometry().allocate(partno, spec)
    }

    /// Summary of the free space.
    pub fn free_stats(&self) -> FreeStats {
        self.geometry().stats()
    }

    /// The partition holding sector `lba`.
    pub fn find_at_sector(&self, lba: u64) -> Option<u32> {
        self.geometry().find_at_sector(lba)
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.state == State::Poisoned {
            return Err(Error::Poisoned);
        }
        if let Some(field) = verify::mismatches(&self.primary, &self.backup).first() {
            return Err(Fault::HeaderMismatch { field: *field }.into());
        }
        if self.alternate.is_some() {
            return Err(Fault::HeaderMismatch {
                field: HeaderField::EntryArrayCrc,
            }
            .into());
        }

        Ok(())
    }

    fn slot(&self, partno: u32) -> Result<usize> {
        match partno {
            0 => Err(Error::InvalidPartitionNumber(partno)),
            n if n as usize > self.entries.len() => Err(Error::InvalidPartitionNumber(partno)),
            n => Ok(n as usize - 1),
        }
    }

    fn used_slot(&self, partno: u32) -> Result<usize> {
        let i = self.slot(partno)?;
        if self.entries[i].is_unused() {
            return Err(Error::NotPresent(partno));
        }

        Ok(i)
    }

    fn recompute_crcs(&mut self) -> Result<()> {
        for header in [&mut self.primary, &mut self.backup].iter_mut() {
            header.entry_array_crc32 = entry::array_crc32(&self.entries, header.entry_size)?;
            header.update_crc32_checksum();
        }

        Ok(())
    }

    fn touch(&mut self) -> Result<()> {
        self.recompute_crcs()?;
        self.state = State::Dirty;

        Ok(())
    }

    fn new_unique_guid(&self) -> Guid {
        let taken: HashSet<Guid> = self
            .entries
            .iter()
            .filter(|x| x.is_used())
            .map(|x| x.unique_guid)
            .collect();

        loop {
            let guid = Guid::generate();
            if !taken.contains(&guid) {
                return guid;
            }
        }
    }

    /// Add a partition and return its number, along with whether its name had to be truncated.
    ///
    /// The partition gets a fresh unique GUID. Nothing changes when it cannot be placed.
    pub fn add(&mut self, spec: AddSpec) -> Result<Added> {
        self.ensure_mutable()?;
        if spec.type_guid.is_zero() {
            return Err(Error::BadSpec("the partition type GUID cannot be zero"));
        }

        let partno = match spec.index {
            Some(partno) => {
                if self.entries[self.slot(partno)?].is_used() {
                    return Err(Error::AlreadyPresent(partno));
                }
                partno
            }
            None => self
                .entries
                .iter()
                .position(Entry::is_unused)
                .map(|i| i as u32 + 1)
                .ok_or(Error::NoFreeSlot)?,
        };
        let range = self.allocate(partno, &spec.range)?;

        let (name, name_fit) = match &spec.name {
            Some(name) => PartitionName::new(name),
            None => (PartitionName::default(), NameFit::Exact),
        };
        self.entries[partno as usize - 1] = Entry {
            type_guid: spec.type_guid,
            unique_guid: self.new_unique_guid(),
            first_lba: range.start,
            last_lba: range.end,
            attributes: spec.attributes,
            name,
            tail: Vec::new(),
        };
        self.touch()?;
        info!(
            "added partition {}: sectors {}-{}",
            partno, range.start, range.end
        );

        Ok(Added { partno, name_fit })
    }

    /// Delete partition `partno`. Its slot is zeroed.
    pub fn delete(&mut self, partno: u32) -> Result<()> {
        self.ensure_mutable()?;
        let i = self.used_slot(partno)?;

        self.entries[i] = Entry::empty();
        self.touch()?;
        info!("deleted partition {}", partno);

        Ok(())
    }

    /// Change the type of partition `partno`. The zero GUID deletes the partition.
    pub fn retype(&mut self, partno: u32, type_guid: Guid) -> Result<()> {
        if type_guid.is_zero() {
            return self.delete(partno);
        }
        self.ensure_mutable()?;
        let i = self.used_slot(partno)?;

        self.entries[i].type_guid = type_guid;
        self.touch()?;
        debug!("partition {} is now of type {}", partno, type_guid);

        Ok(())
    }

    /// Rename partition `partno`. Names longer than 36 UTF-16 code units are truncated.
    pub fn set_name(&mut self, partno: u32, name: &str) -> Result<NameFit> {
        self.ensure_mutable()?;
        let i = self.used_slot(partno)?;

        let (name, fit) = PartitionName::new(name);
        self.entries[i].name = name;
        self.touch()?;

        Ok(fit)
    }

    /// Replace the attribute bits of partition `partno`.
    pub fn set_attrs(&mut self, partno: u32, attributes: u64) -> Result<()> {
        self.ensure_mutable()?;
        let i = self.used_slot(partno)?;

        self.entries[i].attributes = attributes;
        self.touch()?;
        debug!("partition {} attributes: {:#018x}", partno, attributes);

        Ok(())
    }

    /// Change the unique GUID of partition `partno`.
    pub fn set_unique_guid(&mut self, partno: u32, guid: Guid) -> Result<()> {
        self.ensure_mutable()?;
        let i = self.used_slot(partno)?;
        if guid.is_zero() {
            return Err(Error::BadSpec("the unique GUID of a partition cannot be zero"));
        }
        if let Some((other, _)) = self
            .iter()
            .find(|(n, x)| *n != partno && x.is_used() && x.unique_guid == guid)
        {
            return Err(Fault::EntryInvalid {
                index: partno,
                reason: EntryReason::DuplicateGuid(other),
            }
            .into());
        }

        self.entries[i].unique_guid = guid;
        self.touch()
    }

    /// Change the disk GUID in both headers.
    pub fn set_disk_guid(&mut self, guid: Guid) -> Result<()> {
        self.ensure_mutable()?;
        if guid.is_zero() {
            return Err(Error::BadSpec("the disk GUID cannot be zero"));
        }

        self.primary.disk_guid = guid;
        self.backup.disk_guid = guid;
        self.touch()?;
        info!("disk GUID is now {}", guid);

        Ok(())
    }

    /// Sort used partitions by first sector and move them to the first slots. Unused slots end
    /// up last. Partition numbers change.
    pub fn reorder(&mut self) -> Result<Reorder> {
        self.ensure_mutable()?;

        let mut sorted = self.entries.clone();
        sorted.sort_by_key(|x| (x.is_unused(), x.first_lba));
        if sorted == self.entries {
            return Ok(Reorder::Unchanged);
        }

        self.entries = sorted;
        self.touch()?;
        info!("partitions reordered");

        Ok(Reorder::Reordered)
    }

    /// Move the backup copy to the end of the device and extend the usable range up to the
    /// backup array. Returns `false` if the backup already sits at the end.
    ///
    /// This is what a grown device needs. A partition past the new usable range is refused.
    pub fn relocate_backup(&mut self) -> Result<bool> {
        self.ensure_mutable()?;

        let last_lba = self.total_sectors.saturating_sub(1);
        let last_usable = last_lba
            .checked_sub(self.primary.array_sectors(self.sector_size) + 1)
            .filter(|last| *last >= self.primary.first_usable_lba)
            .ok_or(Error::DeviceTooSmall {
                sectors: self.total_sectors,
            })?;

        if self.backup.my_lba == last_lba
            && self.primary.alt_lba == last_lba
            && self.primary.last_usable_lba == last_usable
        {
            return Ok(false);
        }

        if let Some((index, _)) = self
            .iter()
            .find(|(_, x)| x.is_used() && x.last_lba > last_usable)
        {
            return Err(Fault::EntryInvalid {
                index,
                reason: EntryReason::OutOfRange,
            }
            .into());
        }

        self.primary.alt_lba = last_lba;
        self.primary.last_usable_lba = last_usable;
        self.backup = self.primary.backup_of(self.sector_size);
        self.touch()?;
        info!(
            "backup header moved to LBA {}, last usable LBA is now {}",
            last_lba, last_usable
        );

        Ok(true)
    }

    /// Settle a disagreement between the two copies by taking `which` as the reference. The
    /// other copy is rebuilt from it.
    pub fn adopt(&mut self, which: Which) -> Result<()> {
        if self.state == State::Poisoned {
            return Err(Error::Poisoned);
        }

        match which {
            Which::Primary => {
                let my_lba = self.backup.my_lba;
                let array_lba = my_lba.saturating_sub(self.primary.array_sectors(self.sector_size));
                self.backup = self.primary.mirror(my_lba, array_lba);
            }
            Which::Backup => {
                if let Some(entries) = self.alternate.take() {
                    self.entries = entries;
                }
                self.primary = self.backup.primary_of();
            }
        }
        self.alternate = None;
        self.touch()?;
        info!("{} copy adopted", which);

        Ok(())
    }

    /// Persist the label.
    ///
    /// CRCs are recomputed and the label is verified first: nothing is written if a critical
    /// fault is found, or if LBA 0 holds a hybrid MBR. Then the backup array, the backup header,
    /// the primary array, the primary header and the protective MBR are written in that order,
    /// and the device is flushed. A failure after that point poisons the label, unless the
    /// device refused the first step for being read-only.
    pub fn write(&mut self) -> Result<()> {
        if self.state == State::Poisoned {
            return Err(Error::Poisoned);
        }
        if self.pmbr_kind() == PmbrKind::Hybrid
            || Pmbr::read_from(&mut self.device)?.kind(self.total_sectors) == PmbrKind::Hybrid
        {
            return Err(Error::HybridMbr);
        }

        let mut report = Report::new();
        if self.alternate.is_some() {
            report.push(Fault::HeaderMismatch {
                field: HeaderField::EntryArrayCrc,
            });
        }
        self.recompute_crcs()?;
        report.extend(self.verify().faults().iter().cloned());
        if report.has_critical() {
            return Err(Error::Rejected(report));
        }

        let ss = self.sector_size;
        let array = entry::encode_sectors(&self.entries, self.primary.entry_size, ss)?;
        let backup_header = self.backup.encode(ss)?;
        let primary_header = self.primary.encode(ss)?;
        let pmbr = self.pmbr.to_protective(self.total_sectors);
        let pmbr_sector = pmbr.encode(ss)?;

        let steps: [(WriteStep, u64, &[u8]); 5] = [
            (WriteStep::BackupArray, self.backup.entry_array_lba, &array[..]),
            (WriteStep::BackupHeader, self.backup.my_lba, &backup_header[..]),
            (WriteStep::PrimaryArray, self.primary.entry_array_lba, &array[..]),
            (WriteStep::PrimaryHeader, self.primary.my_lba, &primary_header[..]),
            (WriteStep::ProtectiveMbr, 0, &pmbr_sector[..]),
        ];
        for (step, lba, data) in steps.iter() {
            debug!("step {}: {} bytes at LBA {}", step, data.len(), lba);
            if let Err(err) = self.device.write_at(*lba, data) {
                if let (WriteStep::BackupArray, Error::ReadOnly) = (*step, &err) {
                    return Err(err);
                }
                warn!("write failed at step {}: {}", step, err);
                self.state = State::Poisoned;
                return Err(Error::PartialWrite {
                    step: *step,
                    source: Box::new(err),
                });
            }
        }
        if let Err(err) = self.device.flush() {
            warn!("flush failed: {}", err);
            self.state = State::Poisoned;
            return Err(Error::FlushFailed(Box::new(err)));
        }

        self.pmbr = pmbr;
        self.report = report;
        self.state = State::Loaded;
        info!("partition table {} written", self.primary.disk_guid);

        Ok(())
    }
}

/// Read the copy of the table whose header is at `lba`. Only device errors are returned as
/// errors: a copy that fails a check is an [`Outcome`].
fn read_copy<D: BlockDevice + ?Sized>(device: &mut D, lba: u64, which: Which) -> Result<Outcome> {
    let header = match Header::read_from(device, lba, which) {
        Ok(header) => header,
        Err(Error::Invalid(fault)) => return Ok(Outcome::Lost(fault)),
        Err(err) => return Err(err),
    };

    if let Some(reason) = array_problem(&header, device.sector_size(), device.total_sectors()) {
        debug!("{} partition entry array rejected: {}", which, reason);
        return Ok(Outcome::Lost(Fault::ArrayInvalid { which, reason }));
    }
    if !usable_is_sound(&header, device.sector_size(), device.total_sectors()) {
        debug!(
            "{} header rejected: usable range {}-{}",
            which, header.first_usable_lba, header.last_usable_lba
        );
        return Ok(Outcome::Lost(Fault::HeaderInvalid {
            which,
            reason: HeaderReason::UsableRange,
        }));
    }

    let (entries, crc) = entry::read_array(device, &header)?;
    let copy = TableCopy { header, entries };
    if crc != copy.header.entry_array_crc32 {
        debug!("{} partition entry array has CRC32 {:#010x}", which, crc);
        return Ok(Outcome::Damaged(
            copy,
            Fault::ArrayInvalid {
                which,
                reason: ArrayReason::Crc,
            },
        ));
    }

    Ok(Outcome::Good(copy))
}

/// Whether the array described by `header` cannot even be read.
fn array_problem(header: &Header, sector_size: u64, total_sectors: u64) -> Option<ArrayReason> {
    if header.entry_size < ENTRY_SIZE || header.entry_size % ENTRY_SIZE != 0 {
        return Some(ArrayReason::EntrySize);
    }
    if header.entry_count == 0 {
        return Some(ArrayReason::Count);
    }

    match header.array_segment(sector_size) {
        Some(array) if array.start > 0 && array.end < total_sectors => {
            if array.contains(header.my_lba) {
                Some(ArrayReason::Location)
            } else {
                None
            }
        }
        _ => Some(ArrayReason::Location),
    }
}

/// Whether the usable range of `header` is not empty, lies inside the medium past LBA 0, and
/// keeps clear of the header itself and of its array.
fn usable_is_sound(header: &Header, sector_size: u64, total_sectors: u64) -> bool {
    let usable = match header.usable() {
        Some(usable) if usable.start > 0 && usable.end < total_sectors => usable,
        _ => return false,
    };

    !usable.contains(header.my_lba)
        && header
            .array_segment(sector_size)
            .map_or(true, |array| !array.overlaps(&usable))
}

impl<D> Index<u32> for Label<D> {
    type Output = Entry;

    fn index(&self, i: u32) -> &Self::Output {
        assert!(i != 0, "invalid partition index: 0");
        &self.entries[i as usize - 1]
    }
}
