//! Consistency checks over the protective MBR, both headers and the partition entry array.

use crate::entry::{self, Entry, ENTRY_SIZE};
use crate::geometry::Segment;
use crate::header::{Header, HEADER_SIZE, PRIMARY_LBA, REVISIONS, SIGNATURE};
use crate::label::Label;
use crate::pmbr::PmbrKind;
use crate::BlockDevice;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// One of the two copies of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Which {
    /// The copy at LBA 1.
    Primary,
    /// The copy at the end of the medium.
    Backup,
}

impl fmt::Display for Which {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Which::Primary => write!(f, "primary"),
            Which::Backup => write!(f, "backup"),
        }
    }
}

/// Why a header is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderReason {
    /// Not `"EFI PART"`.
    #[error("bad signature")]
    Signature,
    /// Unknown revision.
    #[error("unsupported revision")]
    Revision,
    /// `header_size` out of `92..=sector_size`.
    #[error("bad header size")]
    Size,
    /// The header CRC does not match.
    #[error("corrupted CRC32 checksum")]
    Crc,
    /// `my_lba` is not where the header is.
    #[error("wrong location of the header (my_lba)")]
    MyLba,
    /// `alt_lba` does not point at the other header.
    #[error("wrong location of the other header (alt_lba)")]
    AltLba,
    /// The usable range is empty, outside the medium, or overlaps the metadata.
    #[error("invalid usable range")]
    UsableRange,
}

/// Why a partition entry array is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArrayReason {
    /// The array CRC does not match.
    #[error("corrupted CRC32 checksum")]
    Crc,
    /// `entry_size` is not a multiple of 128.
    #[error("bad entry size")]
    EntrySize,
    /// `entry_count` is zero or does not match the entries.
    #[error("bad number of entries")]
    Count,
    /// The array does not fit in the medium or overlaps a header.
    #[error("bad location")]
    Location,
}

/// Why a partition entry is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EntryReason {
    /// Outside of the usable range.
    #[error("outside of the usable range")]
    OutOfRange,
    /// `last_lba` lower than `first_lba`.
    #[error("ends before it starts")]
    Reversed,
    /// Shares sectors with the given partition.
    #[error("overlaps partition {0}")]
    Overlaps(u32),
    /// Has the same unique GUID as the given partition.
    #[error("has the same unique GUID as partition {0}")]
    DuplicateGuid(u32),
}

/// A field on which the primary and the backup headers disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderField {
    /// `revision`
    Revision,
    /// `header_size`
    HeaderSize,
    /// `entry_count`
    EntryCount,
    /// `entry_size`
    EntrySize,
    /// `first_usable_lba`
    FirstUsableLba,
    /// `last_usable_lba`
    LastUsableLba,
    /// `disk_guid`
    DiskGuid,
    /// `entry_array_crc32`
    EntryArrayCrc,
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeaderField::Revision => "revision",
            HeaderField::HeaderSize => "header_size",
            HeaderField::EntryCount => "entry_count",
            HeaderField::EntrySize => "entry_size",
            HeaderField::FirstUsableLba => "first_usable_lba",
            HeaderField::LastUsableLba => "last_usable_lba",
            HeaderField::DiskGuid => "disk_guid",
            HeaderField::EntryArrayCrc => "entry_array_crc32",
        };
        f.write_str(name)
    }
}

/// A single finding of the validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// LBA 0 holds no valid protective MBR.
    #[error("invalid protective MBR")]
    InvalidPmbr,
    /// LBA 0 holds a hybrid MBR. This is a warning: the table is usable but cannot be written.
    #[error("hybrid MBR detected")]
    HybridMbr,
    /// A header is invalid.
    #[error("{which} header: {reason}")]
    HeaderInvalid {
        /// The copy.
        which: Which,
        /// What is wrong.
        reason: HeaderReason,
    },
    /// A partition entry array is invalid.
    #[error("{which} partition entry array: {reason}")]
    ArrayInvalid {
        /// The copy.
        which: Which,
        /// What is wrong.
        reason: ArrayReason,
    },
    /// A partition entry is invalid. `index` is the partition number.
    #[error("partition {index}: {reason}")]
    EntryInvalid {
        /// The partition number, starting at 1.
        index: u32,
        /// What is wrong.
        reason: EntryReason,
    },
    /// The primary and the backup headers disagree.
    #[error("primary and backup headers disagree on {field}")]
    HeaderMismatch {
        /// The field.
        field: HeaderField,
    },
}

impl Fault {
    /// Returns `true` unless the fault is only a warning.
    pub fn is_critical(&self) -> bool {
        *self != Fault::HybridMbr
    }
}

/// Every fault found by a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    faults: Vec<Fault>,
}

impl Report {
    /// An empty report.
    pub fn new() -> Report {
        Report::default()
    }

    /// Record a fault. A fault already present is not recorded twice.
    pub fn push(&mut self, fault: Fault) {
        if !self.faults.contains(&fault) {
            self.faults.push(fault);
        }
    }

    /// Faults in the order they have been found.
    pub fn faults(&self) -> &[Fault] {
        &self.faults
    }

    /// Returns `true` if nothing at all has been found, warnings included.
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    /// Returns `true` if the report holds a fault that forbids writing.
    pub fn has_critical(&self) -> bool {
        self.faults.iter().any(Fault::is_critical)
    }

    /// Faults that forbid writing.
    pub fn critical(&self) -> impl Iterator<Item = &Fault> {
        self.faults.iter().filter(|x| x.is_critical())
    }

    /// Faults that do not forbid writing.
    pub fn warnings(&self) -> impl Iterator<Item = &Fault> {
        self.faults.iter().filter(|x| !x.is_critical())
    }

    /// Returns `true` if `fault` has been found.
    pub fn contains(&self, fault: &Fault) -> bool {
        self.faults.contains(fault)
    }
}

impl Extend<Fault> for Report {
    fn extend<I: IntoIterator<Item = Fault>>(&mut self, iter: I) {
        for fault in iter {
            self.push(fault);
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.faults.is_empty() {
            return write!(f, "no errors detected");
        }

        for (i, fault) in self.faults.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", fault)?;
        }

        Ok(())
    }
}

/// Run every check over `label`. Equivalent to [`Label::verify`].
pub fn verify<D: BlockDevice>(label: &Label<D>) -> Report {
    label.verify()
}

/// What the validator looks at.
pub(crate) struct Subject<'a> {
    pub pmbr: PmbrKind,
    pub primary: &'a Header,
    pub backup: &'a Header,
    pub entries: &'a [Entry],
    pub total_sectors: u64,
    pub sector_size: u64,
}

impl<'a> Subject<'a> {
    pub fn check(&self) -> Report {
        let mut report = Report::new();

        match self.pmbr {
            PmbrKind::Protective => {}
            PmbrKind::Hybrid => report.push(Fault::HybridMbr),
            PmbrKind::Invalid => report.push(Fault::InvalidPmbr),
        }

        let last_lba = self.total_sectors.saturating_sub(1);
        self.check_header(&mut report, Which::Primary, self.primary, self.backup, PRIMARY_LBA);
        self.check_header(&mut report, Which::Backup, self.backup, self.primary, last_lba);
        self.check_agreement(&mut report);
        self.check_entries(&mut report);

        report
    }

    /// Sectors no partition and no usable range may cover.
    fn metadata(&self) -> Vec<Segment> {
        let mut reserved = vec![Segment::new(0, 0)];
        for header in &[self.primary, self.backup] {
            reserved.push(Segment::new(header.my_lba, header.my_lba));
            if let Some(array) = header.array_segment(self.sector_size) {
                reserved.push(array);
            }
        }

        reserved
    }

    fn check_header(
        &self,
        report: &mut Report,
        which: Which,
        header: &Header,
        sibling: &Header,
        expected_lba: u64,
    ) {
        let mut invalid = |reason| report.push(Fault::HeaderInvalid { which, reason });

        if header.signature != SIGNATURE {
            invalid(HeaderReason::Signature);
        }
        if !REVISIONS.contains(&header.revision) {
            invalid(HeaderReason::Revision);
        }
        if header.header_size < HEADER_SIZE || header.header_size as u64 > self.sector_size {
            invalid(HeaderReason::Size);
        }
        if header.header_crc32 != header.generate_crc32_checksum() {
            invalid(HeaderReason::Crc);
        }
        if header.my_lba != expected_lba {
            invalid(HeaderReason::MyLba);
        }
        if header.alt_lba != sibling.my_lba {
            invalid(HeaderReason::AltLba);
        }

        let metadata = self.metadata();
        match header.usable() {
            Some(usable)
                if usable.end < self.total_sectors
                    && metadata.iter().all(|x| !x.overlaps(&usable)) => {}
            _ => invalid(HeaderReason::UsableRange),
        }

        let mut invalid = |reason| report.push(Fault::ArrayInvalid { which, reason });

        let entry_size_ok = header.entry_size >= ENTRY_SIZE && header.entry_size % ENTRY_SIZE == 0;
        if !entry_size_ok {
            invalid(ArrayReason::EntrySize);
        }
        let count_ok =
            header.entry_count > 0 && header.entry_count as usize == self.entries.len();
        if !count_ok {
            invalid(ArrayReason::Count);
        }

        match header.array_segment(self.sector_size) {
            Some(array)
                if array.start > 0
                    && array.end < self.total_sectors
                    && !array.contains(self.primary.my_lba)
                    && !array.contains(self.backup.my_lba) => {}
            _ => invalid(ArrayReason::Location),
        }

        if entry_size_ok && count_ok {
            match entry::array_crc32(self.entries, header.entry_size) {
                Ok(crc) if crc == header.entry_array_crc32 => {}
                _ => invalid(ArrayReason::Crc),
            }
        }
    }

    fn check_agreement(&self, report: &mut Report) {
        let (p, b) = (self.primary, self.backup);

        report.extend(mismatches(p, b).into_iter().map(|field| Fault::HeaderMismatch { field }));
    }

    fn check_entries(&self, report: &mut Report) {
        let usable = self.primary.usable();
        let mut valid: Vec<(u32, Segment)> = Vec::new();
        let mut guids = HashMap::new();

        for (i, entry) in self.entries.iter().enumerate().filter(|(_, x)| x.is_used()) {
            let index = i as u32 + 1;
            let mut invalid = |reason| report.push(Fault::EntryInvalid { index, reason });

            if let Some(other) = guids.insert(entry.unique_guid, index) {
                guids.insert(entry.unique_guid, other);
                invalid(EntryReason::DuplicateGuid(other));
            }

            if entry.first_lba > entry.last_lba {
                invalid(EntryReason::Reversed);
                continue;
            }

            let range = Segment::new(entry.first_lba, entry.last_lba);
            match usable {
                Some(usable) if usable.contains(range.start) && usable.contains(range.end) => {}
                _ => invalid(EntryReason::OutOfRange),
            }

            if let Some((other, _)) = valid.iter().find(|(_, x)| x.overlaps(&range)) {
                invalid(EntryReason::Overlaps(*other));
            }
            valid.push((index, range));
        }
    }
}

/// Fields on which `primary` and `backup` disagree.
pub(crate) fn mismatches(primary: &Header, backup: &Header) -> Vec<HeaderField> {
    let checks = [
        (primary.revision == backup.revision, HeaderField::Revision),
        (primary.header_size == backup.header_size, HeaderField::HeaderSize),
        (primary.entry_count == backup.entry_count, HeaderField::EntryCount),
        (primary.entry_size == backup.entry_size, HeaderField::EntrySize),
        (
            primary.first_usable_lba == backup.first_usable_lba,
            HeaderField::FirstUsableLba,
        ),
        (
            primary.last_usable_lba == backup.last_usable_lba,
            HeaderField::LastUsableLba,
        ),
        (primary.disk_guid == backup.disk_guid, HeaderField::DiskGuid),
        (
            primary.entry_array_crc32 == backup.entry_array_crc32,
            HeaderField::EntryArrayCrc,
        ),
    ];

    checks
        .iter()
        .filter(|(same, _)| !same)
        .map(|(_, field)| *field)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::guid::Guid;

    struct Fixture {
        pmbr: PmbrKind,
        primary: Header,
        backup: Header,
        entries: Vec<Entry>,
    }

    impl Fixture {
        fn new() -> Fixture {
            let primary = Header::new_primary(2_097_152, 512, 128, 2048, Guid::generate());
            let backup = primary.backup_of(512);
            let mut fixture = Fixture {
                pmbr: PmbrKind::Protective,
                primary,
                backup,
                entries: vec![Entry::empty(); 128],
            };
            fixture.seal();
            fixture
        }

        fn add(&mut self, i: usize, first: u64, last: u64) {
            self.entries[i] = Entry {
                type_guid: Guid::from_bytes([0xff; 16]),
                unique_guid: Guid::generate(),
                first_lba: first,
                last_lba: last,
                ..Entry::empty()
            };
            self.seal();
        }

        fn seal(&mut self) {
            for header in [&mut self.primary, &mut self.backup].iter_mut() {
                header.entry_array_crc32 = entry::array_crc32(&self.entries, 128).unwrap();
                header.update_crc32_checksum();
            }
        }

        fn check(&self) -> Report {
            Subject {
                pmbr: self.pmbr,
                primary: &self.primary,
                backup: &self.backup,
                entries: &self.entries,
                total_sectors: 2_097_152,
                sector_size: 512,
            }
            .check()
        }
    }

    #[test]
    fn fresh_label_is_clean() {
        let report = Fixture::new().check();
        assert!(report.is_clean(), "{}", report);
        assert_eq!(report.to_string(), "no errors detected");
    }

    #[test]
    fn pmbr_kinds() {
        let mut fixture = Fixture::new();
        fixture.pmbr = PmbrKind::Hybrid;
        let report = fixture.check();
        assert!(!report.is_clean());
        assert!(!report.has_critical());
        assert_eq!(report.warnings().collect::<Vec<_>>(), vec![&Fault::HybridMbr]);

        fixture.pmbr = PmbrKind::Invalid;
        assert_eq!(fixture.check().faults(), &[Fault::InvalidPmbr]);
    }

    #[test]
    fn every_fault_is_reported() {
        let mut fixture = Fixture::new();
        fixture.add(0, 2048, 4095);
        fixture.add(1, 4000, 8191);
        fixture.add(2, 9000, 8999);
        fixture.add(3, 100, 200);
        fixture.entries[4] = fixture.entries[0].clone();
        fixture.entries[4].first_lba = 10_000;
        fixture.entries[4].last_lba = 10_000;
        fixture.seal();

        let report = fixture.check();
        let expected = [
            Fault::EntryInvalid {
                index: 2,
                reason: EntryReason::Overlaps(1),
            },
            Fault::EntryInvalid {
                index: 3,
                reason: EntryReason::Reversed,
            },
            Fault::EntryInvalid {
                index: 4,
                reason: EntryReason::OutOfRange,
            },
            Fault::EntryInvalid {
                index: 5,
                reason: EntryReason::DuplicateGuid(1),
            },
        ];
        assert_eq!(report.faults(), &expected[..]);
        assert!(report.has_critical());
    }

    #[test]
    fn stale_crcs() {
        let mut fixture = Fixture::new();
        fixture.add(0, 2048, 4095);
        fixture.entries[0].last_lba = 5000;
        fixture.backup.disk_guid = Guid::generate();

        let report = fixture.check();
        assert!(report.contains(&Fault::ArrayInvalid {
            which: Which::Primary,
            reason: ArrayReason::Crc
        }));
        assert!(report.contains(&Fault::ArrayInvalid {
            which: Which::Backup,
            reason: ArrayReason::Crc
        }));
        assert!(report.contains(&Fault::HeaderInvalid {
            which: Which::Backup,
            reason: HeaderReason::Crc
        }));
        assert!(report.contains(&Fault::HeaderMismatch {
            field: HeaderField::DiskGuid
        }));
        assert!(!report.contains(&Fault::HeaderInvalid {
            which: Which::Primary,
            reason: HeaderReason::Crc
        }));
    }

    #[test]
    fn header_locations() {
        let mut fixture = Fixture::new();
        fixture.backup.my_lba = 2_000_000;
        fixture.backup.entry_array_lba = 2_000_000 - 32;
        fixture.backup.update_crc32_checksum();

        let report = fixture.check();
        assert!(report.contains(&Fault::HeaderInvalid {
            which: Which::Backup,
            reason: HeaderReason::MyLba
        }));
        assert!(report.contains(&Fault::HeaderInvalid {
            which: Which::Primary,
            reason: HeaderReason::AltLba
        }));
        assert!(report.contains(&Fault::HeaderInvalid {
            which: Which::Primary,
            reason: HeaderReason::UsableRange
        }));
    }

    #[test]
    fn usable_range_must_avoid_the_arrays() {
        let mut fixture = Fixture::new();
        for header in [&mut fixture.primary, &mut fixture.backup].iter_mut() {
            header.first_usable_lba = 20;
        }
        fixture.seal();

        let report = fixture.check();
        assert_eq!(
            report.faults(),
            &[
                Fault::HeaderInvalid {
                    which: Which::Primary,
                    reason: HeaderReason::UsableRange
                },
                Fault::HeaderInvalid {
                    which: Which::Backup,
                    reason: HeaderReason::UsableRange
                }
            ]
        );

        // 34 is right after a 128 entries array
        let mut fixture = Fixture::new();
        for header in [&mut fixture.primary, &mut fixture.backup].iter_mut() {
            header.first_usable_lba = 34;
        }
        fixture.seal();
        assert!(fixture.check().is_clean());
    }

    #[test]
    fn larger_arrays_move_the_usable_range() {
        let primary = Header::new_primary(2_097_152, 512, 256, 66, Guid::generate());
        let backup = primary.backup_of(512);
        let mut fixture = Fixture {
            pmbr: PmbrKind::Protective,
            primary,
            backup,
            entries: vec![Entry::empty(); 256],
        };
        fixture.seal();
        assert!(fixture.check().is_clean(), "{}", fixture.check());

        fixture.primary.first_usable_lba = 65;
        fixture.backup.first_usable_lba = 65;
        fixture.seal();
        assert!(fixture.check().contains(&Fault::HeaderInvalid {
            which: Which::Primary,
            reason: HeaderReason::UsableRange
        }));
    }

    #[test]
    fn array_geometry() {
        let mut fixture = Fixture::new();
        fixture.primary.entry_size = 100;
        fixture.primary.update_crc32_checksum();

        let report = fixture.check();
        assert!(report.contains(&Fault::ArrayInvalid {
            which: Which::Primary,
            reason: ArrayReason::EntrySize
        }));
        assert!(report.contains(&Fault::HeaderMismatch {
            field: HeaderField::EntrySize
        }));
        assert!(!report.contains(&Fault::ArrayInvalid {
            which: Which::Primary,
            reason: ArrayReason::Crc
        }));
    }

    #[test]
    fn report_display_lists_every_fault() {
        let mut report = Report::new();
        report.push(Fault::HeaderInvalid {
            which: Which::Primary,
            reason: HeaderReason::Signature,
        });
        report.push(Fault::EntryInvalid {
            index: 2,
            reason: EntryReason::Overlaps(1),
        });
        report.push(Fault::EntryInvalid {
            index: 2,
            reason: EntryReason::Overlaps(1),
        });

        assert_eq!(report.faults().len(), 2);
        assert_eq!(
            report.to_string(),
            "primary header: bad signature; partition 2: overlaps partition 1"
        );
    }
}
