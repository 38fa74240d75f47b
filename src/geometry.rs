//! Free space and allocation of partitions inside the usable range.

use crate::entry::Entry;
use crate::topology::{align_down, align_up};
use crate::verify::{EntryReason, Fault};
use crate::{Error, Result};

/// An inclusive range of sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Segment {
    /// First sector.
    pub start: u64,
    /// Last sector (inclusive).
    pub end: u64,
}

impl Segment {
    /// The sectors `start..=end`. `start` must not be greater than `end`.
    pub fn new(start: u64, end: u64) -> Segment {
        debug_assert!(start <= end, "reversed segment {}-{}", start, end);
        Segment { start, end }
    }

    /// Number of sectors in the segment.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always `false`: a segment holds at least one sector.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns `true` if `lba` is in the segment.
    pub fn contains(&self, lba: u64) -> bool {
        self.start <= lba && lba <= self.end
    }

    /// Returns `true` if the two segments share at least one sector.
    pub fn overlaps(&self, other: &Segment) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Where a new partition goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// Exactly `first..=last`. No alignment is applied.
    Explicit {
        /// First sector.
        first: u64,
        /// Last sector (inclusive).
        last: u64,
    },
    /// `sectors` sectors in the first free segment that can hold them, starting at or after
    /// `start` when given. The start is aligned.
    Sized {
        /// Lowest acceptable first sector.
        start: Option<u64>,
        /// Size of the partition in sectors.
        sectors: u64,
    },
    /// All of the largest free segment, or of the free segment containing `start` when given.
    /// Both ends are aligned when the segment allows it.
    Largest {
        /// A sector of the segment to fill, used as the first sector after alignment.
        start: Option<u64>,
    },
}

/// Summary of the free space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreeStats {
    /// Free sectors in total.
    pub total: u64,
    /// Number of free segments.
    pub segments: usize,
    /// Size of the largest free segment in sectors.
    pub largest: u64,
}

/// A view of the usable range and of the partitions occupying it.
///
/// # Examples
///
/// ```
/// use gptlabel::{Entry, Geometry, Guid, Segment};
///
/// let mut entries = vec![Entry::empty(); 4];
/// entries[0].type_guid = Guid::from_bytes([0xff; 16]);
/// entries[0].first_lba = 2048;
/// entries[0].last_lba = 4095;
///
/// let geometry = Geometry::new(Some(Segment::new(34, 8191)), &entries, 2048);
/// assert_eq!(
///     geometry.free_segments(),
///     vec![Segment::new(34, 2047), Segment::new(4096, 8191)]
/// );
/// assert_eq!(geometry.first_fit(1024), Some(Segment::new(4096, 5119)));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Geometry<'a> {
    usable: Option<Segment>,
    entries: &'a [Entry],
    align: u64,
}

impl<'a> Geometry<'a> {
    /// The usable range (`None` if empty), the partition entries, and the alignment in sectors.
    pub fn new(usable: Option<Segment>, entries: &'a [Entry], align: u64) -> Geometry<'a> {
        Geometry {
            usable,
            entries,
            align: align.max(1),
        }
    }

    /// Alignment in sectors.
    pub fn align(&self) -> u64 {
        self.align
    }

    fn used(&self) -> impl Iterator<Item = (u32, Segment)> + 'a {
        let entries: &'a [Entry] = self.entries;

        entries
            .iter()
            .enumerate()
            .filter(|(_, x)| x.is_used() && x.first_lba <= x.last_lba)
            .map(|(i, x)| (i as u32 + 1, Segment::new(x.first_lba, x.last_lba)))
    }

    /// The usable range minus every used partition, in ascending order.
    pub fn free_segments(&self) -> Vec<Segment> {
        let usable = match self.usable {
            Some(x) => x,
            None => return Vec::new(),
        };

        let mut used: Vec<Segment> = self.used().map(|(_, x)| x).collect();
        used.sort_unstable();

        let mut free = Vec::new();
        let mut cursor = usable.start;
        let mut done = false;
        for segment in used {
            if segment.end < cursor || segment.start > usable.end {
                continue;
            }
            if segment.start > cursor {
                free.push(Segment::new(cursor, segment.start - 1));
            }
            if segment.end >= usable.end {
                done = true;
                break;
            }
            cursor = cursor.max(segment.end + 1);
        }
        if !done {
            free.push(Segment::new(cursor, usable.end));
        }

        free
    }

    /// The widest free segment. Ties go to the lowest start.
    pub fn largest_free(&self) -> Option<Segment> {
        self.free_segments()
            .into_iter()
            .fold(None, |best: Option<Segment>, x| match best {
                Some(b) if b.len() >= x.len() => Some(b),
                _ => Some(x),
            })
    }

    /// The first `need` sectors with an aligned start in the first free segment that can hold
    /// them.
    pub fn first_fit(&self, need: u64) -> Option<Segment> {
        self.first_fit_from(0, need)
    }

    fn first_fit_from(&self, from: u64, need: u64) -> Option<Segment> {
        if need == 0 {
            return None;
        }

        self.free_segments()
            .into_iter()
            .filter(|x| x.end >= from)
            .find_map(|x| {
                let start = align_up(x.start.max(from), self.align);
                let end = start.checked_add(need - 1)?;
                if start >= x.start && end <= x.end {
                    Some(Segment::new(start, end))
                } else {
                    None
                }
            })
    }

    /// Total free sectors, number of free segments and largest one.
    pub fn stats(&self) -> FreeStats {
        self.free_segments()
            .iter()
            .fold(FreeStats::default(), |stats, x| FreeStats {
                total: stats.total + x.len(),
                segments: stats.segments + 1,
                largest: stats.largest.max(x.len()),
            })
    }

    /// The partition using `lba`.
    pub fn find_at_sector(&self, lba: u64) -> Option<u32> {
        self.used().find(|(_, x)| x.contains(lba)).map(|(i, _)| i)
    }

    /// Check that a partition stored at number `partno` may use `first..=last`.
    pub fn check_range(&self, partno: u32, first: u64, last: u64) -> Result<Segment> {
        let invalid = |reason| Fault::EntryInvalid {
            index: partno,
            reason,
        };

        if first > last {
            return Err(invalid(EntryReason::Reversed).into());
        }

        let range = Segment::new(first, last);
        match self.usable {
            Some(usable) if usable.contains(first) && usable.contains(last) => {}
            _ => return Err(invalid(EntryReason::OutOfRange).into()),
        }

        if let Some((other, _)) = self
            .used()
            .find(|(i, x)| *i != partno && x.overlaps(&range))
        {
            return Err(invalid(EntryReason::Overlaps(other)).into());
        }

        Ok(range)
    }

    /// Pick the sectors of a new partition stored at number `partno`.
    pub fn allocate(&self, partno: u32, spec: &RangeSpec) -> Result<Segment> {
        match *spec {
            RangeSpec::Explicit { first, last } => self.check_range(partno, first, last),
            RangeSpec::Sized { sectors: 0, .. } => {
                Err(Error::BadSpec("a partition needs at least one sector"))
            }
            RangeSpec::Sized { start, sectors } => {
                let range = self
                    .first_fit_from(start.unwrap_or(0), sectors)
                    .ok_or(Error::NoFreeSpace)?;

                Ok(self.align_end(range, sectors))
            }
            RangeSpec::Largest { start } => {
                let segment = match start {
                    Some(lba) => {
                        let segment = self
                            .free_segments()
                            .into_iter()
                            .find(|x| x.contains(lba));
                        match (segment, self.find_at_sector(lba)) {
                            (Some(x), _) => Segment::new(lba, x.end),
                            (None, Some(other)) => {
                                return Err(Fault::EntryInvalid {
                                    index: partno,
                                    reason: EntryReason::Overlaps(other),
                                }
                                .into())
                            }
                            (None, None) => {
                                return Err(Fault::EntryInvalid {
                                    index: partno,
                                    reason: EntryReason::OutOfRange,
                                }
                                .into())
                            }
                        }
                    }
                    None => self.largest_free().ok_or(Error::NoFreeSpace)?,
                };

                let first = align_up(segment.start, self.align);
                if first > segment.end {
                    return Err(Error::NoFreeSpace);
                }

                Ok(self.align_end(Segment::new(first, segment.end), 1))
            }
        }
    }

    /// Move the end of `range` down so that the sector after it is aligned, unless that would
    /// leave fewer than `min` sectors.
    fn align_end(&self, range: Segment, min: u64) -> Segment {
        let next = align_down(range.end.saturating_add(1), self.align);

        match next.checked_sub(1) {
            Some(end) if end >= range.start && end - range.start + 1 >= min => {
                Segment::new(range.start, end)
            }
            _ => range,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::guid::Guid;

    fn used(first: u64, last: u64) -> Entry {
        Entry {
            type_guid: Guid::from_bytes([0xff; 16]),
            unique_guid: Guid::generate(),
            first_lba: first,
            last_lba: last,
            ..Entry::empty()
        }
    }

    fn one_gib(entries: &[Entry]) -> Geometry<'_> {
        Geometry::new(Some(Segment::new(2048, 2_097_118)), entries, 2048)
    }

    #[test]
    fn empty_disk_is_one_free_segment() {
        let entries = vec![Entry::empty(); 128];
        let geometry = one_gib(&entries);

        assert_eq!(geometry.free_segments(), vec![Segment::new(2048, 2_097_118)]);
        assert_eq!(geometry.largest_free(), Some(Segment::new(2048, 2_097_118)));
        assert_eq!(
            geometry.stats(),
            FreeStats {
                total: 2_095_071,
                segments: 1,
                largest: 2_095_071
            }
        );
    }

    #[test]
    fn free_segments_skip_used_ranges_in_any_order() {
        let mut entries = vec![Entry::empty(); 8];
        entries[5] = used(10_000, 19_999);
        entries[1] = used(2048, 4095);
        entries[3] = used(4096, 8191);
        entries[7] = used(2_000_000, 2_097_118);

        let geometry = one_gib(&entries);
        let free = geometry.free_segments();
        assert_eq!(
            free,
            vec![Segment::new(8192, 9999), Segment::new(20_000, 1_999_999)]
        );
        assert_eq!(geometry.largest_free(), Some(free[1]));
        assert_eq!(geometry.find_at_sector(4096), Some(4));
        assert_eq!(geometry.find_at_sector(9000), None);
    }

    #[test]
    fn free_space_covers_the_usable_range() {
        let mut entries = vec![Entry::empty(); 8];
        entries[0] = used(2048, 206_847);
        entries[2] = used(600_000, 700_000);
        entries[4] = used(206_848, 300_000);
        let geometry = one_gib(&entries);

        let mut all: Vec<Segment> = geometry.free_segments();
        all.extend(
            entries
                .iter()
                .filter(|x| x.is_used())
                .map(|x| Segment::new(x.first_lba, x.last_lba)),
        );
        all.sort();

        assert_eq!(all.first().unwrap().start, 2048);
        assert_eq!(all.last().unwrap().end, 2_097_118);
        for w in all.windows(2) {
            assert_eq!(w[0].end + 1, w[1].start);
        }
    }

    #[test]
    fn ties_go_to_the_lowest_start() {
        let mut entries = vec![Entry::empty(); 2];
        entries[0] = used(110, 189);
        let geometry = Geometry::new(Some(Segment::new(100, 199)), &entries, 1);

        assert_eq!(geometry.largest_free(), Some(Segment::new(100, 109)));
    }

    #[test]
    fn first_fit_aligns_the_start() {
        let mut entries = vec![Entry::empty(); 4];
        entries[0] = used(2048, 3000);
        let geometry = one_gib(&entries);

        assert_eq!(geometry.first_fit(204_800), Some(Segment::new(4096, 208_895)));
        assert_eq!(geometry.first_fit(0), None);
        assert_eq!(geometry.first_fit(3_000_000), None);
    }

    #[test]
    fn first_fit_skips_segments_too_small_once_aligned() {
        let mut entries = vec![Entry::empty(); 4];
        entries[0] = used(3000, 5000);
        let geometry = one_gib(&entries);

        // 2048..2999 holds 952 sectors
        assert_eq!(geometry.first_fit(952), Some(Segment::new(2048, 2999)));
        assert_eq!(geometry.first_fit(953), Some(Segment::new(6144, 7096)));
    }

    #[test]
    fn allocate_sized() {
        let entries = vec![Entry::empty(); 4];
        let geometry = one_gib(&entries);

        assert_eq!(
            geometry
                .allocate(1, &RangeSpec::Sized { start: None, sectors: 204_800 })
                .unwrap(),
            Segment::new(2048, 206_847)
        );
        assert_eq!(
            geometry
                .allocate(1, &RangeSpec::Sized { start: Some(5000), sectors: 10 })
                .unwrap(),
            Segment::new(6144, 6153)
        );
        assert!(matches!(
            geometry.allocate(1, &RangeSpec::Sized { start: None, sectors: 0 }),
            Err(Error::BadSpec(_))
        ));
        assert!(matches!(
            geometry.allocate(1, &RangeSpec::Sized { start: None, sectors: 1 << 40 }),
            Err(Error::NoFreeSpace)
        ));
    }

    #[test]
    fn allocate_largest_aligns_both_ends() {
        let entries = vec![Entry::empty(); 4];
        let geometry = one_gib(&entries);

        assert_eq!(
            geometry.allocate(1, &RangeSpec::Largest { start: None }).unwrap(),
            Segment::new(2048, 2_095_103)
        );

        let tiny = Geometry::new(Some(Segment::new(34, 66)), &entries, 2048);
        assert!(matches!(
            tiny.allocate(1, &RangeSpec::Largest { start: None }),
            Err(Error::NoFreeSpace)
        ));

        let unaligned = Geometry::new(Some(Segment::new(34, 66)), &entries, 1);
        assert_eq!(
            unaligned.allocate(1, &RangeSpec::Largest { start: None }).unwrap(),
            Segment::new(34, 66)
        );
    }

    #[test]
    fn allocate_largest_from_a_start_sector() {
        let mut entries = vec![Entry::empty(); 4];
        entries[0] = used(2048, 206_847);
        let geometry = one_gib(&entries);

        assert_eq!(
            geometry
                .allocate(2, &RangeSpec::Largest { start: Some(300_000) })
                .unwrap(),
            Segment::new(301_056, 2_095_103)
        );
        assert!(matches!(
            geometry.allocate(2, &RangeSpec::Largest { start: Some(4096) }),
            Err(Error::Invalid(Fault::EntryInvalid {
                index: 2,
                reason: EntryReason::Overlaps(1)
            }))
        ));
        assert!(matches!(
            geometry.allocate(2, &RangeSpec::Largest { start: Some(10) }),
            Err(Error::Invalid(Fault::EntryInvalid {
                index: 2,
                reason: EntryReason::OutOfRange
            }))
        ));
    }

    #[test]
    fn explicit_ranges_are_checked() {
        let mut entries = vec![Entry::empty(); 4];
        entries[0] = used(2048, 206_847);
        let geometry = one_gib(&entries);

        assert_eq!(
            geometry
                .allocate(2, &RangeSpec::Explicit { first: 206_848, last: 206_850 })
                .unwrap(),
            Segment::new(206_848, 206_850)
        );
        assert!(matches!(
            geometry.allocate(2, &RangeSpec::Explicit { first: 100_000, last: 300_000 }),
            Err(Error::Invalid(Fault::EntryInvalid {
                index: 2,
                reason: EntryReason::Overlaps(1)
            }))
        ));
        assert!(matches!(
            geometry.allocate(2, &RangeSpec::Explicit { first: 300_000, last: 200_000 }),
            Err(Error::Invalid(Fault::EntryInvalid {
                reason: EntryReason::Reversed,
                ..
            }))
        ));
        assert!(matches!(
            geometry.allocate(2, &RangeSpec::Explicit { first: 100, last: 3000 }),
            Err(Error::Invalid(Fault::EntryInvalid {
                reason: EntryReason::OutOfRange,
                ..
            }))
        ));
        // a partition may be moved over its own sectors
        assert!(geometry.check_range(1, 2048, 4095).is_ok());
    }
}
