//! Sector-addressed access to a disk or a disk image.

use crate::topology::Topology;
use crate::{Error, IoOp, Result};
use log::debug;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A seekable medium addressed by logical sectors.
///
/// Requests are whole sectors. Implementations never extend the medium: a request that does not
/// fit fails before any I/O happens.
pub trait BlockDevice {
    /// Logical sector size in bytes.
    fn sector_size(&self) -> u64;

    /// Number of logical sectors on the medium.
    fn total_sectors(&self) -> u64;

    /// I/O topology of the medium.
    fn topology(&self) -> Topology {
        Topology::new(self.sector_size())
    }

    /// Fill `buf` with the sectors starting at `lba`. A short read at the end of the medium fails
    /// with [`Error::Truncated`].
    fn read_at(&mut self, lba: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `buf` to the sectors starting at `lba`.
    fn write_at(&mut self, lba: u64, buf: &[u8]) -> Result<()>;

    /// Make every previous write durable.
    fn flush(&mut self) -> Result<()>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn sector_size(&self) -> u64 {
        (**self).sector_size()
    }

    fn total_sectors(&self) -> u64 {
        (**self).total_sectors()
    }

    fn topology(&self) -> Topology {
        (**self).topology()
    }

    fn read_at(&mut self, lba: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_at(lba, buf)
    }

    fn write_at(&mut self, lba: u64, buf: &[u8]) -> Result<()> {
        (**self).write_at(lba, buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Number of sectors covered by a buffer of `len` bytes.
pub(crate) fn sectors_in(len: usize, sector_size: u64) -> Result<u64> {
    let len = len as u64;

    if len == 0 || len % sector_size != 0 {
        Err(Error::BufferSize(len as usize))
    } else {
        Ok(len / sector_size)
    }
}

/// A [`BlockDevice`] over anything that reads, writes and seeks: a file, a block device node
/// or an in-memory image.
///
/// # Examples
///
/// ```
/// use gptlabel::{BlockDevice, Disk};
/// use std::io::Cursor;
///
/// let mut disk = Disk::new(Cursor::new(vec![0; 4096]), 512)?;
/// assert_eq!(disk.total_sectors(), 8);
///
/// disk.write_at(7, &[0xff; 512])?;
/// assert!(disk.write_at(8, &[0xff; 512]).is_err());
/// # Ok::<(), gptlabel::Error>(())
/// ```
#[derive(Debug)]
pub struct Disk<T> {
    inner: T,
    sector_size: u64,
    total_sectors: u64,
    topology: Topology,
    readonly: bool,
}

impl<T: Read + Write + Seek> Disk<T> {
    /// Wrap `inner`. Its current length, rounded down to whole sectors, is the size of the
    /// medium.
    pub fn new(mut inner: T, sector_size: u64) -> Result<Disk<T>> {
        if sector_size < 512 || !sector_size.is_power_of_two() {
            return Err(Error::BadSpec(
                "the sector size must be a power of two of at least 512 bytes",
            ));
        }

        let len = inner
            .seek(SeekFrom::End(0))
            .map_err(|err| Error::io(IoOp::Query, err))?;
        debug!("medium of {} bytes, {} bytes per sector", len, sector_size);

        Ok(Disk {
            inner,
            sector_size,
            total_sectors: len / sector_size,
            topology: Topology::new(sector_size),
            readonly: false,
        })
    }

    /// Replace the topology. Its logical sector size is forced to the one of the disk.
    pub fn with_topology(mut self, topology: Topology) -> Disk<T> {
        self.topology = Topology::from_device(
            self.sector_size,
            Some(topology.physical_sector_size),
            Some(topology.minimum_io_size),
            Some(topology.optimal_io_size),
        );
        self
    }

    /// Refuse every write from now on.
    pub fn read_only(mut self) -> Disk<T> {
        self.readonly = true;
        self
    }

    /// Returns `true` if writes are refused.
    pub fn is_read_only(&self) -> bool {
        self.readonly
    }

    /// Gets a reference to the underlying medium.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Gets a mutable reference to the underlying medium.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwraps the underlying medium.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn offset_of(&self, lba: u64, sectors: u64) -> Result<u64> {
        match lba.checked_add(sectors) {
            Some(end) if end <= self.total_sectors => Ok(lba * self.sector_size),
            _ => Err(Error::OutOfBounds { lba, sectors }),
        }
    }

    fn seek_to(&mut self, offset: u64, op: IoOp) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(offset))
            .map(|_| ())
            .map_err(|err| Error::io(op, err))
    }
}

impl Disk<fs::File> {
    /// Open a disk image or a block device.
    ///
    /// Block devices report their own sector size and topology (on Linux); regular files use
    /// 512 bytes sectors.
    pub fn open<P: AsRef<Path>>(path: P, readonly: bool) -> Result<Disk<fs::File>> {
        Self::open_with_sector_size(path, readonly, None)
    }

    /// Like [`Disk::open`] but with an explicit logical sector size.
    pub fn open_with_sector_size<P: AsRef<Path>>(
        path: P,
        readonly: bool,
        sector_size: Option<u64>,
    ) -> Result<Disk<fs::File>> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(!readonly)
            .open(path.as_ref())
            .map_err(|err| Error::io(IoOp::Open, err))?;
        debug!("opened {} (read-only: {})", path.as_ref().display(), readonly);

        let topology = discover_topology(&file)?;
        let sector_size = sector_size
            .or_else(|| topology.map(|x| x.logical_sector_size))
            .unwrap_or(512);

        let mut disk = Disk::new(file, sector_size)?;
        if let Some(topology) = topology {
            disk = disk.with_topology(topology);
        }
        disk.readonly = readonly;

        Ok(disk)
    }
}

#[cfg(target_os = "linux")]
fn discover_topology(file: &fs::File) -> Result<Option<Topology>> {
    crate::linux::get_topology(file)
        .map_err(|err| Error::io(IoOp::Query, io::Error::new(io::ErrorKind::Other, err)))
}

#[cfg(not(target_os = "linux"))]
fn discover_topology(_file: &fs::File) -> Result<Option<Topology>> {
    Ok(None)
}

impl<T: Read + Write + Seek> BlockDevice for Disk<T> {
    fn sector_size(&self) -> u64 {
        self.sector_size
    }

    fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    fn topology(&self) -> Topology {
        self.topology
    }

    fn read_at(&mut self, lba: u64, buf: &mut [u8]) -> Result<()> {
        let sectors = sectors_in(buf.len(), self.sector_size)?;
        let offset = self
            .offset_of(lba, sectors)
            .map_err(|_| Error::Truncated { lba })?;

        self.seek_to(offset, IoOp::Read { lba })?;
        self.inner.read_exact(buf).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                Error::Truncated { lba }
            } else {
                Error::io(IoOp::Read { lba }, err)
            }
        })
    }

    fn write_at(&mut self, lba: u64, buf: &[u8]) -> Result<()> {
        if self.readonly {
            return Err(Error::ReadOnly);
        }

        let sectors = sectors_in(buf.len(), self.sector_size)?;
        let offset = self.offset_of(lba, sectors)?;

        self.seek_to(offset, IoOp::Write { lba })?;
        self.inner
            .write_all(buf)
            .map_err(|err| Error::io(IoOp::Write { lba }, err))
    }

    fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .map_err(|err| Error::io(IoOp::Flush, err))
    }
}
