//! A library that reads, verifies, edits and safely rewrites GUID partition tables.
//!
//! The entry point is [`Label`]: it owns a [`BlockDevice`], the primary and backup headers and
//! the partition entry array. Every change happens in memory until [`Label::write`] persists both
//! copies in the order mandated by UEFI.
//!
//! # Examples
//!
//! Creating a new partition table on an in-memory image and adding a partition:
//!
//! ```
//! use gptlabel::{parttype, AddSpec, CreateOptions, Disk, Label, RangeSpec};
//! use std::io::Cursor;
//!
//! let disk = Disk::new(Cursor::new(vec![0; 8 << 20]), 512)?;
//! let mut label = Label::create(disk, CreateOptions::default())?;
//!
//! let added = label.add(
//!     AddSpec::new(parttype::LINUX_FILESYSTEM, RangeSpec::Sized { start: None, sectors: 4096 })
//!         .name("root"),
//! )?;
//! assert_eq!(added.partno, 1);
//! assert_eq!(label[1].first_lba, 2048);
//! assert_eq!(label[1].last_lba, 6143);
//!
//! label.write()?;
//!
//! let label = Label::open(label.into_device())?;
//! assert!(label.report().is_clean());
//! assert_eq!(label[1].name.as_str(), "root");
//! # Ok::<(), gptlabel::Error>(())
//! ```
//!
//! Listing the partitions of an existing disk:
//!
//! ```no_run
//! let disk = gptlabel::Disk::open("/dev/sda", true)?;
//! let label = gptlabel::Label::open(disk)?;
//!
//! println!("Disk GUID: {}", label.primary().disk_guid);
//!
//! for (i, p) in label.iter().filter(|(_, p)| p.is_used()) {
//!     println!(
//!         "Partition #{}: type = {}, first lba = {}, last lba = {}",
//!         i, p.type_guid, p.first_lba, p.last_lba
//!     );
//! }
//! # Ok::<(), gptlabel::Error>(())
//! ```

#![deny(missing_docs)]

use std::fmt;
use std::io;
use thiserror::Error;

pub mod attributes;
pub mod crc32;
mod device;
mod entry;
mod geometry;
mod guid;
mod header;
mod label;
pub mod parttype;
mod pmbr;
mod topology;
mod verify;

/// Linux specific helpers
#[cfg(target_os = "linux")]
pub mod linux;

pub use device::{BlockDevice, Disk};
pub use entry::{Entry, NameFit, PartitionName, ENTRY_SIZE, NAME_UNITS};
pub use geometry::{FreeStats, Geometry, RangeSpec, Segment};
pub use guid::Guid;
pub use header::{Header, HEADER_SIZE, REVISIONS, REVISION_1_0, SIGNATURE};
pub use label::{AddSpec, Added, CreateOptions, Label, OpenMode, Reorder, State};
pub use pmbr::{write_protective, MbrRecord, Pmbr, PmbrKind};
pub use topology::{align_down, align_up, Topology, DEFAULT_GRAIN};
pub use verify::{
    verify, ArrayReason, EntryReason, Fault, HeaderField, HeaderReason, Report, Which,
};

/// The device operation during which an I/O error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    /// Opening the device.
    Open,
    /// Querying the size or the topology of the device.
    Query,
    /// Reading at an LBA.
    Read {
        /// First sector of the request.
        lba: u64,
    },
    /// Writing at an LBA.
    Write {
        /// First sector of the request.
        lba: u64,
    },
    /// Flushing the device.
    Flush,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoOp::Open => write!(f, "opening the device"),
            IoOp::Query => write!(f, "querying the device"),
            IoOp::Read { lba } => write!(f, "reading LBA {}", lba),
            IoOp::Write { lba } => write!(f, "writing LBA {}", lba),
            IoOp::Flush => write!(f, "flushing the device"),
        }
    }
}

/// One of the five persistence steps of [`Label::write`], in the order they are performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WriteStep {
    /// (1) the backup partition entry array.
    BackupArray,
    /// (2) the backup header.
    BackupHeader,
    /// (3) the primary partition entry array.
    PrimaryArray,
    /// (4) the primary header.
    PrimaryHeader,
    /// (5) the protective MBR.
    ProtectiveMbr,
}

impl WriteStep {
    /// Position of the step in the write sequence, starting at 1.
    pub fn number(self) -> u8 {
        match self {
            WriteStep::BackupArray => 1,
            WriteStep::BackupHeader => 2,
            WriteStep::PrimaryArray => 3,
            WriteStep::PrimaryHeader => 4,
            WriteStep::ProtectiveMbr => 5,
        }
    }
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteStep::BackupArray => "backup partition entry array",
            WriteStep::BackupHeader => "backup header",
            WriteStep::PrimaryArray => "primary partition entry array",
            WriteStep::PrimaryHeader => "primary header",
            WriteStep::ProtectiveMbr => "protective MBR",
        };
        write!(f, "{} ({})", self.number(), name)
    }
}

/// An error that can be produced while reading, writing or managing a GPT.
#[derive(Debug, Error)]
pub enum Error {
    /// Deserialization errors.
    #[error("deserialization failed")]
    Deserialize(#[from] bincode::Error),
    /// I/O errors, with the operation that triggered them.
    #[error("I/O error while {op}")]
    Io {
        /// The failing operation.
        op: IoOp,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// A read hit the end of the medium before the buffer could be filled.
    #[error("unexpected end of medium while reading LBA {lba}")]
    Truncated {
        /// First sector of the request.
        lba: u64,
    },
    /// A request does not fit inside the medium.
    #[error("{sectors} sector(s) at LBA {lba} lie outside of the medium")]
    OutOfBounds {
        /// First sector of the request.
        lba: u64,
        /// Length of the request in sectors.
        sectors: u64,
    },
    /// A write has been attempted on a device opened read-only.
    #[error("the device is opened read-only")]
    ReadOnly,
    /// A buffer whose length is not a positive multiple of the sector size.
    #[error("buffer of {0} bytes is not a whole number of sectors")]
    BufferSize(usize),
    /// The protective MBR is missing or malformed.
    #[error("no GUID partition table found (missing or invalid protective MBR)")]
    NotAGpt,
    /// The disk carries a hybrid MBR, which a rewrite would destroy.
    #[error("the disk has a hybrid MBR, refusing to overwrite it")]
    HybridMbr,
    /// Every partition entry is already in use.
    #[error("no unused partition entry left")]
    NoFreeSlot,
    /// No free segment is large enough for the request.
    #[error("no free space left")]
    NoFreeSpace,
    /// A request that makes no sense, regardless of the disk's contents.
    #[error("invalid request: {0}")]
    BadSpec(&'static str),
    /// The partition does not exist.
    #[error("partition {0} is not in use")]
    NotPresent(u32),
    /// The partition entry is already in use.
    #[error("partition {0} is already in use")]
    AlreadyPresent(u32),
    /// The partition number is 0 or beyond the number of entries.
    #[error("invalid partition number: {0}")]
    InvalidPartitionNumber(u32),
    /// A string that is not a GUID.
    #[error("invalid GUID: {0:?}")]
    InvalidGuid(String),
    /// The medium cannot hold the requested layout.
    #[error("the device is too small ({sectors} sectors)")]
    DeviceTooSmall {
        /// Size of the medium in sectors.
        sectors: u64,
    },
    /// A previous write failed half-way; the label must be reopened.
    #[error("the label is unusable after a failed write, reopen the device")]
    Poisoned,
    /// A single validation fault raised by a mutation.
    #[error(transparent)]
    Invalid(#[from] Fault),
    /// The label failed verification and has not been written.
    #[error("the label failed verification: {0}")]
    Rejected(Report),
    /// Neither the primary nor the backup copy of the table could be used.
    #[error("could not read primary header ({primary}) nor backup header ({backup})")]
    Unrecoverable {
        /// Why the primary copy was rejected.
        primary: Fault,
        /// Why the backup copy was rejected.
        backup: Fault,
    },
    /// A write failed part way through the persistence sequence.
    #[error("write failed at step {step}")]
    PartialWrite {
        /// The step that failed. Every previous step reached the device.
        step: WriteStep,
        /// The device error.
        #[source]
        source: Box<Error>,
    },
    /// Every step has been written but the final flush failed.
    #[error("could not flush the device")]
    FlushFailed(#[source] Box<Error>),
}

impl Error {
    pub(crate) fn io(op: IoOp, source: io::Error) -> Error {
        Error::Io { op, source }
    }

    /// Process exit status for this error: 1 for validation and request errors, 2 for I/O
    /// errors and 3 when a hybrid MBR blocked a write.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Io { .. }
            | Error::Truncated { .. }
            | Error::OutOfBounds { .. }
            | Error::ReadOnly
            | Error::BufferSize(_)
            | Error::Deserialize(_)
            | Error::Poisoned
            | Error::PartialWrite { .. }
            | Error::FlushFailed(_) => 2,
            Error::HybridMbr => 3,
            _ => 1,
        }
    }
}

/// The result of a GPT operation.
pub type Result<T> = std::result::Result<T, Error>;
