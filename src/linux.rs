use crate::topology::Topology;
use log::debug;
use std::fs;
use std::io;
use std::os::linux::fs::MetadataExt;
use std::os::raw::{c_int, c_uint};
use std::os::unix::io::AsRawFd;
use thiserror::Error;

mod ioctl {
    use nix::{ioctl_none, ioctl_read_bad};
    use std::os::raw::{c_int, c_uint};

    ioctl_read_bad!(blksszget, 0x1268, c_int);
    ioctl_read_bad!(blkpbszget, 0x127B, c_uint);
    ioctl_read_bad!(blkiomin, 0x1278, c_uint);
    ioctl_read_bad!(blkioopt, 0x1279, c_uint);
    ioctl_none!(blkrrpart, 0x12, 95);
}

const S_IFMT: u32 = 0o170_000;
const S_IFBLK: u32 = 0o60_000;

/// An error that can happen while doing an ioctl call with a block device
#[derive(Debug, Error)]
pub enum BlockError {
    /// An error that occurs when the metadata of the input file couldn't be retrieved
    #[error("failed to get metadata of device fd")]
    Metadata(#[from] io::Error),
    /// An error that occurs when the partition table could not be reloaded by the OS
    #[error("failed to reload partition table of device")]
    RereadTable(#[source] nix::Error),
    /// An error that occurs when the sector size could not be retrieved from the OS
    #[error("failed to get the sector size of device: {0}")]
    GetSectorSize(nix::Error),
    /// An error that occurs when the I/O topology could not be retrieved from the OS
    #[error("failed to get the I/O topology of device: {0}")]
    GetTopology(nix::Error),
    /// An error that occurs when an invalid return code has been received from an ioctl call
    #[error("invalid return value of ioctl ({0} != 0)")]
    InvalidReturnValue(i32),
    /// An error that occurs when the file provided is not a block device
    #[error("not a block device")]
    NotBlock,
}

fn check(result: nix::Result<c_int>, wrap: fn(nix::Error) -> BlockError) -> Result<(), BlockError> {
    match result {
        Err(err) => Err(wrap(err)),
        Ok(0) => Ok(()),
        Ok(r) => Err(BlockError::InvalidReturnValue(r)),
    }
}

/// Returns `true` if the file is a block device node.
pub fn is_block_device(file: &fs::File) -> Result<bool, BlockError> {
    let metadata = file.metadata().map_err(BlockError::Metadata)?;

    Ok(metadata.st_mode() & S_IFMT == S_IFBLK)
}

/// Makes an ioctl call to make the OS reread the partition table of a block device
pub fn reread_partition_table(file: &fs::File) -> Result<(), BlockError> {
    if !is_block_device(file)? {
        return Err(BlockError::NotBlock);
    }

    check(
        unsafe { ioctl::blkrrpart(file.as_raw_fd()) },
        BlockError::RereadTable,
    )
}

/// Makes an ioctl call to obtain the sector size of a block device
pub fn get_sector_size(file: &fs::File) -> Result<u64, BlockError> {
    if !is_block_device(file)? {
        return Err(BlockError::NotBlock);
    }

    let mut sector_size: c_int = 512;
    check(
        unsafe { ioctl::blksszget(file.as_raw_fd(), &mut sector_size) },
        BlockError::GetSectorSize,
    )?;

    Ok(sector_size as u64)
}

/// Queries the I/O topology of a block device. Regular files have none.
pub fn get_topology(file: &fs::File) -> Result<Option<Topology>, BlockError> {
    if !is_block_device(file)? {
        return Ok(None);
    }

    let logical = get_sector_size(file)?;
    let fd = file.as_raw_fd();
    let (mut physical, mut minimum, mut optimal): (c_uint, c_uint, c_uint) = (0, 0, 0);

    check(
        unsafe { ioctl::blkpbszget(fd, &mut physical) },
        BlockError::GetTopology,
    )?;
    check(
        unsafe { ioctl::blkiomin(fd, &mut minimum) },
        BlockError::GetTopology,
    )?;
    check(
        unsafe { ioctl::blkioopt(fd, &mut optimal) },
        BlockError::GetTopology,
    )?;
    debug!(
        "topology: logical {} physical {} minimum I/O {} optimal I/O {}",
        logical, physical, minimum, optimal
    );

    Ok(Some(Topology::from_device(
        logical,
        Some(physical as u64),
        Some(minimum as u64),
        Some(optimal as u64),
    )))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn regular_files_are_not_block_devices() {
        let file = fs::File::open("Cargo.toml").unwrap();

        assert!(!is_block_device(&file).unwrap());
        assert!(get_topology(&file).unwrap().is_none());
        assert!(matches!(get_sector_size(&file), Err(BlockError::NotBlock)));
        assert!(matches!(
            reread_partition_table(&file),
            Err(BlockError::NotBlock)
        ));
    }
}
