use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[allow(clippy::upper_case_acronyms)]
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "verbatim")]
pub enum Column {
    Device,
    Start,
    End,
    Sectors,
    Size,
    Type,
    GUID,
    Attributes,
    Name,
}

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Opt {
    /// device or disk image to open
    #[arg(value_name = "DEVICE")]
    pub device: PathBuf,

    /// sector size (detected on block devices, 512 otherwise)
    #[arg(short = 'b', long = "sector-size")]
    pub sector_size: Option<u64>,

    /// partition alignment in sectors
    #[arg(short = 'a', long = "align")]
    pub align: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// display the partition table
    List {
        /// output columns
        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            value_delimiter = ',',
            default_value = "Device,Start,End,Sectors,Size,Type,GUID,Attributes,Name"
        )]
        columns: Vec<Column>,
    },

    /// check the protective MBR and both copies of the partition table
    Verify {
        /// accept a copy whose partition entry array does not match its CRC
        #[arg(long)]
        recovery: bool,
    },

    /// write a new, empty partition table
    Create {
        /// number of partition entries
        #[arg(long, default_value_t = 128)]
        entries: u32,

        /// first usable LBA
        #[arg(long)]
        first_lba: Option<u64>,

        /// disk GUID (random by default)
        #[arg(long)]
        disk_guid: Option<String>,
    },

    /// add a partition
    Add {
        /// partition number (first free slot by default)
        #[arg(short = 'n', long)]
        partno: Option<u32>,

        /// partition type: alias, name or GUID
        #[arg(short = 't', long = "type", default_value = "linux")]
        type_guid: String,

        /// first sector
        #[arg(long)]
        start: Option<u64>,

        /// last sector, requires --start
        #[arg(long, requires = "start", conflicts_with = "sectors")]
        end: Option<u64>,

        /// size in sectors (the largest free segment by default)
        #[arg(short = 's', long)]
        sectors: Option<u64>,

        /// partition name
        #[arg(long)]
        name: Option<String>,

        /// attribute bits, e.g. 0,2,60
        #[arg(long)]
        attrs: Option<String>,
    },

    /// delete a partition
    Delete { partno: u32 },

    /// change the type of a partition
    Type {
        partno: u32,
        /// alias, name or GUID
        type_guid: String,
    },

    /// change the name of a partition
    Name { partno: u32, name: String },

    /// replace the attribute bits of a partition
    Attrs {
        partno: u32,
        /// bit numbers, e.g. 0,2,60 (empty to clear)
        bits: String,
    },

    /// sort partitions by first sector
    Reorder,

    /// move the backup partition table to the end of the disk
    Relocate,

    /// change the disk GUID
    DiskGuid {
        /// new GUID (random by default)
        guid: Option<String>,
    },
}
