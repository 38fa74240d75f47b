use crate::display_bytes::DisplayBytes;
use crate::error::*;
use crate::opt::{Command, Opt};
use crate::print::print;
use gptlabel::{
    attributes, parttype, AddSpec, BlockDevice, CreateOptions, Disk, Guid, Label, NameFit, OpenMode,
    RangeSpec, Reorder,
};
use log::{debug, info, warn};
use std::fs;

type DiskLabel = Label<Disk<fs::File>>;

pub fn execute(opt: &Opt) -> Result<()> {
    debug!("command: {:?}", opt.command);

    match &opt.command {
        Command::List { columns } => {
            let label = open(opt, OpenMode::Strict, true)?;
            print(&opt.device, columns, &label);
            Ok(())
        }
        Command::Verify { recovery } => verify(opt, *recovery),
        Command::Create {
            entries,
            first_lba,
            disk_guid,
        } => create(opt, *entries, *first_lba, disk_guid.as_deref()),
        Command::Add {
            partno,
            type_guid,
            start,
            end,
            sectors,
            name,
            attrs,
        } => {
            let range = match (*start, *end, *sectors) {
                (Some(first), Some(last), _) => RangeSpec::Explicit { first, last },
                (start, _, Some(sectors)) => RangeSpec::Sized { start, sectors },
                (start, _, None) => RangeSpec::Largest { start },
            };
            let mut spec = AddSpec::new(parse_type(type_guid)?, range);
            spec.index = *partno;
            spec.name = name.clone();
            if let Some(bits) = attrs {
                spec.attributes = parse_bits(bits)?;
            }

            edit(opt, |label| {
                let added = label.add(spec)?;
                let p = &label[added.partno];
                println!(
                    "Partition {} created: sectors {}-{}",
                    added.partno, p.first_lba, p.last_lba
                );
                warn_truncated(added.name_fit);
                Ok(())
            })
        }
        Command::Delete { partno } => edit(opt, |label| Ok(label.delete(*partno)?)),
        Command::Type { partno, type_guid } => {
            let type_guid = parse_type(type_guid)?;
            edit(opt, |label| Ok(label.retype(*partno, type_guid)?))
        }
        Command::Name { partno, name } => edit(opt, |label| {
            warn_truncated(label.set_name(*partno, name)?);
            Ok(())
        }),
        Command::Attrs { partno, bits } => {
            let bits = parse_bits(bits)?;
            edit(opt, |label| Ok(label.set_attrs(*partno, bits)?))
        }
        Command::Reorder => edit(opt, |label| {
            if label.reorder()? == Reorder::Unchanged {
                println!("Partitions are already in order.");
            }
            Ok(())
        }),
        Command::Relocate => edit(opt, |label| {
            if !label.relocate_backup()? {
                println!("The backup partition table is already at the end of the disk.");
            }
            Ok(())
        }),
        Command::DiskGuid { guid } => {
            let guid = match guid {
                Some(x) => x.parse::<Guid>()?,
                None => Guid::generate(),
            };
            edit(opt, |label| {
                label.set_disk_guid(guid)?;
                println!("Disk identifier: {}", guid);
                Ok(())
            })
        }
    }
}

fn open_disk(opt: &Opt, readonly: bool) -> Result<Disk<fs::File>> {
    Ok(Disk::open_with_sector_size(
        &opt.device,
        readonly,
        opt.sector_size,
    )?)
}

fn open(opt: &Opt, mode: OpenMode, readonly: bool) -> Result<DiskLabel> {
    let mut label = Label::open_with(open_disk(opt, readonly)?, mode)?;
    if let Some(align) = opt.align {
        label.set_alignment(align)?;
    }

    Ok(label)
}

/// Apply `change` to the label of the device and write it back.
fn edit<F>(opt: &Opt, change: F) -> Result<()>
where
    F: FnOnce(&mut DiskLabel) -> Result<()>,
{
    let mut label = open(opt, OpenMode::Strict, false)?;
    change(&mut label)?;

    if label.is_dirty() {
        label.write()?;
        reread(&label);
    }

    Ok(())
}

fn verify(opt: &Opt, recovery: bool) -> Result<()> {
    let mode = if recovery {
        OpenMode::Recovery
    } else {
        OpenMode::Strict
    };
    let label = open(opt, mode, true)?;
    let report = label.report();

    for fault in report.faults() {
        if fault.is_critical() {
            println!("ERROR: {}", fault);
        } else {
            println!("WARNING: {}", fault);
        }
    }

    match report.critical().count() {
        0 => {
            if report.is_clean() {
                println!("No errors detected.");
            }
            for line in summary(&label) {
                println!("{}", line);
            }
            Ok(())
        }
        n => Err(Error::Faults(n)),
    }
}

fn summary<D: BlockDevice>(label: &Label<D>) -> Vec<String> {
    let revision = label.primary().revision;
    let stats = label.free_stats();

    vec![
        format!("Header version: {}.{}", revision >> 16, revision & 0xFFFF),
        format!(
            "Using {} out of {} partitions.",
            label.list().len(),
            label.entries().len()
        ),
        format!(
            "A total of {} free sectors is available in {} segment(s) (the largest is {}).",
            stats.total,
            stats.segments,
            DisplayBytes::new(stats.largest * label.sector_size())
        ),
    ]
}

fn create(opt: &Opt, entries: u32, first_lba: Option<u64>, disk_guid: Option<&str>) -> Result<()> {
    let mut options = CreateOptions::default().entry_count(entries);
    if let Some(lba) = first_lba {
        options = options.first_usable_lba(lba);
    }
    if let Some(guid) = disk_guid {
        options = options.disk_guid(guid.parse()?);
    }

    let disk = open_disk(opt, false)?;
    println!(
        "Initializing a new GPT on {} ({} bytes sectors)...",
        opt.device.display(),
        disk.sector_size()
    );

    let label = Label::create(disk, options)?;
    info!(
        "usable sectors: {}-{}",
        label.primary().first_usable_lba,
        label.primary().last_usable_lba
    );
    println!("Disk identifier: {}", label.primary().disk_guid);
    reread(&label);

    Ok(())
}

fn warn_truncated(fit: NameFit) {
    if let NameFit::Truncated { dropped } = fit {
        println!(
            "WARNING: name truncated, {} UTF-16 code unit(s) dropped",
            dropped
        );
    }
}

fn parse_type(value: &str) -> Result<Guid> {
    match parttype::lookup(value) {
        Some(known) => Ok(known.guid),
        None => value
            .parse()
            .map_err(|_| Error::Message(format!("unknown partition type: {}", value))),
    }
}

fn parse_bits(value: &str) -> Result<u64> {
    attributes::parse_bits(value)
        .ok_or_else(|| Error::Message(format!("invalid attribute bits: {:?}", value)))
}

#[cfg(target_os = "linux")]
fn reread(label: &DiskLabel) {
    use gptlabel::linux;

    let file = label.device().get_ref();
    match linux::is_block_device(file) {
        Ok(true) => {
            info!("asking the kernel to re-read the partition table");
            if let Err(err) = linux::reread_partition_table(file) {
                warn!("{}", err);
                println!(
                    "WARNING: the kernel still uses the old partition table: {}",
                    err
                );
            }
        }
        Ok(false) => {}
        Err(err) => warn!("{}", err),
    }
}

#[cfg(not(target_os = "linux"))]
fn reread(_label: &DiskLabel) {}
