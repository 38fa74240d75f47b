use crate::display_bytes::DisplayBytes;
use crate::opt::Column;
use crate::table::Table;
use gptlabel::{attributes, parttype, BlockDevice, Label};
use std::path::Path;

pub fn print<D: BlockDevice>(path: &Path, columns: &[Column], label: &Label<D>) {
    let ss = label.sector_size();
    let header = label.primary();
    let usable = (header.last_usable_lba + 1).saturating_sub(header.first_usable_lba);
    let len = label.total_sectors() * ss;

    println!("Sector size: {} bytes", ss);
    println!(
        "Partition alignment: {} ({} bytes)",
        label.alignment(),
        label.alignment() * ss
    );
    println!("Disk size: {} ({} bytes)", DisplayBytes::new(len), len);
    println!(
        "Usable sectors: {}-{} ({} sectors)",
        header.first_usable_lba, header.last_usable_lba, usable,
    );
    println!(
        "Free sectors: {}",
        label
            .free_segments()
            .iter()
            .map(|x| format!(
                "{}-{} ({})",
                x.start,
                x.end,
                DisplayBytes::new(x.len() * ss)
            ))
            .collect::<Vec<_>>()
            .join(", "),
    );
    println!(
        "Usable space: {} ({} bytes)",
        DisplayBytes::new(usable * ss),
        usable * ss,
    );
    println!("Disk identifier: {}", header.disk_guid);
    println!();

    for fault in label.report().faults() {
        println!("WARNING: {}", fault);
    }
    let misaligned = label
        .list()
        .iter()
        .filter(|(_, x)| x.first_lba % label.alignment() != 0)
        .map(|(i, _)| format!("{}", i))
        .collect::<Vec<_>>();
    if !misaligned.is_empty() {
        println!(
            "WARNING: some partitions are not aligned: {}",
            misaligned.join(", ")
        );
    }
    if !label.report().is_clean() || !misaligned.is_empty() {
        println!();
    }

    let mut table = Table::new();
    for column in columns {
        match column {
            Column::Device => table.column("Device"),
            Column::Start => table.column_rtl("Start"),
            Column::End => table.column_rtl("End"),
            Column::Sectors => table.column_rtl("Sectors"),
            Column::Size => table.column_rtl("Size"),
            Column::Type => table.column("Type"),
            Column::GUID => table.column("GUID"),
            Column::Attributes => table.column("Attributes"),
            Column::Name => table.column("Name"),
        }
    }
    for (i, p) in label.list() {
        let sectors = p.size().unwrap_or(0);
        table.row(
            columns
                .iter()
                .map(|column| match column {
                    Column::Device => format!("{}{}", path.display(), i),
                    Column::Start => format!("{}", p.first_lba),
                    Column::End => format!("{}", p.last_lba),
                    Column::Sectors => format!("{}", sectors),
                    Column::Size => format!("{}", DisplayBytes::new(sectors * ss)),
                    Column::Type => parttype::name_of(&p.type_guid)
                        .map(str::to_string)
                        .unwrap_or_else(|| p.type_guid.to_string()),
                    Column::GUID => p.unique_guid.to_string(),
                    Column::Attributes => attributes::describe(p.attributes, &p.type_guid),
                    Column::Name => p.name.to_string(),
                })
                .collect(),
        );
    }
    print!("{}", table);
}
