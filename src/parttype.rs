//! Well-known partition type GUIDs.
//!
//! ```
//! use gptlabel::parttype;
//!
//! let linux = parttype::lookup("linux").unwrap();
//! assert_eq!(linux.guid, parttype::LINUX_FILESYSTEM);
//! assert_eq!(parttype::name_of(&linux.guid), Some("Linux filesystem"));
//! assert_eq!(
//!     parttype::lookup("c12a7328-f81f-11d2-ba4b-00a0c93ec93b").unwrap().name,
//!     "EFI System"
//! );
//! ```

use crate::guid::Guid;

/// EFI System.
pub const EFI_SYSTEM: Guid = Guid::from_fields(
    0xC12A7328,
    0xF81F,
    0x11D2,
    [0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E, 0xC9, 0x3B],
);

/// BIOS boot partition.
pub const BIOS_BOOT: Guid = Guid::from_fields(
    0x21686148,
    0x6449,
    0x6E6F,
    [0x74, 0x4E, 0x65, 0x65, 0x64, 0x45, 0x46, 0x49],
);

/// Microsoft basic data.
pub const BASIC_DATA: Guid = Guid::from_fields(
    0xEBD0A0A2,
    0xB9E5,
    0x4433,
    [0x87, 0xC0, 0x68, 0xB6, 0xB7, 0x26, 0x99, 0xC7],
);

/// Linux filesystem.
pub const LINUX_FILESYSTEM: Guid = Guid::from_fields(
    0x0FC63DAF,
    0x8483,
    0x4772,
    [0x8E, 0x79, 0x3D, 0x69, 0xD8, 0x47, 0x7D, 0xE4],
);

/// Linux swap.
pub const LINUX_SWAP: Guid = Guid::from_fields(
    0x0657FD6D,
    0xA4AB,
    0x43C4,
    [0x84, 0xE5, 0x09, 0x33, 0xC8, 0x4B, 0x4F, 0x4F],
);

/// Linux LVM.
pub const LINUX_LVM: Guid = Guid::from_fields(
    0xE6D6D379,
    0xF507,
    0x44C2,
    [0xA2, 0x3C, 0x23, 0x8F, 0x2A, 0x3D, 0xF9, 0x28],
);

/// Linux RAID.
pub const LINUX_RAID: Guid = Guid::from_fields(
    0xA19D880F,
    0x05FC,
    0x4D3B,
    [0xA0, 0x06, 0x74, 0x3F, 0x0F, 0x84, 0x91, 0x1E],
);

/// A known partition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartType {
    /// The type GUID.
    pub guid: Guid,
    /// Human readable name.
    pub name: &'static str,
    /// Operating system family.
    pub os: &'static str,
    /// Short name accepted by [`lookup`].
    pub alias: Option<&'static str>,
}

/// Every known partition type, grouped by operating system.
pub static KNOWN: &[PartType] = &[
    PartType {
        guid: EFI_SYSTEM,
        name: "EFI System",
        os: "Generic",
        alias: Some("uefi"),
    },
    PartType {
        guid: Guid::from_fields(
            0x024DEE41,
            0x33E7,
            0x11D3,
            [0x9D, 0x69, 0x00, 0x08, 0xC7, 0x81, 0xF3, 0x9F],
        ),
        name: "MBR partition scheme",
        os: "Generic",
        alias: None,
    },
    PartType {
        guid: BIOS_BOOT,
        name: "BIOS boot partition",
        os: "Generic",
        alias: Some("bios"),
    },
    PartType {
        guid: Guid::from_fields(
            0xE3C9E316,
            0x0B5C,
            0x4DB8,
            [0x81, 0x7D, 0xF9, 0x2D, 0xF0, 0x02, 0x15, 0xAE],
        ),
        name: "Microsoft reserved",
        os: "Windows",
        alias: Some("msr"),
    },
    PartType {
        guid: BASIC_DATA,
        name: "Microsoft basic data",
        os: "Windows",
        alias: Some("basic"),
    },
    PartType {
        guid: Guid::from_fields(
            0x5808C8AA,
            0x7E8F,
            0x42E0,
            [0x85, 0xD2, 0xE1, 0xE9, 0x04, 0x34, 0xCF, 0xB3],
        ),
        name: "Microsoft LDM metadata",
        os: "Windows",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0xAF9B60A0,
            0x1431,
            0x4F62,
            [0xBC, 0x68, 0x33, 0x11, 0x71, 0x4A, 0x69, 0xAD],
        ),
        name: "Microsoft LDM data",
        os: "Windows",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0xDE94BBA4,
            0x06D1,
            0x4D40,
            [0xA1, 0x6A, 0xBF, 0xD5, 0x01, 0x79, 0xD6, 0xAC],
        ),
        name: "Windows recovery environment",
        os: "Windows",
        alias: Some("winre"),
    },
    PartType {
        guid: Guid::from_fields(
            0x37AFFC90,
            0xEF7D,
            0x4E96,
            [0x91, 0xC3, 0x2D, 0x7A, 0xE0, 0x55, 0xB1, 0x74],
        ),
        name: "IBM General Parallel Fs",
        os: "Windows",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x75894C1E,
            0x3AEB,
            0x11D3,
            [0xB7, 0xC1, 0x7B, 0x03, 0xA0, 0x00, 0x00, 0x00],
        ),
        name: "HP-UX data partition",
        os: "HP-UX",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0xE2A1E728,
            0x32E3,
            0x11D6,
            [0xA6, 0x82, 0x7B, 0x03, 0xA0, 0x00, 0x00, 0x00],
        ),
        name: "HP-UX service partition",
        os: "HP-UX",
        alias: None,
    },
    PartType {
        guid: LINUX_FILESYSTEM,
        name: "Linux filesystem",
        os: "Linux",
        alias: Some("linux"),
    },
    PartType {
        guid: LINUX_RAID,
        name: "Linux RAID",
        os: "Linux",
        alias: Some("raid"),
    },
    PartType {
        guid: LINUX_SWAP,
        name: "Linux swap",
        os: "Linux",
        alias: Some("swap"),
    },
    PartType {
        guid: LINUX_LVM,
        name: "Linux LVM",
        os: "Linux",
        alias: Some("lvm"),
    },
    PartType {
        guid: Guid::from_fields(
            0x8DA63339,
            0x0007,
            0x60C0,
            [0xC4, 0x36, 0x08, 0x3A, 0xC8, 0x23, 0x09, 0x08],
        ),
        name: "Linux reserved",
        os: "Linux",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x516E7CB4,
            0x6ECF,
            0x11D6,
            [0x8F, 0xF8, 0x00, 0x02, 0x2D, 0x09, 0x71, 0x2B],
        ),
        name: "FreeBSD data",
        os: "FreeBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x83BD6B9D,
            0x7F41,
            0x11DC,
            [0xBE, 0x0B, 0x00, 0x15, 0x60, 0xB8, 0x4F, 0x0F],
        ),
        name: "FreeBSD boot",
        os: "FreeBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x516E7CB5,
            0x6ECF,
            0x11D6,
            [0x8F, 0xF8, 0x00, 0x02, 0x2D, 0x09, 0x71, 0x2B],
        ),
        name: "FreeBSD swap",
        os: "FreeBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x516E7CB6,
            0x6ECF,
            0x11D6,
            [0x8F, 0xF8, 0x00, 0x02, 0x2D, 0x09, 0x71, 0x2B],
        ),
        name: "FreeBSD UFS",
        os: "FreeBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x516E7CBA,
            0x6ECF,
            0x11D6,
            [0x8F, 0xF8, 0x00, 0x02, 0x2D, 0x09, 0x71, 0x2B],
        ),
        name: "FreeBSD ZFS",
        os: "FreeBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x516E7CB8,
            0x6ECF,
            0x11D6,
            [0x8F, 0xF8, 0x00, 0x02, 0x2D, 0x09, 0x71, 0x2B],
        ),
        name: "FreeBSD Vinum",
        os: "FreeBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x48465300,
            0x0000,
            0x11AA,
            [0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC],
        ),
        name: "Apple HFS/HFS+",
        os: "macOS",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x55465300,
            0x0000,
            0x11AA,
            [0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC],
        ),
        name: "Apple UFS",
        os: "macOS",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x52414944,
            0x0000,
            0x11AA,
            [0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC],
        ),
        name: "Apple RAID",
        os: "macOS",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x52414944,
            0x5F4F,
            0x11AA,
            [0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC],
        ),
        name: "Apple RAID offline",
        os: "macOS",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x426F6F74,
            0x0000,
            0x11AA,
            [0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC],
        ),
        name: "Apple boot",
        os: "macOS",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x4C616265,
            0x6C00,
            0x11AA,
            [0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC],
        ),
        name: "Apple label",
        os: "macOS",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x5265636F,
            0x7665,
            0x11AA,
            [0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC],
        ),
        name: "Apple TV recovery",
        os: "macOS",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x53746F72,
            0x6167,
            0x11AA,
            [0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC],
        ),
        name: "Apple Core storage",
        os: "macOS",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x6A82CB45,
            0x1DD2,
            0x11B2,
            [0x99, 0xA6, 0x08, 0x00, 0x20, 0x73, 0x66, 0x31],
        ),
        name: "Solaris boot",
        os: "Solaris",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x6A85CF4D,
            0x1DD2,
            0x11B2,
            [0x99, 0xA6, 0x08, 0x00, 0x20, 0x73, 0x66, 0x31],
        ),
        name: "Solaris root",
        os: "Solaris",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x6A898CC3,
            0x1DD2,
            0x11B2,
            [0x99, 0xA6, 0x08, 0x00, 0x20, 0x73, 0x66, 0x31],
        ),
        name: "Solaris /usr & Apple ZFS",
        os: "Solaris",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x6A87C46F,
            0x1DD2,
            0x11B2,
            [0x99, 0xA6, 0x08, 0x00, 0x20, 0x73, 0x66, 0x31],
        ),
        name: "Solaris swap",
        os: "Solaris",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x6A8B642B,
            0x1DD2,
            0x11B2,
            [0x99, 0xA6, 0x08, 0x00, 0x20, 0x73, 0x66, 0x31],
        ),
        name: "Solaris backup",
        os: "Solaris",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x6A8EF2E9,
            0x1DD2,
            0x11B2,
            [0x99, 0xA6, 0x08, 0x00, 0x20, 0x73, 0x66, 0x31],
        ),
        name: "Solaris /var",
        os: "Solaris",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x6A90BA39,
            0x1DD2,
            0x11B2,
            [0x99, 0xA6, 0x08, 0x00, 0x20, 0x73, 0x66, 0x31],
        ),
        name: "Solaris /home",
        os: "Solaris",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x6A9283A5,
            0x1DD2,
            0x11B2,
            [0x99, 0xA6, 0x08, 0x00, 0x20, 0x73, 0x66, 0x31],
        ),
        name: "Solaris alternate sector",
        os: "Solaris",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x6A945A3B,
            0x1DD2,
            0x11B2,
            [0x99, 0xA6, 0x08, 0x00, 0x20, 0x73, 0x66, 0x31],
        ),
        name: "Solaris reserved 1",
        os: "Solaris",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x6A9630D1,
            0x1DD2,
            0x11B2,
            [0x99, 0xA6, 0x08, 0x00, 0x20, 0x73, 0x66, 0x31],
        ),
        name: "Solaris reserved 2",
        os: "Solaris",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x6A980767,
            0x1DD2,
            0x11B2,
            [0x99, 0xA6, 0x08, 0x00, 0x20, 0x73, 0x66, 0x31],
        ),
        name: "Solaris reserved 3",
        os: "Solaris",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x6A96237F,
            0x1DD2,
            0x11B2,
            [0x99, 0xA6, 0x08, 0x00, 0x20, 0x73, 0x66, 0x31],
        ),
        name: "Solaris reserved 4",
        os: "Solaris",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x6A8D2AC7,
            0x1DD2,
            0x11B2,
            [0x99, 0xA6, 0x08, 0x00, 0x20, 0x73, 0x66, 0x31],
        ),
        name: "Solaris reserved 5",
        os: "Solaris",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x49F48D32,
            0xB10E,
            0x11DC,
            [0xB9, 0x9B, 0x00, 0x19, 0xD1, 0x87, 0x96, 0x48],
        ),
        name: "NetBSD swap",
        os: "NetBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x49F48D5A,
            0xB10E,
            0x11DC,
            [0xB9, 0x9B, 0x00, 0x19, 0xD1, 0x87, 0x96, 0x48],
        ),
        name: "NetBSD FFS",
        os: "NetBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x49F48D82,
            0xB10E,
            0x11DC,
            [0xB9, 0x9B, 0x00, 0x19, 0xD1, 0x87, 0x96, 0x48],
        ),
        name: "NetBSD LFS",
        os: "NetBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x2DB519C4,
            0xB10E,
            0x11DC,
            [0xB9, 0x9B, 0x00, 0x19, 0xD1, 0x87, 0x96, 0x48],
        ),
        name: "NetBSD concatenated",
        os: "NetBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x2DB519EC,
            0xB10E,
            0x11DC,
            [0xB9, 0x9B, 0x00, 0x19, 0xD1, 0x87, 0x96, 0x48],
        ),
        name: "NetBSD encrypted",
        os: "NetBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x49F48DAA,
            0xB10E,
            0x11DC,
            [0xB9, 0x9B, 0x00, 0x19, 0xD1, 0x87, 0x96, 0x48],
        ),
        name: "NetBSD RAID",
        os: "NetBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0xFE3A2A5D,
            0x4F32,
            0x41A7,
            [0xB7, 0x25, 0xAC, 0xCC, 0x32, 0x85, 0xA3, 0x09],
        ),
        name: "ChromeOS kernel",
        os: "ChromeOS",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x3CB8E202,
            0x3B7E,
            0x47DD,
            [0x8A, 0x3C, 0x7F, 0xF2, 0xA1, 0x3C, 0xFC, 0xEC],
        ),
        name: "ChromeOS root fs",
        os: "ChromeOS",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x2E0A753D,
            0x9E48,
            0x43B0,
            [0x83, 0x37, 0xB1, 0x51, 0x92, 0xCB, 0x1B, 0x5E],
        ),
        name: "ChromeOS reserved",
        os: "ChromeOS",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x85D5E45A,
            0x237C,
            0x11E1,
            [0xB4, 0xB3, 0xE8, 0x9A, 0x8F, 0x7F, 0xC3, 0xA7],
        ),
        name: "MidnightBSD data",
        os: "MidnightBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x85D5E45E,
            0x237C,
            0x11E1,
            [0xB4, 0xB3, 0xE8, 0x9A, 0x8F, 0x7F, 0xC3, 0xA7],
        ),
        name: "MidnightBSD boot",
        os: "MidnightBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x85D5E45B,
            0x237C,
            0x11E1,
            [0xB4, 0xB3, 0xE8, 0x9A, 0x8F, 0x7F, 0xC3, 0xA7],
        ),
        name: "MidnightBSD swap",
        os: "MidnightBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x0394EF8B,
            0x237C,
            0x11E1,
            [0xB4, 0xB3, 0xE8, 0x9A, 0x8F, 0x7F, 0xC3, 0xA7],
        ),
        name: "MidnightBSD UFS",
        os: "MidnightBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x85D5E45D,
            0x237C,
            0x11E1,
            [0xB4, 0xB3, 0xE8, 0x9A, 0x8F, 0x7F, 0xC3, 0xA7],
        ),
        name: "MidnightBSD ZFS",
        os: "MidnightBSD",
        alias: None,
    },
    PartType {
        guid: Guid::from_fields(
            0x85D5E45C,
            0x237C,
            0x11E1,
            [0xB4, 0xB3, 0xE8, 0x9A, 0x8F, 0x7F, 0xC3, 0xA7],
        ),
        name: "MidnightBSD Vinum",
        os: "MidnightBSD",
        alias: None,
    },
];

/// Find a partition type by alias, by GUID or by name. Names and aliases are matched without
/// regard to case.
pub fn lookup(value: &str) -> Option<&'static PartType> {
    if let Ok(guid) = value.parse::<Guid>() {
        return KNOWN.iter().find(|x| x.guid == guid);
    }

    KNOWN.iter().find(|x| {
        x.alias.map_or(false, |alias| alias.eq_ignore_ascii_case(value))
            || x.name.eq_ignore_ascii_case(value)
    })
}

/// Name of the partition type `guid`, if known.
pub fn name_of(guid: &Guid) -> Option<&'static str> {
    KNOWN.iter().find(|x| x.guid == *guid).map(|x| x.name)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn guids_and_aliases_are_unique() {
        let guids: HashSet<Guid> = KNOWN.iter().map(|x| x.guid).collect();
        assert_eq!(guids.len(), KNOWN.len());

        let aliases: Vec<&str> = KNOWN.iter().filter_map(|x| x.alias).collect();
        let unique: HashSet<&&str> = aliases.iter().collect();
        assert_eq!(unique.len(), aliases.len());
    }

    #[test]
    fn constants_match_their_text_form() {
        assert_eq!(
            LINUX_FILESYSTEM.to_string(),
            "0FC63DAF-8483-4772-8E79-3D69D8477DE4"
        );
        assert_eq!(EFI_SYSTEM.to_string(), "C12A7328-F81F-11D2-BA4B-00A0C93EC93B");
        assert_eq!(BASIC_DATA.to_string(), "EBD0A0A2-B9E5-4433-87C0-68B6B72699C7");
        assert_eq!(LINUX_SWAP.to_string(), "0657FD6D-A4AB-43C4-84E5-0933C84B4F4F");
    }

    #[test]
    fn lookup_by_alias_name_or_guid() {
        assert_eq!(lookup("SWAP").unwrap().guid, LINUX_SWAP);
        assert_eq!(lookup("linux lvm").unwrap().guid, LINUX_LVM);
        assert_eq!(lookup("21686148-6449-6E6F-744E-656564454649").unwrap().guid, BIOS_BOOT);
        assert_eq!(name_of(&Guid::from_bytes([1; 16])), None);
        assert!(lookup("nope").is_none());
        assert!(lookup("00000000-0000-0000-0000-000000000001").is_none());
    }
}
