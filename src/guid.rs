//! GUIDs in the mixed-endian layout used on disk by UEFI.
//!
//! The textual form `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX` lists `time_low`, `time_mid`,
//! `time_hi_and_version`, the two clock sequence bytes and the six node bytes. On disk the first
//! three fields are little-endian while the remaining eight bytes are stored as they are written.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 16 bytes identifier, stored exactly as it appears on disk.
///
/// # Examples
///
/// ```
/// use gptlabel::Guid;
///
/// let guid: Guid = "0FC63DAF-8483-4772-8E79-3D69D8477DE4".parse().unwrap();
///
/// assert_eq!(guid.as_bytes()[..4], [0xAF, 0x3D, 0xC6, 0x0F]);
/// assert_eq!(guid.to_string(), "0FC63DAF-8483-4772-8E79-3D69D8477DE4");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Guid([u8; 16]);

impl Guid {
    /// The all-zero GUID. A partition entry with this type GUID is unused.
    pub const ZERO: Guid = Guid([0; 16]);

    /// Build a GUID from its textual fields.
    pub const fn from_fields(time_low: u32, time_mid: u16, time_hi: u16, rest: [u8; 8]) -> Guid {
        let a = time_low.to_le_bytes();
        let b = time_mid.to_le_bytes();
        let c = time_hi.to_le_bytes();

        Guid([
            a[0], a[1], a[2], a[3], b[0], b[1], c[0], c[1], rest[0], rest[1], rest[2], rest[3],
            rest[4], rest[5], rest[6], rest[7],
        ])
    }

    /// Wrap 16 bytes taken verbatim from disk.
    pub const fn from_bytes(bytes: [u8; 16]) -> Guid {
        Guid(bytes)
    }

    /// The on-disk bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Generate a random (version 4) GUID.
    pub fn generate() -> Guid {
        let mut bytes: [u8; 16] = rand::random();
        // version lives in the high nibble of time_hi_and_version, stored little-endian
        bytes[7] = (bytes[7] & 0x0f) | 0x40;
        // RFC 4122 variant
        bytes[8] = (bytes[8] & 0x3f) | 0x80;

        Guid(bytes)
    }

    /// Returns `true` for the all-zero GUID.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 16]
    }

    fn time_low(&self) -> u32 {
        u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    fn time_mid(&self) -> u16 {
        u16::from_le_bytes([self.0[4], self.0[5]])
    }

    fn time_hi(&self) -> u16 {
        u16::from_le_bytes([self.0[6], self.0[7]])
    }
}

impl FromStr for Guid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Guid> {
        let invalid = || Error::InvalidGuid(s.to_string());

        let groups: Vec<&str> = s.split('-').collect();
        if groups.len() != 5
            || groups
                .iter()
                .zip([8, 4, 4, 4, 12].iter())
                .any(|(g, len)| g.len() != *len)
        {
            return Err(invalid());
        }

        let digits: String = groups.concat();
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let mut text = [0u8; 16];
        for (i, byte) in text.iter_mut().enumerate() {
            let pair = digits.get(i * 2..i * 2 + 2).ok_or_else(invalid)?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }

        let mut rest = [0u8; 8];
        rest.copy_from_slice(&text[8..]);

        Ok(Guid::from_fields(
            u32::from_be_bytes([text[0], text[1], text[2], text[3]]),
            u16::from_be_bytes([text[4], text[5]]),
            u16::from_be_bytes([text[6], text[7]]),
            rest,
        ))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-",
            self.time_low(),
            self.time_mid(),
            self.time_hi(),
            self.0[8],
            self.0[9]
        )?;
        for b in &self.0[10..] {
            write!(f, "{:02X}", b)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const EFI_SYSTEM: &str = "C12A7328-F81F-11D2-BA4B-00A0C93EC93B";

    #[test]
    fn parse_swaps_the_first_three_fields() {
        let guid: Guid = EFI_SYSTEM.parse().unwrap();
        assert_eq!(
            guid.as_bytes(),
            &[
                0x28, 0x73, 0x2A, 0xC1, 0x1F, 0xF8, 0xD2, 0x11, 0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E,
                0xC9, 0x3B
            ]
        );
        assert_eq!(guid.to_string(), EFI_SYSTEM);
    }

    #[test]
    fn parse_is_case_insensitive() {
        let upper: Guid = EFI_SYSTEM.parse().unwrap();
        let lower: Guid = EFI_SYSTEM.to_lowercase().parse().unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for s in &[
            "",
            "C12A7328F81F11D2BA4B00A0C93EC93B",
            "C12A7328-F81F-11D2-BA4B-00A0C93EC93",
            "C12A7328-F81F-11D2-BA4B-00A0C93EC93BB",
            "C12A732G-F81F-11D2-BA4B-00A0C93EC93B",
            "C12A7328-F81F-11D2-BA4B00-A0C93EC93B",
            "C12A7328-F81F-11D2-BA4B-00A0C93EC9+B",
        ] {
            assert!(matches!(s.parse::<Guid>(), Err(Error::InvalidGuid(_))), "{:?}", s);
        }
    }

    #[test]
    fn from_fields_matches_parse() {
        let guid = Guid::from_fields(
            0xC12A_7328,
            0xF81F,
            0x11D2,
            [0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E, 0xC9, 0x3B],
        );
        assert_eq!(guid, EFI_SYSTEM.parse().unwrap());
    }

    #[test]
    fn generated_guids_are_version_4() {
        let a = Guid::generate();
        let b = Guid::generate();
        assert_ne!(a, b);
        assert!(!a.is_zero());

        let text = a.to_string();
        assert_eq!(&text[14..15], "4");
        assert!(["8", "9", "A", "B"].contains(&&text[19..20]));
        assert_eq!(text.parse::<Guid>().unwrap(), a);
    }

    #[test]
    fn serializes_as_raw_bytes() {
        let guid: Guid = EFI_SYSTEM.parse().unwrap();
        let data = bincode::serialize(&guid).unwrap();
        assert_eq!(&data[..], &guid.as_bytes()[..]);
    }
}
