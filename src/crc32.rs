//! CRC-32 as used by the GPT header and partition entry array (IEEE 802.3, reflected, init and
//! final xor `0xFFFFFFFF`).

use crc::{Crc, Digest, CRC_32_ISO_HDLC};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute the checksum of a single contiguous buffer.
pub fn checksum(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Start an incremental checksum. Feeding the same bytes in any number of chunks yields the same
/// value as [`checksum`].
pub fn digest() -> Digest<'static, u32> {
    CRC32.digest()
}
