//! The CRC32 variant used by _ISO/IEC 13818-1_ sections (polynomial `0x04C11DB7`, initial value
//! `0xFFFFFFFF`, no reflection, no final XOR).

use crc::{Crc, CRC_32_MPEG_2};

const MPEG2: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Computes the CRC of the given bytes.
pub fn compute(data: &[u8]) -> u32 {
    MPEG2.checksum(data)
}

/// Computes the CRC over a buffer whose last four bytes are themselves the big-endian CRC of
/// the preceding bytes.  Since the CRC has no final XOR, the result is `0` when the data is
/// intact.
pub fn sum32(data: &[u8]) -> u32 {
    compute(data)
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn check_value() {
        assert_eq!(compute(b"123456789"), 0x0376_E6E7);
    }

    #[test]
    fn empty() {
        assert_eq!(compute(b""), 0xFFFF_FFFF);
    }

    #[test]
    fn whole_section_sums_to_zero() {
        // a PAT section, including its trailing CRC
        let sect = hex!("00B00D0001C100000001E1E02D507804");
        assert_eq!(sum32(&sect[..]), 0);
        let body = &sect[..sect.len() - 4];
        assert_eq!(compute(body), 0x2D50_7804);
    }
}
