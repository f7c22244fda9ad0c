//! CRC-32 (IEEE 802.3), the ring's default position hash.

const CRC32_POLYNOMIAL: u32 = 0xEDB8_8320;

const fn crc32_entry(byte: u8) -> u32 {
    let mut crc = byte as u32;
    let mut i = 0;
    while i < 8 {
        crc = if crc & 1 != 0 {
            (crc >> 1) ^ CRC32_POLYNOMIAL
        } else {
            crc >> 1
        };
        i += 1;
    }
    crc
}

const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = crc32_entry(i as u8);
        i += 1;
    }
    table
};

/// CRC-32 checksum with the IEEE polynomial.
pub fn checksum_ieee(data: &[u8]) -> u32 {
    let mut crc = u32::MAX;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(checksum_ieee(b""), 0);
        assert_eq!(checksum_ieee(b"123456789"), 0xCBF4_3926);
        assert_eq!(
            checksum_ieee(b"The quick brown fox jumps over the lazy dog"),
            0x414F_A339
        );
    }
}
