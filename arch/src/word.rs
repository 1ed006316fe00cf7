//! Program memory is word addressed but persisted as little-endian byte pairs.

pub fn word_to_bytes(word: u16) -> (u8, u8) {
    let [low, high] = word.to_le_bytes();
    (low, high)
}

pub fn bytes_to_word(low: u8, high: u8) -> u16 {
    u16::from_le_bytes([low, high])
}

/// Byte address of the low byte of word `index`.
pub fn byte_address(index: u16) -> u32 {
    index as u32 * 2
}
