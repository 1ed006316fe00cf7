use log::info;
use pic14_arch::{bytes_to_word, word_to_bytes};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Error;
use crate::hex;

/// Sparse byte-addressed view of device program memory.
///
/// Unmapped addresses are unprogrammed. Word `w` lives in the byte pair
/// `2w` (low) and `2w + 1` (high).
#[derive(Debug, Clone, Default)]
pub struct MemoryImage {
    bytes: BTreeMap<u32, u8>,
    segments: Vec<u16>,
}

impl MemoryImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: u32) -> Option<u8> {
        self.bytes.get(&address).copied()
    }

    pub fn set(&mut self, address: u32, value: u8) {
        self.bytes.insert(address, value);
    }

    /// Word at `index`, present only when both of its bytes are programmed.
    pub fn word(&self, index: u32) -> Option<u16> {
        let (low, high) = self.word_bytes(index);
        Some(bytes_to_word(low?, high?))
    }

    pub fn word_bytes(&self, index: u32) -> (Option<u8>, Option<u8>) {
        (self.get(index * 2), self.get(index * 2 + 1))
    }

    pub fn set_word(&mut self, index: u32, word: u16) {
        let (low, high) = word_to_bytes(word);
        self.set(index * 2, low);
        self.set(index * 2 + 1, high);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.bytes.iter().map(|(&a, &b)| (a, b))
    }

    /// Extended linear address records seen while parsing, in file order.
    pub fn segments(&self) -> &[u16] {
        &self.segments
    }

    pub(crate) fn push_segment(&mut self, segment: u16) {
        self.segments.push(segment);
    }

    /// Maximal runs of consecutive mapped addresses, ascending.
    pub fn runs(&self) -> Vec<(u32, Vec<u8>)> {
        let mut runs: Vec<(u32, Vec<u8>)> = Vec::new();
        for (address, value) in self.iter() {
            if let Some((start, bytes)) = runs.last_mut() {
                if *start as u64 + bytes.len() as u64 == address as u64 {
                    bytes.push(value);
                    continue;
                }
            }
            runs.push((address, vec![value]));
        }
        runs
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let image = hex::parse_bytes(&data)?;
        info!("Loaded {} bytes from {}", image.len(), path.display());
        Ok(image)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        std::fs::write(path, hex::serialize(self)).map_err(|e| Error::io(path, e))?;
        info!("Saved {} bytes to {}", self.len(), path.display());
        Ok(())
    }
}

/// Images are equal when they map the same addresses to the same bytes;
/// how the source file was segmented does not matter.
impl PartialEq for MemoryImage {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for MemoryImage {}

impl FromIterator<(u32, u8)> for MemoryImage {
    fn from_iter<I: IntoIterator<Item = (u32, u8)>>(iter: I) -> Self {
        Self {
            bytes: iter.into_iter().collect(),
            segments: Vec::new(),
        }
    }
}
