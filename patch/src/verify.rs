//! Post-save checks against the file on disk.

use log::{debug, info};
use std::collections::BTreeMap;
use std::path::Path;

use crate::apply::AppliedReport;
use crate::error::Error;
use crate::image::MemoryImage;

/// Reload `path` and compare the bytes at `probe..probe + expected.len()`.
pub fn verify(path: impl AsRef<Path>, probe: u32, expected: &[u8]) -> Result<bool, Error> {
    let image = MemoryImage::load(path)?;
    Ok(matches_bytes(&image, probe, expected))
}

/// Word-addressed form of [`verify`].
pub fn verify_words(path: impl AsRef<Path>, word: u16, expected: &[u16]) -> Result<bool, Error> {
    let image = MemoryImage::load(path)?;
    Ok(first_mismatch(&image, word as u32, expected).is_none())
}

/// Reload `path` and check that every word written by `report` reads back.
///
/// Blocks are folded in plan order, so where blocks overlap only the last
/// writer is expected at that word.
pub fn verify_report(path: impl AsRef<Path>, report: &AppliedReport) -> Result<(), Error> {
    let image = MemoryImage::load(path)?;
    let mut expected: BTreeMap<u32, (&str, u16)> = BTreeMap::new();
    for (name, block) in &report.blocks {
        for (word, value) in (block.word_start as u32..).zip(&block.words) {
            expected.insert(word, (name.as_str(), *value));
        }
    }
    for (word, (name, value)) in &expected {
        if image.word(*word) != Some(*value) {
            return Err(Error::Verify {
                block: name.to_string(),
                word: *word,
            });
        }
    }
    debug!("Verified {} words", expected.len());
    info!("Verified {} blocks", report.blocks.len());
    Ok(())
}

fn matches_bytes(image: &MemoryImage, probe: u32, expected: &[u8]) -> bool {
    expected
        .iter()
        .zip(probe..)
        .all(|(byte, address)| image.get(address) == Some(*byte))
}

fn first_mismatch(image: &MemoryImage, start: u32, expected: &[u16]) -> Option<u32> {
    expected
        .iter()
        .zip(start..)
        .find(|(word, index)| image.word(*index) != Some(**word))
        .map(|(_, index)| index)
}

/// A word whose value differs between two images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordDiff {
    pub word: u32,
    pub before: Option<u16>,
    pub after: Option<u16>,
}

/// Every word index at which `before` and `after` differ, ascending.
///
/// A word counts as changed if either of its bytes differs. Half-programmed
/// words read as `None`.
pub fn diff_words(before: &MemoryImage, after: &MemoryImage) -> Vec<WordDiff> {
    let mut words: Vec<u32> = before
        .iter()
        .chain(after.iter())
        .map(|(address, _)| address / 2)
        .collect();
    words.sort_unstable();
    words.dedup();

    words
        .into_iter()
        .filter(|w| before.word_bytes(*w) != after.word_bytes(*w))
        .map(|w| WordDiff {
            word: w,
            before: before.word(w),
            after: after.word(w),
        })
        .collect()
}
