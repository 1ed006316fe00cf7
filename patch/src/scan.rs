//! Free program memory search.

use log::debug;
use pic14_arch::{bytes_to_word, DeviceProfile, Encoder, Mnemonic};
use std::ops::Range;

use crate::image::MemoryImage;

/// Lowest word a main-loop branch may target; below it sit the reset and
/// interrupt vectors.
const LOOP_TARGET_FLOOR: u16 = 0x0010;

pub struct FreeSpaceScanner<'a> {
    image: &'a MemoryImage,
    profile: &'a DeviceProfile,
    nop_is_free: bool,
}

impl<'a> FreeSpaceScanner<'a> {
    pub fn new(image: &'a MemoryImage, profile: &'a DeviceProfile) -> Self {
        Self {
            image,
            profile,
            nop_is_free: profile.scan.nop_is_free,
        }
    }

    /// Whether an all-zero word (`NOP`) counts as free filler.
    pub fn with_nop_is_free(mut self, nop_is_free: bool) -> Self {
        self.nop_is_free = nop_is_free;
        self
    }

    /// A word is free when neither byte is programmed, or when it holds the
    /// unimplemented sentinel, or (if enabled) the `NOP` encoding.
    /// A word with only one programmed byte is not free.
    pub fn is_free(&self, word: u16) -> bool {
        match self.image.word_bytes(word as u32) {
            (None, None) => true,
            (Some(low), Some(high)) => {
                let value = bytes_to_word(low, high);
                value == self.profile.unimplemented
                    || (self.nop_is_free && value == self.profile.nop())
            }
            _ => false,
        }
    }

    /// Start of the first run of at least `min_words` free words in
    /// `[start, end)`.
    pub fn scan(&self, start: u16, end: u16, min_words: u32) -> Option<u16> {
        self.scan_excluding(start, end, min_words, &[])
    }

    /// Like [`FreeSpaceScanner::scan`], treating every word inside `claimed`
    /// as occupied.
    pub fn scan_excluding(
        &self,
        start: u16,
        end: u16,
        min_words: u32,
        claimed: &[Range<u32>],
    ) -> Option<u16> {
        if min_words == 0 {
            return None;
        }
        let mut run_start = start;
        let mut run_len: u32 = 0;
        for word in start..end {
            let taken = claimed.iter().any(|r| r.contains(&(word as u32)));
            if taken || !self.is_free(word) {
                run_len = 0;
                continue;
            }
            if run_len == 0 {
                run_start = word;
            }
            run_len += 1;
            if run_len >= min_words {
                debug!(
                    "Found {} free words at 0x{:04X} in 0x{:04X}-0x{:04X}",
                    min_words, run_start, start, end
                );
                return Some(run_start);
            }
        }
        debug!(
            "No run of {} free words in 0x{:04X}-0x{:04X}",
            min_words, start, end
        );
        None
    }

    /// First word in `[start, end)` holding a backward `GOTO` whose target lies
    /// above the vector table, the usual shape of a firmware main loop.
    /// Returns the word index of the branch and its target.
    pub fn find_loop_branch(&self, start: u16, end: u16) -> Option<(u16, u16)> {
        let encoder = Encoder::new(self.profile);
        (start..end).find_map(|word| {
            let value = self.image.word(word as u32)?;
            match encoder.branch_target(value)? {
                (Mnemonic::GOTO, target) if target < word && target > LOOP_TARGET_FLOOR => {
                    debug!("Loop branch at 0x{:04X} -> 0x{:04X}", word, target);
                    Some((word, target))
                }
                _ => None,
            }
        })
    }
}
