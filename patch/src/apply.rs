//! Writing a [`PatchPlan`] into a [`MemoryImage`].
//!
//! Application runs in two phases. Resolution places every block: fixed
//! blocks first, then each free-space base in order of first use, scanning
//! past everything already claimed. It checks ranges and overlaps and fills
//! in branch links. Only when every block is placed does the write phase
//! touch the image, so a failed `apply` leaves the image as it was.

use indexmap::IndexMap;
use log::{debug, info};
use pic14_arch::{byte_address, DeviceProfile, Encoder};
use std::ops::Range;

use crate::allocator::{Allocator, CollisionPolicy};
use crate::error::Error;
use crate::image::MemoryImage;
use crate::plan::{PatchBlock, PatchPlan, Target};
use crate::scan::FreeSpaceScanner;

/// Where one block ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedBlock {
    pub word_start: u16,
    /// Byte addresses written, `2 * word_start .. 2 * (word_start + len)`.
    pub bytes: Range<u32>,
    /// Words as written, links resolved.
    pub words: Vec<u16>,
    /// Words present before the write; `None` where unprogrammed.
    pub previous: Vec<Option<u16>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedReport {
    /// Blocks in plan order.
    pub blocks: IndexMap<String, AppliedBlock>,
    /// Resolved start word of each free-space base.
    pub bases: IndexMap<String, u16>,
}

impl AppliedReport {
    pub fn get(&self, name: &str) -> Option<&AppliedBlock> {
        self.blocks.get(name)
    }

    pub fn byte_range(&self, name: &str) -> Option<Range<u32>> {
        self.blocks.get(name).map(|b| b.bytes.clone())
    }

    pub fn base(&self, name: &str) -> Option<u16> {
        self.bases.get(name).copied()
    }
}

pub struct PatchApplier<'a> {
    profile: &'a DeviceProfile,
    collisions: CollisionPolicy,
    window: Range<u16>,
    nop_is_free: bool,
}

impl<'a> PatchApplier<'a> {
    pub fn new(profile: &'a DeviceProfile) -> Self {
        Self {
            profile,
            collisions: CollisionPolicy::default(),
            window: profile.scan.start..profile.scan.end,
            nop_is_free: profile.scan.nop_is_free,
        }
    }

    pub fn collisions(mut self, policy: CollisionPolicy) -> Self {
        self.collisions = policy;
        self
    }

    /// Words searched for free space, `start..end`.
    pub fn window(mut self, window: Range<u16>) -> Self {
        self.window = window;
        self
    }

    pub fn nop_is_free(mut self, nop_is_free: bool) -> Self {
        self.nop_is_free = nop_is_free;
        self
    }

    pub fn profile(&self) -> &'a DeviceProfile {
        self.profile
    }

    pub fn apply(&self, image: &mut MemoryImage, plan: &PatchPlan) -> Result<AppliedReport, Error> {
        let (placements, bases) = self.resolve(image, plan)?;

        let mut report = AppliedReport {
            blocks: IndexMap::new(),
            bases,
        };
        for (block, start, words) in placements {
            let previous = (0..words.len() as u32)
                .map(|i| image.word(start as u32 + i))
                .collect();
            for (i, word) in words.iter().enumerate() {
                image.set_word(start as u32 + i as u32, *word);
            }
            let begin = byte_address(start);
            let bytes = begin..begin + words.len() as u32 * 2;
            debug!(
                "Wrote `{}` to words 0x{:04X}-0x{:04X}",
                block.name(),
                start,
                start as usize + words.len() - 1
            );
            report.blocks.insert(
                block.name().to_string(),
                AppliedBlock {
                    word_start: start,
                    bytes,
                    words,
                    previous,
                },
            );
        }

        info!(
            "Applied {} blocks across {} free space bases",
            report.blocks.len(),
            report.bases.len()
        );
        Ok(report)
    }

    /// Place every block and resolve its links without touching `image`.
    #[allow(clippy::type_complexity)]
    fn resolve<'p>(
        &self,
        image: &MemoryImage,
        plan: &'p PatchPlan,
    ) -> Result<(Vec<(&'p PatchBlock, u16, Vec<u16>)>, IndexMap<String, u16>), Error> {
        let mut alloc = Allocator::new(self.profile.program_words as u32, self.collisions);
        let mut starts: IndexMap<&str, u16> = IndexMap::new();

        for block in plan.blocks() {
            if let Target::Fixed(address) = block.target() {
                alloc.allocate(*address as u32, block.len() as u32, block.name())?;
                starts.insert(block.name(), *address);
            }
        }

        let scanner =
            FreeSpaceScanner::new(image, self.profile).with_nop_is_free(self.nop_is_free);
        let mut bases = IndexMap::new();
        for (base, words) in plan.free_space_requests() {
            let start = scanner
                .scan_excluding(self.window.start, self.window.end, words, &alloc.claimed())
                .ok_or_else(|| Error::InsufficientSpace {
                    base: base.clone(),
                    words,
                    start: self.window.start,
                    end: self.window.end,
                })?;
            debug!("Free space base `{}` at 0x{:04X}", base, start);

            for block in plan.blocks() {
                if let Target::FreeSpace { base: b, offset } = block.target() {
                    if *b == base {
                        let range = alloc.allocate(
                            start as u32 + *offset as u32,
                            block.len() as u32,
                            block.name(),
                        )?;
                        starts.insert(block.name(), range.start as u16);
                    }
                }
            }
            alloc.reserve(start as u32, words, &base)?;
            bases.insert(base, start);
        }

        let encoder = Encoder::new(self.profile);
        let placements = plan
            .blocks()
            .map(|block| {
                let start = starts.get(block.name()).copied().ok_or_else(|| {
                    Error::Plan(format!("block `{}` was not placed", block.name()))
                })?;
                let words = link(&encoder, block, &bases)?;
                Ok::<_, Error>((block, start, words))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok((placements, bases))
    }
}

/// The block's words with every link pointed at its resolved address.
fn link(
    encoder: &Encoder,
    block: &PatchBlock,
    bases: &IndexMap<String, u16>,
) -> Result<Vec<u16>, Error> {
    let mut words = block.words().to_vec();
    for l in block.links() {
        let base = bases.get(&l.base).copied().ok_or_else(|| {
            Error::Plan(format!(
                "block `{}` links to unknown free space base `{}`",
                block.name(),
                l.base
            ))
        })?;
        let (mnemonic, _) = encoder.branch_target(words[l.index]).ok_or_else(|| {
            Error::Plan(format!(
                "block `{}` word {} is not a branch",
                block.name(),
                l.index
            ))
        })?;
        let target = base as u32 + l.offset as u32;
        let target = u16::try_from(target).map_err(|_| {
            Error::Plan(format!(
                "block `{}` links past the end of the address space",
                block.name()
            ))
        })?;
        words[l.index] = encoder.op(mnemonic, target)?;
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pic14_arch::PIC16F1704;

    fn firmware() -> MemoryImage {
        let mut image = MemoryImage::new();
        for w in 0x0000..0x0100 {
            image.set_word(w, 0x3019);
        }
        for w in 0x0100..0x0200 {
            image.set_word(w, 0x0000);
        }
        image
    }

    #[test]
    fn fixed_block_records_previous_words() {
        let mut image = firmware();
        let mut plan = PatchPlan::new();
        plan.add(PatchBlock::fixed("hook", 0x0050, vec![0x2100, 0x0000]))
            .unwrap();
        image.set(0x00A2, 0x12);
        let report = PatchApplier::new(&PIC16F1704).apply(&mut image, &plan).unwrap();
        let hook = report.get("hook").unwrap();
        assert_eq!(hook.bytes, 0x00A0..0x00A4);
        assert_eq!(hook.previous, vec![Some(0x3019), Some(0x3012)]);
        assert_eq!(image.word(0x0050), Some(0x2100));
        assert_eq!(image.word(0x0051), Some(0x0000));
    }

    #[test]
    fn links_follow_free_space() {
        let mut image = firmware();
        let mut plan = PatchPlan::new();
        plan.add(PatchBlock::fixed("hook", 0x0050, vec![0x2000]).with_link(0, "burst", 0))
            .unwrap();
        plan.add(PatchBlock::free_space("body", "burst", 0, vec![0x3001, 0x0008]))
            .unwrap();
        plan.add(PatchBlock::free_space("tail", "burst", 2, vec![0x2800]).with_link(0, "burst", 0))
            .unwrap();
        let report = PatchApplier::new(&PIC16F1704).apply(&mut image, &plan).unwrap();
        assert_eq!(report.base("burst"), Some(0x0100));
        assert_eq!(image.word(0x0050), Some(0x2100));
        assert_eq!(image.word(0x0100), Some(0x3001));
        assert_eq!(image.word(0x0102), Some(0x2900));
    }

    #[test]
    fn bases_are_disjoint() {
        let mut image = firmware();
        let mut plan = PatchPlan::new();
        plan.add(PatchBlock::free_space("a", "first", 0, vec![0x0008; 3]))
            .unwrap();
        plan.add(PatchBlock::free_space("b", "second", 0, vec![0x0008; 2]))
            .unwrap();
        plan.reserve("first", 0x10);
        let report = PatchApplier::new(&PIC16F1704).apply(&mut image, &plan).unwrap();
        assert_eq!(report.base("first"), Some(0x0100));
        assert_eq!(report.base("second"), Some(0x0110));
    }

    #[test]
    fn fixed_blocks_are_avoided_by_scans() {
        let mut image = firmware();
        let mut plan = PatchPlan::new();
        plan.add(PatchBlock::free_space("body", "burst", 0, vec![0x0008; 4]))
            .unwrap();
        plan.add(PatchBlock::fixed("pin", 0x0102, vec![0x3FFF]))
            .unwrap();
        let report = PatchApplier::new(&PIC16F1704).apply(&mut image, &plan).unwrap();
        assert_eq!(report.base("burst"), Some(0x0103));
        let names: Vec<&String> = report.blocks.keys().collect();
        assert_eq!(names, vec!["body", "pin"]);
    }

    #[test]
    fn failures_leave_image_untouched() {
        let image = firmware();
        let mut plan = PatchPlan::new();
        plan.add(PatchBlock::fixed("a", 0x0050, vec![0x2100, 0x2100]))
            .unwrap();
        plan.add(PatchBlock::fixed("b", 0x0051, vec![0x2200])).unwrap();
        let mut patched = image.clone();
        let err = PatchApplier::new(&PIC16F1704)
            .apply(&mut patched, &plan)
            .unwrap_err();
        assert!(matches!(err, Error::Collision { .. }));
        assert_eq!(patched, image);

        let mut plan = PatchPlan::new();
        plan.add(PatchBlock::fixed("a", 0x0050, vec![0x2100])).unwrap();
        plan.add(PatchBlock::free_space("big", "burst", 0, vec![0; 0x101]))
            .unwrap();
        let err = PatchApplier::new(&PIC16F1704)
            .nop_is_free(false)
            .window(0x0080..0x0200)
            .apply(&mut patched, &plan)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientSpace { words: 0x101, .. }));
        assert_eq!(patched, image);
    }

    #[test]
    fn overwrite_policy_writes_in_plan_order() {
        let mut image = firmware();
        let mut plan = PatchPlan::new();
        plan.add(PatchBlock::fixed("a", 0x0050, vec![0x1111, 0x1111]))
            .unwrap();
        plan.add(PatchBlock::fixed("b", 0x0051, vec![0x2222])).unwrap();
        PatchApplier::new(&PIC16F1704)
            .collisions(CollisionPolicy::Overwrite)
            .apply(&mut image, &plan)
            .unwrap();
        assert_eq!(image.word(0x0051), Some(0x2222));
    }

    #[test]
    fn out_of_range_block() {
        let mut image = firmware();
        let mut plan = PatchPlan::new();
        plan.add(PatchBlock::fixed("tail", 0x0FFE, vec![0; 3])).unwrap();
        let err = PatchApplier::new(&PIC16F1704)
            .apply(&mut image, &plan)
            .unwrap_err();
        assert!(matches!(err, Error::Range { start: 0x0FFE, end: 0x1000, .. }));
    }

    #[test]
    fn link_beyond_branch_reach() {
        let mut image = MemoryImage::new();
        let mut plan = PatchPlan::new();
        plan.add(PatchBlock::fixed("hook", 0x0050, vec![0x2000]).with_link(0, "burst", 0))
            .unwrap();
        plan.add(PatchBlock::free_space("body", "burst", 0, vec![0x0008]))
            .unwrap();
        let err = PatchApplier::new(&PIC16F1704)
            .window(0x0900..0x1000)
            .apply(&mut image, &plan)
            .unwrap_err();
        assert!(
            matches!(
                err,
                Error::Encoding(pic14_arch::Error::OperandOverflow { operand: 0x0900, mask: 0x07FF, .. })
            ),
            "{}",
            err
        );
        assert!(image.is_empty());
    }

    #[test]
    fn link_must_target_a_branch() {
        let mut image = firmware();
        let mut plan = PatchPlan::new();
        plan.add(PatchBlock::fixed("hook", 0x0050, vec![0x3000]).with_link(0, "burst", 0))
            .unwrap();
        plan.add(PatchBlock::free_space("body", "burst", 0, vec![0x0008]))
            .unwrap();
        let err = PatchApplier::new(&PIC16F1704)
            .apply(&mut image, &plan)
            .unwrap_err();
        assert!(matches!(err, Error::Plan(_)));

        let mut plan = PatchPlan::new();
        plan.add(PatchBlock::fixed("hook", 0x0050, vec![0x2000]).with_link(0, "missing", 0))
            .unwrap();
        assert!(matches!(
            PatchApplier::new(&PIC16F1704).apply(&mut image, &plan),
            Err(Error::Plan(_))
        ));
    }
}
