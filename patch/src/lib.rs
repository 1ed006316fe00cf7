//! Patching of Intel HEX firmware images for 14-bit PIC program memory.
//!
//! Load an image, describe the code to inject as a [`PatchPlan`] (or a JSON
//! [`PatchDocument`]), apply it with a [`PatchApplier`] and save. Device
//! constants come from a [`pic14_arch::DeviceProfile`].

mod allocator;
mod apply;
mod document;
mod error;
mod hex;
mod image;
mod pipeline;
mod plan;
mod scan;
mod verify;

pub use allocator::{Allocator, CollisionPolicy};
pub use apply::{AppliedBlock, AppliedReport, PatchApplier};
pub use document::{FreeSpaceRef, LinkRef, Modification, PatchDocument};
pub use error::Error;
pub use hex::{
    checksum, format_record, parse_bytes, parse_str, serialize, HexRecord, RecordType, EOF_RECORD,
    MAX_DATA_LEN, RECORD_MARK,
};
pub use image::MemoryImage;
pub use pipeline::patch_file;
pub use plan::{Link, PatchBlock, PatchPlan, Target};
pub use scan::FreeSpaceScanner;
pub use verify::{diff_words, verify, verify_report, verify_words, WordDiff};
