use log::info;
use std::path::Path;

use crate::apply::{AppliedReport, PatchApplier};
use crate::error::Error;
use crate::image::MemoryImage;
use crate::plan::PatchPlan;
use crate::verify::verify_report;

/// Load `input`, apply `plan`, save to `output`, then re-read `output` and
/// check every block. Stops at the first failing stage; `output` is not
/// written unless the plan applied cleanly.
pub fn patch_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    plan: &PatchPlan,
    applier: &PatchApplier,
) -> Result<AppliedReport, Error> {
    let (input, output) = (input.as_ref(), output.as_ref());
    info!("Patching {} -> {}", input.display(), output.display());

    let mut image = MemoryImage::load(input)?;
    let report = applier.apply(&mut image, plan)?;
    image.save(output)?;
    verify_report(output, &report)?;

    info!("Patched {} blocks into {}", report.blocks.len(), output.display());
    Ok(report)
}
