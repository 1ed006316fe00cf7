//! JSON form of a [`PatchPlan`].
//!
//! ```json
//! {
//!   "original_file": "firmware.hex",
//!   "patch_version": "1.0",
//!   "modifications": {
//!     "timer4_hook": {
//!       "address": 80,
//!       "code": [8192],
//!       "links": [{ "index": 0, "base": "burst" }],
//!       "description": "..."
//!     },
//!     "burst_logic": { "free_space": { "base": "burst", "offset": 0 }, "code": [8] }
//!   },
//!   "variable_allocation": { "BURST_ENABLE": 112 },
//!   "command_table": { "BURST_ENABLE": 80 },
//!   "notes": ["..."]
//! }
//! ```

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Error;
use crate::plan::{PatchBlock, PatchPlan, Target};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchDocument {
    #[serde(default)]
    pub original_file: String,
    #[serde(default)]
    pub patch_version: String,
    pub modifications: IndexMap<String, Modification>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub free_space_reservations: IndexMap<String, u32>,
    #[serde(default)]
    pub variable_allocation: IndexMap<String, u16>,
    #[serde(default, alias = "i2c_commands")]
    pub command_table: IndexMap<String, u8>,
    #[serde(default, alias = "safety_notes")]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_space: Option<FreeSpaceRef>,
    pub code: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkRef>,
    #[serde(default)]
    pub description: String,
}

/// `code[index]` is a branch to `offset` words into free-space `base`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub index: usize,
    pub base: String,
    #[serde(default)]
    pub offset: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSpaceRef {
    pub base: String,
    #[serde(default)]
    pub offset: u16,
}

impl Modification {
    fn target(&self, name: &str) -> Result<Target, Error> {
        match (&self.address, &self.free_space) {
            (Some(address), None) => Ok(Target::Fixed(*address)),
            (None, Some(r)) => Ok(Target::free_space(r.base.clone(), r.offset)),
            (Some(_), Some(_)) => Err(Error::Plan(format!(
                "`{}` has both an address and a free space target",
                name
            ))),
            (None, None) => Err(Error::Plan(format!("`{}` has no target", name))),
        }
    }
}

impl PatchDocument {
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let doc = Self::from_json(&json)?;
        debug!(
            "Loaded {} modifications from {}",
            doc.modifications.len(),
            path.display()
        );
        Ok(doc)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|e| Error::io(path, e))
    }

    pub fn to_plan(&self) -> Result<PatchPlan, Error> {
        let mut plan = PatchPlan::new();
        for (name, m) in &self.modifications {
            let block = m.links.iter().fold(
                PatchBlock::new(name.clone(), m.target(name)?, m.code.clone())
                    .with_description(m.description.clone()),
                |block, l| block.with_link(l.index, l.base.clone(), l.offset),
            );
            plan.add(block)?;
        }
        for (base, words) in &self.free_space_reservations {
            plan.reserve(base.clone(), *words);
        }
        for (name, address) in &self.variable_allocation {
            plan.variable(name.clone(), *address);
        }
        for (name, code) in &self.command_table {
            plan.command(name.clone(), *code);
        }
        Ok(plan)
    }

    pub fn from_plan(
        plan: &PatchPlan,
        original_file: impl Into<String>,
        patch_version: impl Into<String>,
    ) -> Self {
        let modifications = plan
            .blocks()
            .map(|block| {
                let (address, free_space) = match block.target() {
                    Target::Fixed(address) => (Some(*address), None),
                    Target::FreeSpace { base, offset } => (
                        None,
                        Some(FreeSpaceRef {
                            base: base.clone(),
                            offset: *offset,
                        }),
                    ),
                };
                let m = Modification {
                    address,
                    free_space,
                    code: block.words().to_vec(),
                    links: block
                        .links()
                        .iter()
                        .map(|l| LinkRef {
                            index: l.index,
                            base: l.base.clone(),
                            offset: l.offset,
                        })
                        .collect(),
                    description: block.description().to_string(),
                };
                (block.name().to_string(), m)
            })
            .collect();
        Self {
            original_file: original_file.into(),
            patch_version: patch_version.into(),
            modifications,
            free_space_reservations: plan.reservations().clone(),
            variable_allocation: plan.variables().clone(),
            command_table: plan.commands().clone(),
            notes: Vec::new(),
        }
    }
}
