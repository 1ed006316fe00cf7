//! Declarative description of the code to inject.

use indexmap::IndexMap;

use crate::error::Error;

/// Where a block's first word goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Absolute word index.
    Fixed(u16),
    /// `offset` words past the start of the free run found for `base`.
    FreeSpace { base: String, offset: u16 },
}

impl Target {
    pub fn free_space(base: impl Into<String>, offset: u16) -> Self {
        Target::FreeSpace {
            base: base.into(),
            offset,
        }
    }
}

/// A branch in a block whose operand is the resolved address of a free-space
/// base plus `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Position of the `GOTO`/`CALL` word within the block.
    pub index: usize,
    pub base: String,
    pub offset: u16,
}

/// A named, immutable run of instruction words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchBlock {
    name: String,
    target: Target,
    words: Vec<u16>,
    links: Vec<Link>,
    description: String,
}

impl PatchBlock {
    pub fn new(name: impl Into<String>, target: Target, words: Vec<u16>) -> Self {
        Self {
            name: name.into(),
            target,
            words,
            links: Vec::new(),
            description: String::new(),
        }
    }

    pub fn fixed(name: impl Into<String>, address: u16, words: Vec<u16>) -> Self {
        Self::new(name, Target::Fixed(address), words)
    }

    pub fn free_space(
        name: impl Into<String>,
        base: impl Into<String>,
        offset: u16,
        words: Vec<u16>,
    ) -> Self {
        Self::new(name, Target::free_space(base, offset), words)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Point the branch at `index` to `offset` words into free-space `base`.
    pub fn with_link(mut self, index: usize, base: impl Into<String>, offset: u16) -> Self {
        self.links.push(Link {
            index,
            base: base.into(),
            offset,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Blocks in application order plus the constant tables they were built
/// against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchPlan {
    blocks: IndexMap<String, PatchBlock>,
    reservations: IndexMap<String, u32>,
    variables: IndexMap<String, u16>,
    commands: IndexMap<String, u8>,
}

impl PatchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, block: PatchBlock) -> Result<(), Error> {
        if block.is_empty() {
            return Err(Error::Plan(format!("block `{}` has no words", block.name)));
        }
        if let Some(link) = block.links.iter().find(|l| l.index >= block.words.len()) {
            return Err(Error::Plan(format!(
                "block `{}` links word {} but has {} words",
                block.name,
                link.index,
                block.words.len()
            )));
        }
        if self.blocks.contains_key(&block.name) {
            return Err(Error::Plan(format!("duplicate block `{}`", block.name)));
        }
        self.blocks.insert(block.name.clone(), block);
        Ok(())
    }

    pub fn with_block(mut self, block: PatchBlock) -> Result<Self, Error> {
        self.add(block)?;
        Ok(self)
    }

    /// Ask for at least `words` free words under `base`, even if its blocks
    /// need fewer.
    pub fn reserve(&mut self, base: impl Into<String>, words: u32) {
        let entry = self.reservations.entry(base.into()).or_default();
        *entry = (*entry).max(words);
    }

    /// Record a RAM variable address the injected code uses.
    pub fn variable(&mut self, name: impl Into<String>, address: u16) {
        self.variables.insert(name.into(), address);
    }

    /// Record a command code the injected code dispatches on.
    pub fn command(&mut self, name: impl Into<String>, code: u8) {
        self.commands.insert(name.into(), code);
    }

    pub fn blocks(&self) -> impl Iterator<Item = &PatchBlock> {
        self.blocks.values()
    }

    pub fn get(&self, name: &str) -> Option<&PatchBlock> {
        self.blocks.get(name)
    }

    pub fn reservations(&self) -> &IndexMap<String, u32> {
        &self.reservations
    }

    pub fn variables(&self) -> &IndexMap<String, u16> {
        &self.variables
    }

    pub fn commands(&self) -> &IndexMap<String, u8> {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Words each free-space base must provide, in order of first use.
    ///
    /// A base needs room for the furthest-reaching of its blocks, or its
    /// reservation if that is larger.
    pub fn free_space_requests(&self) -> IndexMap<String, u32> {
        let mut requests: IndexMap<String, u32> = IndexMap::new();
        for block in self.blocks() {
            if let Target::FreeSpace { base, offset } = &block.target {
                let reach = *offset as u32 + block.len() as u32;
                let entry = requests.entry(base.clone()).or_default();
                *entry = (*entry).max(reach);
            }
        }
        for (base, words) in &self.reservations {
            let entry = requests.entry(base.clone()).or_default();
            *entry = (*entry).max(*words);
        }
        requests
    }
}
