use log::warn;
use std::ops::Range;

use crate::error::Error;

/// What happens when a block claims words another block already owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    #[default]
    Reject,
    /// Later blocks win, as if written in plan order.
    Overwrite,
}

#[derive(Debug, Clone)]
struct Section {
    begin: u32,
    end: u32,
    owner: Option<String>, // None means free
}

impl Section {
    fn new(begin: u32, end: u32, owner: Option<String>) -> Self {
        Self { begin, end, owner }
    }

    fn is_free(&self) -> bool {
        self.owner.is_none()
    }

    fn overlaps(&self, begin: u32, end: u32) -> bool {
        begin <= self.end && end >= self.begin
    }

    /// Replace `[begin, end]` inside this section, keeping the rest under the
    /// current owner.
    fn carve(&self, begin: u32, end: u32, owner: &str) -> Vec<Self> {
        let begin = begin.max(self.begin);
        let end = end.min(self.end);
        let mut result = Vec::new();

        // Leading section
        if begin > self.begin {
            result.push(Section::new(self.begin, begin - 1, self.owner.clone()));
        }

        result.push(Section::new(begin, end, Some(owner.to_string())));

        // Trailing section
        if end < self.end {
            result.push(Section::new(end + 1, self.end, self.owner.clone()));
        }

        result
    }
}

/// Tracks which program memory words belong to which patch block.
pub struct Allocator {
    map: Vec<Section>,
    limit: u32,
    policy: CollisionPolicy,
}

impl Allocator {
    /// Allocator over words `0..words`.
    pub fn new(words: u32, policy: CollisionPolicy) -> Self {
        let map = if words == 0 {
            vec![]
        } else {
            vec![Section::new(0, words - 1, None)]
        };
        Self {
            map,
            limit: words,
            policy,
        }
    }

    /// Claim `len` words starting at `start` for `name`.
    pub fn allocate(&mut self, start: u32, len: u32, name: &str) -> Result<Range<u32>, Error> {
        let end = self.bounds(start, len, name)?;

        if let Some(other) = self
            .map
            .iter()
            .find(|s| !s.is_free() && s.overlaps(start, end))
            .and_then(|s| s.owner.clone())
        {
            match self.policy {
                CollisionPolicy::Reject => {
                    return Err(Error::Collision {
                        block: name.to_string(),
                        start,
                        end,
                        other,
                    })
                }
                CollisionPolicy::Overwrite => warn!(
                    "`{}` at 0x{:04X}-0x{:04X} overwrites `{}`",
                    name, start, end, other
                ),
            }
        }

        self.claim(start, end, name, |_| true);
        Ok(start..end + 1)
    }

    /// Claim whatever is still free in `len` words from `start`.
    pub fn reserve(&mut self, start: u32, len: u32, name: &str) -> Result<(), Error> {
        let end = self.bounds(start, len, name)?;
        self.claim(start, end, name, Section::is_free);
        Ok(())
    }

    /// Every owned word range, ascending.
    pub fn claimed(&self) -> Vec<Range<u32>> {
        self.map
            .iter()
            .filter(|s| !s.is_free())
            .map(|s| s.begin..s.end + 1)
            .collect()
    }

    pub fn allocations(&self) -> Vec<(String, Range<u32>)> {
        self.map
            .iter()
            .filter_map(|s| s.owner.as_ref().map(|n| (n.clone(), s.begin..s.end + 1)))
            .collect()
    }

    fn bounds(&self, start: u32, len: u32, name: &str) -> Result<u32, Error> {
        if len == 0 {
            return Err(Error::Plan(format!("`{}` claims no words", name)));
        }
        let out_of_range = || Error::Range {
            block: name.to_string(),
            start,
            end: start.saturating_add(len - 1),
            limit: self.limit.saturating_sub(1),
        };
        let end = start.checked_add(len - 1).ok_or_else(out_of_range)?;
        if end >= self.limit {
            return Err(out_of_range());
        }
        Ok(end)
    }

    fn claim(&mut self, begin: u32, end: u32, name: &str, replace: impl Fn(&Section) -> bool) {
        self.map = self
            .map
            .iter()
            .flat_map(|s| {
                if s.overlaps(begin, end) && replace(s) {
                    s.carve(begin, end, name)
                } else {
                    vec![s.clone()]
                }
            })
            .collect();
    }
}
