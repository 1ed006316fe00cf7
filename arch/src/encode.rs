use log::trace;

use crate::device::DeviceProfile;
use crate::error::Error;
use crate::op::{Dest, Mnemonic};

/// Combine an opcode base with an operand truncated to `mask`.
///
/// Operand bits outside the mask are dropped silently:
/// `encode(0x2800, 0x900, 0x7FF) == 0x2900`.
pub fn encode(base: u16, operand: u16, mask: u16) -> u16 {
    base | (operand & mask)
}

/// What to do with operand bits that fall outside the opcode's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperandPolicy {
    Truncate,
    #[default]
    Reject,
}

/// Builds instruction words from the tables of a [`DeviceProfile`].
#[derive(Debug, Clone, Copy)]
pub struct Encoder<'a> {
    profile: &'a DeviceProfile,
    policy: OperandPolicy,
}

impl<'a> Encoder<'a> {
    pub fn new(profile: &'a DeviceProfile) -> Self {
        Self {
            profile,
            policy: OperandPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: OperandPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn profile(&self) -> &'a DeviceProfile {
        self.profile
    }

    pub fn op(&self, mnemonic: Mnemonic, operand: u16) -> Result<u16, Error> {
        let spec = self.profile.opcode(mnemonic)?;
        if self.policy == OperandPolicy::Reject && operand & !spec.mask != 0 {
            return Err(Error::OperandOverflow {
                mnemonic: mnemonic.to_string(),
                operand,
                mask: spec.mask,
            });
        }
        let word = encode(spec.base, operand, spec.mask);
        trace!("{} 0x{:04X} -> 0x{:04X}", mnemonic, operand, word);
        Ok(word)
    }

    /// Encode an instruction that takes no operand.
    pub fn bare(&self, mnemonic: Mnemonic) -> Result<u16, Error> {
        self.op(mnemonic, 0)
    }

    /// Parse `mnemonic` by name, then encode it.
    pub fn named(&self, mnemonic: &str, operand: u16) -> Result<u16, Error> {
        self.op(Mnemonic::parse(mnemonic)?, operand)
    }

    /// File operation without a destination bit (`MOVWF`, `CLRF`).
    ///
    /// The register address is reduced to its offset within the bank; select
    /// the bank first with [`Encoder::bank_select`].
    pub fn file(&self, mnemonic: Mnemonic, register: u16) -> Result<u16, Error> {
        self.op(mnemonic, register & 0x7F)
    }

    /// File operation with a destination bit (`MOVF`, `ADDWF`, `INCF`, ...).
    pub fn file_to(&self, mnemonic: Mnemonic, register: u16, dest: Dest) -> Result<u16, Error> {
        self.op(mnemonic, (register & 0x7F) | dest.bit())
    }

    /// Bit operation (`BCF`, `BSF`, `BTFSC`, `BTFSS`).
    pub fn bit_op(&self, mnemonic: Mnemonic, register: u16, bit: u8) -> Result<u16, Error> {
        if bit > 7 && self.policy == OperandPolicy::Reject {
            return Err(Error::OperandOverflow {
                mnemonic: mnemonic.to_string(),
                operand: bit as u16,
                mask: 0x7,
            });
        }
        self.op(mnemonic, ((bit as u16 & 0x7) << 7) | (register & 0x7F))
    }

    /// `MOVLB` selecting the bank holding `register`.
    pub fn bank_select(&self, register: u16) -> Result<u16, Error> {
        self.op(Mnemonic::MOVLB, register >> 7)
    }

    pub fn call(&self, target: u16) -> Result<u16, Error> {
        self.op(Mnemonic::CALL, target)
    }

    pub fn goto(&self, target: u16) -> Result<u16, Error> {
        self.op(Mnemonic::GOTO, target)
    }

    /// Address of a named register from the profile's register map.
    pub fn register(&self, name: &str) -> Result<u16, Error> {
        self.profile.register(name)
    }

    /// Numeric code of a named command from the profile's command map.
    pub fn command(&self, name: &str) -> Result<u8, Error> {
        self.profile.command(name)
    }

    /// Target word of a `GOTO` or `CALL`, `None` for any other instruction.
    pub fn branch_target(&self, word: u16) -> Option<(Mnemonic, u16)> {
        [Mnemonic::GOTO, Mnemonic::CALL]
            .into_iter()
            .find_map(|m| match self.profile.opcode(m) {
                Ok(spec) if spec.matches(word) => Some((m, spec.operand(word))),
                _ => None,
            })
    }
}
