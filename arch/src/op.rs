use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Error;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
pub enum Mnemonic {
    NOP,
    MOVLW,
    MOVWF,
    MOVF,
    GOTO,
    CALL,
    RETURN,
    RETLW,
    BCF,
    BSF,
    BTFSC,
    BTFSS,
    ANDLW,
    IORLW,
    XORLW,
    SUBLW,
    ADDLW,
    CLRF,
    CLRW,
    INCF,
    DECF,
    ADDWF,
    SUBWF,
    MOVLP,
    MOVLB,
}

impl Mnemonic {
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s.to_ascii_uppercase().parse::<Self>() {
            Ok(m) => Ok(m),
            Err(_) => Err(Error::UnknownMnemonic(s.to_string())),
        }
    }
}

/// Where the result of a byte-oriented file operation goes (the `d` bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest {
    W,
    F,
}

impl Dest {
    pub fn bit(self) -> u16 {
        match self {
            Dest::W => 0x0000,
            Dest::F => 0x0080,
        }
    }
}

/// Fixed opcode bits plus the mask of the bits carrying the operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpcodeSpec {
    pub base: u16,
    pub mask: u16,
}

impl OpcodeSpec {
    pub const fn new(base: u16, mask: u16) -> Self {
        Self { base, mask }
    }

    /// True when `word` carries this opcode, judged on the 14 instruction bits
    /// outside the operand field.
    pub fn matches(&self, word: u16) -> bool {
        word & !self.mask & 0x3FFF == self.base & !self.mask
    }

    pub fn operand(&self, word: u16) -> u16 {
        word & self.mask
    }
}
