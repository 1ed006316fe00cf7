//! Device profiles.
//!
//! A [`DeviceProfile`] bundles every constant table the encoder and the patch
//! engine consult: program memory size, the unprogrammed-word sentinel, the
//! opcode table, the register map and the command map. Retargeting to another
//! part means passing a different profile, typically loaded from YAML.

use indexmap::IndexMap;
use log::debug;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Error;
use crate::op::{Mnemonic, OpcodeSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    /// Number of program memory words; valid word indices are `0..program_words`.
    pub program_words: u16,
    /// Word value of unimplemented/erased program memory.
    pub unimplemented: u16,
    pub opcodes: IndexMap<Mnemonic, OpcodeSpec>,
    #[serde(default)]
    pub registers: IndexMap<String, u16>,
    #[serde(default)]
    pub commands: IndexMap<String, u8>,
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Defaults for free-space searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// First word searched; words below hold the reset and interrupt vectors.
    pub start: u16,
    /// One past the last word searched.
    pub end: u16,
    /// Treat the all-zero word (`NOP`) as reclaimable filler.
    pub nop_is_free: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start: 0x0080,
            end: 0x1000,
            nop_is_free: true,
        }
    }
}

impl DeviceProfile {
    pub fn opcode(&self, mnemonic: Mnemonic) -> Result<OpcodeSpec, Error> {
        self.opcodes
            .get(&mnemonic)
            .copied()
            .ok_or_else(|| Error::UnknownMnemonic(mnemonic.to_string()))
    }

    pub fn register(&self, name: &str) -> Result<u16, Error> {
        self.registers
            .get(&name.to_ascii_uppercase())
            .copied()
            .ok_or_else(|| Error::UnknownRegister(name.to_string()))
    }

    pub fn command(&self, name: &str) -> Result<u8, Error> {
        self.commands
            .get(&name.to_ascii_uppercase())
            .copied()
            .ok_or_else(|| Error::UnknownCommand(name.to_string()))
    }

    /// Word encoding of `NOP` under this profile's opcode table.
    pub fn nop(&self) -> u16 {
        self.opcodes
            .get(&Mnemonic::NOP)
            .map(|spec| spec.base)
            .unwrap_or(0x0000)
    }

    pub fn contains_word(&self, word: u32) -> bool {
        word < self.program_words as u32
    }

    /// Register and command names are matched case-insensitively, so their
    /// keys are upper-cased on load.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let mut profile: Self = serde_yaml::from_str(yaml)?;
        profile.registers = upper_keys(profile.registers);
        profile.commands = upper_keys(profile.commands);
        Ok(profile)
    }

    pub fn to_yaml(&self) -> Result<String, Error> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let profile = Self::from_yaml(&std::fs::read_to_string(path)?)?;
        debug!(
            "Loaded device profile {} from {}: {} opcodes, {} registers",
            profile.name,
            path.display(),
            profile.opcodes.len(),
            profile.registers.len()
        );
        Ok(profile)
    }
}

fn upper_keys<V>(map: IndexMap<String, V>) -> IndexMap<String, V> {
    map.into_iter()
        .map(|(k, v)| (k.to_ascii_uppercase(), v))
        .collect()
}

pub static PIC16F1704: Lazy<DeviceProfile> = Lazy::new(|| {
    use Mnemonic::*;

    let opcodes = [
        (NOP, 0x0000, 0x0000),
        (MOVLW, 0x3000, 0x00FF),
        (MOVWF, 0x0080, 0x007F),
        (MOVF, 0x0800, 0x00FF),
        (GOTO, 0x2800, 0x07FF),
        (CALL, 0x2000, 0x07FF),
        (RETURN, 0x0008, 0x0000),
        (RETLW, 0x3400, 0x00FF),
        (BCF, 0x1000, 0x03FF),
        (BSF, 0x1400, 0x03FF),
        (BTFSC, 0x1800, 0x03FF),
        (BTFSS, 0x1C00, 0x03FF),
        (ANDLW, 0x3900, 0x00FF),
        (IORLW, 0x3800, 0x00FF),
        (XORLW, 0x3A00, 0x00FF),
        (SUBLW, 0x3C00, 0x00FF),
        (ADDLW, 0x3E00, 0x00FF),
        (CLRF, 0x0180, 0x007F),
        (CLRW, 0x0100, 0x0000),
        (INCF, 0x0A00, 0x00FF),
        (DECF, 0x0300, 0x00FF),
        (ADDWF, 0x0700, 0x00FF),
        (SUBWF, 0x0200, 0x00FF),
        (MOVLP, 0x3180, 0x007F),
        (MOVLB, 0x0020, 0x001F),
    ]
    .into_iter()
    .map(|(m, base, mask)| (m, OpcodeSpec::new(base, mask)))
    .collect();

    let registers = [
        ("STATUS", 0x03),
        ("PORTA", 0x0C),
        ("PORTC", 0x0E),
        ("PR2", 0x1B),
        ("T2CON", 0x1C),
        ("TRISA", 0x8C),
        ("TRISC", 0x8E),
        ("ADRESL", 0x9B),
        ("ADRESH", 0x9C),
        ("ADCON0", 0x9D),
        ("ADCON1", 0x9E),
        ("SSP1BUF", 0x211),
        ("SSP1CON1", 0x215),
        ("CCPR1L", 0x291),
        ("CCP1CON", 0x293),
        ("PWM1CON", 0x294),
    ]
    .into_iter()
    .map(|(name, addr)| (name.to_string(), addr))
    .collect();

    let commands = [
        ("BURST_ENABLE", 0x50),
        ("SET_THRESH_LOW", 0x51),
        ("SET_THRESH_HIGH", 0x52),
        ("GET_BURST_STATUS", 0x53),
        ("GET_LOAD_CURRENT", 0x54),
    ]
    .into_iter()
    .map(|(name, code)| (name.to_string(), code))
    .collect();

    DeviceProfile {
        name: "PIC16F1704".to_string(),
        program_words: 0x1000,
        unimplemented: 0x3FFF,
        opcodes,
        registers,
        commands,
        scan: ScanConfig::default(),
    }
});
