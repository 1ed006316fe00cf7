//! Instruction set and device tables for mid-range 14-bit PIC program memory.

pub mod device;
pub mod encode;
pub mod error;
pub mod op;
pub mod word;

pub use device::{DeviceProfile, ScanConfig, PIC16F1704};
pub use encode::{encode, Encoder, OperandPolicy};
pub use error::Error;
pub use op::{Dest, Mnemonic, OpcodeSpec};
pub use word::{byte_address, bytes_to_word, word_to_bytes};
