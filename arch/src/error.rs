use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown mnemonic: `{0}`")]
    UnknownMnemonic(String),

    #[error("Unknown register: `{0}`")]
    UnknownRegister(String),

    #[error("Unknown command: `{0}`")]
    UnknownCommand(String),

    #[error("Operand 0x{operand:04X} of {mnemonic} does not fit mask 0x{mask:04X}")]
    OperandOverflow {
        mnemonic: String,
        operand: u16,
        mask: u16,
    },

    #[error("Invalid device profile: {0}")]
    Profile(#[from] serde_yaml::Error),

    #[error("Failed to read device profile: {0}")]
    Io(#[from] std::io::Error),
}
