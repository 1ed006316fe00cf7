use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Line {line}: {reason}")]
    Format { line: usize, reason: String },

    #[error("Line {line}: stored checksum 0x{stored:02X} does not match computed 0x{computed:02X}")]
    Checksum { line: usize, stored: u8, computed: u8 },

    #[error("Block `{block}` spans words 0x{start:04X}-0x{end:04X}, outside program memory 0x0000-0x{limit:04X}")]
    Range {
        block: String,
        start: u32,
        end: u32,
        limit: u32,
    },

    #[error("No free run of {words} words for `{base}` in 0x{start:04X}-0x{end:04X}")]
    InsufficientSpace {
        base: String,
        words: u32,
        start: u16,
        end: u16,
    },

    #[error("Encoding error: {0}")]
    Encoding(#[from] pic14_arch::Error),

    #[error("Block `{block}` at 0x{start:04X}-0x{end:04X} overlaps `{other}`")]
    Collision {
        block: String,
        start: u32,
        end: u32,
        other: String,
    },

    #[error("Verification of `{block}` failed at word 0x{word:04X}")]
    Verify { block: String, word: u32 },

    #[error("Invalid patch plan: {0}")]
    Plan(String),

    #[error("Invalid patch document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn format(line: usize, reason: impl Into<String>) -> Self {
        Error::Format {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
