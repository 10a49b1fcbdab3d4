use thiserror::Error;

/// Everything that can go wrong while processing a single script or archive.
///
/// All variants abort the file being processed; none of them should abort a
/// batch. See [`crate::batch`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("truncated stream: wanted {wanted} byte(s) at offset {offset}, buffer length is {len}")]
    TruncatedStream { offset: usize, wanted: usize, len: usize },

    #[error("unknown opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { offset: u32, opcode: u8 },

    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("offset reference {original_offset} does not point at any instruction")]
    DanglingReference { original_offset: u32 },

    #[error("character {ch:?} at instruction {offset} cannot be encoded as {encoding}")]
    UnsupportedCharacter { offset: u32, ch: char, encoding: &'static str },

    #[error("invalid UTF-16 string at offset {offset}")]
    InvalidWideString { offset: usize },

    #[error("`{tag}` argument of instruction {offset} holds a value of the wrong type")]
    ValueMismatch { offset: u32, tag: &'static str },

    #[error("duplicate instruction offset {offset}")]
    DuplicateOffset { offset: u32 },

    #[error("invalid opcode table: {0}")]
    InvalidOpcodeTable(String),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("encoded length {actual} differs from relocated length {expected}")]
    LengthMismatch { expected: u32, actual: u32 },

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Error::MalformedRecord { line, reason: reason.into() }
    }
}
