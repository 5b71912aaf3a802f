//! Main Crate Error

#[derive(thiserror::Error, Debug)]
/// Seedwatch crate error enum.
pub enum Error {
    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),

    /// Identifier bytes were not exactly 20 bytes.
    #[error("Invalid Id size, expected 20, got {0}")]
    InvalidIdSize(usize),

    /// Identifier string was not 40 hex digits.
    #[error("Invalid Id encoding: {0}")]
    InvalidIdEncoding(String),

    /// The tail of the port-mapping file could not be parsed. Not
    /// recoverable: without the tail the rotation cursor position is
    /// unknown.
    #[error("Corrupt port-mapping file tail: {0}")]
    CorruptPortMap(String),
}
