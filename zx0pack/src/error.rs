//! ZX0-specific error types.

use thiserror::Error;

/// ZX0 compression errors.
#[derive(Debug, Error)]
pub enum Zx0Error {
    /// A back-reference offset left the legal range during emission.
    #[error("invalid back-reference offset: {offset} outside {min}..={max}")]
    InvalidOffset {
        /// The offending offset.
        offset: usize,
        /// Smallest legal offset.
        min: usize,
        /// Largest legal offset for this stream.
        max: usize,
    },

    /// The output buffer limit was reached while emitting.
    #[error("output buffer exhausted: limit of {limit} bytes reached")]
    OutputOverflow {
        /// Maximum number of output bytes the emitter was allowed to write.
        limit: usize,
    },

    /// The configured dictionary does not fit in the input.
    #[error("dictionary size {dictionary_size} exceeds input size {input_size}")]
    DictionaryTooLarge {
        /// Configured number of pre-seeded context bytes.
        dictionary_size: usize,
        /// Total input size.
        input_size: usize,
    },

    /// The configured window cannot address any offset.
    #[error("invalid window size: {window} (must be at least {min})")]
    InvalidWindow {
        /// Configured window.
        window: usize,
        /// Smallest usable window.
        min: usize,
    },

    /// The first command of a ZX0 stream must be a literal run.
    #[error("first command of the stream is not a literal run")]
    FirstCommandNotLiteral,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Zx0Error {
    /// Create an invalid-offset error.
    pub fn invalid_offset(offset: usize, min: usize, max: usize) -> Self {
        Self::InvalidOffset { offset, min, max }
    }

    /// Create an output-overflow error.
    pub fn output_overflow(limit: usize) -> Self {
        Self::OutputOverflow { limit }
    }
}

/// Result type for ZX0 operations.
pub type Result<T> = std::result::Result<T, Zx0Error>;
