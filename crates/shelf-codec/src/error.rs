use thiserror::Error;

/// Errors from encoding or decoding a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value cannot be represented by this codec.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The stored text is not a valid encoding of the requested type.
    #[error("decode failed: {0}")]
    Decode(String),
}

pub type CodecResult<T> = Result<T, CodecError>;
