use std::io;

/// Errors produced while encoding (and, for the companion decoder, decoding) MessagePack.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A value (or a record field option) cannot be encoded.
    #[error("Unexpected type: {0}")]
    InvalidType(String),

    /// A string, binary, container or extension payload is longer than `u32::MAX`.
    #[error("{kind} exceeded max length (len: {len})")]
    ExceededLength { kind: &'static str, len: usize },

    /// Two equal keys in one map, or two record fields with the same wire name.
    #[error("Duplicated key {0}")]
    DuplicatedKey(String),

    /// Extension code outside `0..=127`.
    #[error("Extension code {0} out of bound (0..=127)")]
    OutOfBound(u8),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An external type handler failed.
    #[error("External type {code} encoder failed: {message}")]
    External { code: u8, message: String },

    #[error("Unexpected EOF")]
    UnexpectedEof,

    #[error("Invalid MessagePack marker 0x{0:02x}")]
    InvalidMarker(u8),

    #[error("Invalid UTF-8")]
    InvalidUtf8,

    #[cfg(feature = "serde")]
    #[error("Serde error: {0}")]
    Serde(String),
}

impl Error {
    /// Copy of the error, used by error nodes that report the same failure
    /// from both `encoded_len` and `write_to`.
    pub(crate) fn replicate(&self) -> Error {
        match self {
            Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
            Error::InvalidType(s) => Error::InvalidType(s.clone()),
            Error::ExceededLength { kind, len } => Error::ExceededLength {
                kind: *kind,
                len: *len,
            },
            Error::DuplicatedKey(k) => Error::DuplicatedKey(k.clone()),
            Error::OutOfBound(code) => Error::OutOfBound(*code),
            Error::InvalidArgument(s) => Error::InvalidArgument(s.clone()),
            Error::External { code, message } => Error::External {
                code: *code,
                message: message.clone(),
            },
            Error::UnexpectedEof => Error::UnexpectedEof,
            Error::InvalidMarker(m) => Error::InvalidMarker(*m),
            Error::InvalidUtf8 => Error::InvalidUtf8,
            #[cfg(feature = "serde")]
            Error::Serde(s) => Error::Serde(s.clone()),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::ser::Error for Error {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Error::Serde(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
