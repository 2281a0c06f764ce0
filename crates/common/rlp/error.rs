use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RLPDecodeError {
    #[error("InvalidLength")]
    InvalidLength,
    #[error("MalformedData")]
    MalformedData,
    #[error("UnexpectedList")]
    UnexpectedList,
    #[error("InvalidCompression")]
    InvalidCompression,
}
