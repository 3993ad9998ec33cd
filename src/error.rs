use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidArgument,
    OutOfRange,
    InvalidFormat,
    UnitMismatch,
    CapacityExceeded,
    ShapeMismatch,
    VolumeCountMismatch,
    InsufficientVolume,
    HeterogeneousGroup,
    DuplicateName,
    InvalidRefSpec,
    UnresolvedReference,
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Error for ProtocolError {}
