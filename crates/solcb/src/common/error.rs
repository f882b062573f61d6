//! Error types for the module bridge

use thiserror::Error;

/// Failure raised by the bridge itself or by the compiler module underneath it
///
/// Request-level mistakes never show up here: those are reported to the
/// caller as a fatal error document (see [`super::FatalError`]).
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("compiler module exports neither `solidity_alloc` nor `malloc`")]
    MissingAllocator,

    #[error("compiler module does not export `{name}`")]
    MissingEntryPoint { name: &'static str },

    #[error("callback protocol violation: {message}")]
    Protocol { message: String },

    #[error("memory access out of bounds: {len} bytes at {pointer:#x}")]
    OutOfBounds { pointer: u32, len: usize },

    #[error("invalid call to `{name}`: {message}")]
    Signature { name: &'static str, message: String },

    #[error("compiler module failed: {message}")]
    Module { message: String },
}

impl BridgeError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn signature(name: &'static str, message: impl Into<String>) -> Self {
        Self::Signature {
            name,
            message: message.into(),
        }
    }

    pub fn module(message: impl Into<String>) -> Self {
        Self::Module {
            message: message.into(),
        }
    }

    pub fn out_of_bounds(pointer: u32, len: usize) -> Self {
        Self::OutOfBounds { pointer, len }
    }

    /// True for failures that indicate a broken module or loader rather than
    /// a bad request
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::MissingAllocator | Self::OutOfBounds { .. }
        )
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
