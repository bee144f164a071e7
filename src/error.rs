//! Error types for the profile codec, the outbound compiler and the instance lifecycle

use thiserror::Error;

/// Failures while reading or writing the binary record / universal link formats.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unknown profile type tag: {0}")]
    UnknownTypeTag(i32),

    #[error("unknown profile type: {0}")]
    UnknownTypeName(String),

    #[error("unexpected end of data: needed {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("invalid value {value} for {field}")]
    InvalidField { field: &'static str, value: i64 },

    #[error("invalid string data at offset {0}")]
    InvalidString(usize),

    #[error("empty profile payload for type {0}")]
    EmptyPayload(i32),

    #[error("profile type mismatch: record holds type {expected}, got type {actual}")]
    TypeMismatch { expected: i32, actual: i32 },

    #[error("malformed link: {0}")]
    MalformedLink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Programmer-level failures while building the core configuration.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("cannot compile an empty chain")]
    EmptyChain,

    #[error("profile type {0} has no outbound in the core")]
    UnsupportedVariant(&'static str),

    #[error("a full configuration cannot be chained with other profiles")]
    FullConfigInChain,

    #[error("invalid raw configuration: {0}")]
    InvalidRawConfig(#[from] serde_json::Error),

    #[error("no free local port for helper: {0}")]
    PortAllocation(std::io::Error),
}

/// Instance state machine violations.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("cannot {operation} while instance is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;
