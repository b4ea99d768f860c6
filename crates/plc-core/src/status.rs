//! Wire-level status codes returned by [`crate::layer::Layer`] methods and
//! by the engine's own state functions.
//!
//! `Status` is deliberately a plain `Copy` enum rather than an `Error` impl:
//! it is the hot-path return value threaded through every layer call and
//! every engine state transition, and most of its variants (`Pending`,
//! `Partial`, `Retry`) are not errors at all. Richer, loggable failures use
//! [`PlcError`] at the crate boundary instead.

use core::fmt;

/// Return code shared by every [`crate::layer::Layer`] method and by the
/// connection engine's state functions.
///
/// `NoMem` and `NullPtr` exist for fidelity with the taxonomy a dialect
/// author porting logic from a C-style PLC driver will already know; safe
/// Rust code essentially never produces them itself (there are no manual
/// allocations or raw pointers on this path), but a dialect is free to
/// return them if it wraps an FFI layer that can fail that way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation completed; the caller may proceed to the next phase.
    Ok,
    /// The caller should immediately re-invoke the current state (tail call).
    Pending,
    /// Not enough bytes have arrived yet; rearm the read and wait.
    Partial,
    /// Redo the current phase (e.g. a multi-step handshake needs another round).
    Retry,
    /// The resource is already in use (e.g. a request already queued).
    Busy,
    /// The lookup target does not exist.
    NotFound,
    /// Allocation failed.
    NoMem,
    /// `gateway` could not be parsed or resolved.
    BadGateway,
    /// An offset fell outside `[0, data_capacity]`.
    OutOfBounds,
    /// The buffer is too small to hold the requested data.
    TooSmall,
    /// A required pointer/handle was absent.
    NullPtr,
}

impl Status {
    /// True for [`Status::Ok`] and [`Status::Pending`] — the two "keep going"
    /// outcomes that never trigger the disconnect/reset error policy.
    pub fn is_progress(self) -> bool {
        matches!(self, Status::Ok | Status::Pending)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Crate-level fallible-operation error, distinct from the wire-level
/// [`Status`] codes layers exchange with the engine.
#[derive(Debug, thiserror::Error)]
pub enum PlcError {
    #[error("gateway {0:?} is not a valid host[:port]")]
    BadGateway(String),

    #[error("idle_timeout_ms must be within 0..=5000, got {0}")]
    InvalidIdleTimeout(u32),

    #[error("`gateway` attribute is required")]
    MissingGateway,

    #[error("request is already queued")]
    Busy,

    #[error("no PLC registered for key {0:?}")]
    NotFound(String),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("layer reported {0}")]
    Layer(Status),
}

/// Convenience alias used throughout the crate's fallible public API.
pub type Result<T> = core::result::Result<T, PlcError>;
