//! The transport collaborator an engine drives (spec §4.5 — part of
//! component C5's external surface).
//!
//! `plc-core` never opens a socket itself: a concrete crate such as
//! `plc-transport-tokio` supplies a [`Socket`] implementation, and the
//! engine only ever calls through this trait. This is the seam that keeps
//! the retry/backoff/multiplexing logic testable without a real network.

use async_trait::async_trait;

use crate::status::Status;

/// A single point-to-point connection to a PLC's gateway.
///
/// Implementors own exactly one underlying connection; `connect` is called
/// at most once per `Socket` value (the engine constructs a fresh `Socket`
/// for every connection attempt rather than reconnecting a stale one).
#[async_trait]
pub trait Socket: Send {
    /// Establish the underlying connection (e.g. TCP `connect`).
    async fn connect(&mut self) -> Status;

    /// Write `buf` in full. Implementations should not partially write and
    /// return `Ok`; short writes are retried internally.
    async fn write_all(&mut self, buf: &[u8]) -> Status;

    /// Read at least one byte into `buf`, returning the number of bytes
    /// read, or an end-of-stream indication via `Ok(0)`.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Status>;

    /// Tear down the connection. Idempotent — may be called on an already
    /// disconnected or never-connected socket.
    async fn shutdown(&mut self);
}
