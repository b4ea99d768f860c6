//! The single contiguous byte buffer shared by every layer in a PLC's
//! stack, for both transmit and receive (spec §3, §4.7 — component C7).
//!
//! There is exactly one `Buffer` per [`crate::plc::Plc`]. Layers never
//! allocate their own scratch space; they all read and write through the
//! same `[payload_start, payload_end)` window, narrowing or widening it as
//! they reserve, build or strip their own header and trailer.

use crate::status::Status;

/// A resizable (upward-only) byte buffer with the two offset markers that
/// bracket the envelope currently being assembled or parsed.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    payload_start: usize,
    payload_end: usize,
}

impl Buffer {
    /// Create a buffer with the given initial capacity, fully reset.
    pub fn with_capacity(capacity: usize) -> Self {
        Buffer {
            data: vec![0u8; capacity],
            payload_start: 0,
            payload_end: 0,
        }
    }

    /// Total allocated capacity (`data_capacity` in spec.md).
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn payload_start(&self) -> usize {
        self.payload_start
    }

    pub fn payload_end(&self) -> usize {
        self.payload_end
    }

    /// Reset both markers to span nothing, ahead of a fresh phase.
    pub fn reset(&mut self) {
        self.payload_start = 0;
        self.payload_end = 0;
    }

    /// Mark the whole buffer as pending send/parse (used after a socket
    /// read completes, before layers strip their framing).
    pub fn set_span(&mut self, start: usize, end: usize) -> Status {
        if start > end || end > self.data.len() {
            return Status::OutOfBounds;
        }
        self.payload_start = start;
        self.payload_end = end;
        Status::Ok
    }

    /// Grow the backing storage so that `capacity() >= min`. Never shrinks.
    /// A `min` of zero is rejected, matching `set_buffer_size`'s refusal of
    /// non-positive sizes in spec.md §4.7 (there is no negative `usize`, so
    /// zero is the Rust-idiomatic stand-in for "non-positive").
    pub fn ensure_capacity(&mut self, min: usize) -> Status {
        if min == 0 {
            return Status::OutOfBounds;
        }
        if self.data.len() < min {
            self.data.resize(min, 0);
        }
        Status::Ok
    }

    /// Advance `payload_start` forward by `n` bytes, reserving `[old, old+n)`
    /// for this layer's header. Used top-down during `reserve_space` to set
    /// aside room for a header not yet written, and again while parsing a
    /// received frame to skip past a header already read.
    pub fn claim_header(&mut self, n: usize) -> Status {
        let new_start = self.payload_start + n;
        if new_start > self.payload_end {
            return Status::TooSmall;
        }
        self.payload_start = new_start;
        Status::Ok
    }

    /// Pull `payload_end` backward by `n` bytes, reserving `[new, old)` for
    /// this layer's trailer. Used top-down during `reserve_space`.
    pub fn claim_trailer(&mut self, n: usize) -> Status {
        if n > self.payload_end || self.payload_end - n < self.payload_start {
            return Status::TooSmall;
        }
        self.payload_end -= n;
        Status::Ok
    }

    /// Release `n` previously-claimed header bytes back to the window,
    /// widening `payload_start` outward. Used during `build_layer` once a
    /// layer is ready to write into the header space it reserved earlier.
    pub fn release_header(&mut self, n: usize) -> Status {
        if n > self.payload_start {
            return Status::OutOfBounds;
        }
        self.payload_start -= n;
        Status::Ok
    }

    /// Release `n` previously-claimed trailer bytes, widening `payload_end`
    /// outward.
    pub fn release_trailer(&mut self, n: usize) -> Status {
        let new_end = self.payload_end + n;
        if new_end > self.data.len() {
            return Status::OutOfBounds;
        }
        self.payload_end = new_end;
        Status::Ok
    }

    /// Read-only view of the full backing storage, for layers that need to
    /// address bytes outside the current window (e.g. writing a header just
    /// behind `payload_start`).
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view of the full backing storage.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The current window, `[payload_start, payload_end)`.
    pub fn window(&self) -> &[u8] {
        &self.data[self.payload_start..self.payload_end]
    }

    /// Mutable current window.
    pub fn window_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.payload_start..self.payload_end]
    }

    /// `payload_end - payload_start`.
    pub fn window_len(&self) -> usize {
        self.payload_end - self.payload_start
    }

    /// The bytes actually written for the frame currently being built:
    /// everything before `payload_start` (header space claimed and then
    /// written via [`release_header`](Buffer::release_header)) plus
    /// everything from `payload_end` onward (a trailer claimed via
    /// [`claim_trailer`](Buffer::claim_trailer) and written in place, never
    /// released back). Used by the engine once a send frame is fully built.
    pub fn framed_bytes(&self) -> Vec<u8> {
        let mut out = self.data[..self.payload_start].to_vec();
        out.extend_from_slice(&self.data[self.payload_end..]);
        out
    }

    /// Debug-only invariant check for I2 (`payload_start <= payload_end <=
    /// data_capacity`), asserted at state-machine boundaries in tests.
    #[cfg(test)]
    pub(crate) fn check_invariant(&self) {
        assert!(self.payload_start <= self.payload_end);
        assert!(self.payload_end <= self.data.len());
    }
}
