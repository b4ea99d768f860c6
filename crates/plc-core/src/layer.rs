//! The layer interface each PLC dialect implements (spec §4.1 — component
//! C1).
//!
//! A dialect is a chain of layers — for example a transport envelope
//! carrying a session envelope carrying a routing envelope carrying a
//! command. Every layer implements the same small set of operations; the
//! engine drives them top-down for connect/reserve and bottom-up for
//! build/process, and never inspects a layer's private state.

use crate::buffer::Buffer;
use crate::request::Request;
use crate::status::Status;

/// One envelope in a PLC dialect's layered wire protocol.
///
/// `initialize` must be idempotent (P7): calling it on a freshly
/// constructed layer is observationally equivalent to not calling it.
pub trait Layer: Send {
    /// Reset layer-local state. Idempotent.
    fn initialize(&mut self) -> Status {
        Status::Ok
    }

    /// Write this layer's connect payload, if any, into the buffer's
    /// current window, narrowing the window with `set_span` to exactly the
    /// bytes that should go on the wire. Return `Ok` if this layer needs no
    /// handshake and the engine should proceed to the next layer down;
    /// `Pending` if this layer wants to emit a handshake frame this round.
    fn connect(&mut self, _buf: &mut Buffer) -> Status {
        Status::Ok
    }

    /// Symmetric to [`connect`](Layer::connect).
    fn disconnect(&mut self, _buf: &mut Buffer) -> Status {
        Status::Ok
    }

    /// Called top-down before a request is built: narrow the buffer window
    /// to carve out this layer's header and trailer, and thread a `req_id`
    /// through for outer layers to correlate responses by.
    fn reserve_space(&mut self, buf: &mut Buffer, req_id: &mut Option<i64>) -> Status;

    /// Called bottom-up after the request payload is in place: fill in the
    /// header/trailer bytes this layer previously reserved. Return `Ok`
    /// when the layer is willing to send the accumulated frame as-is, or
    /// `Pending` to signal that another request may still be packed into
    /// the remaining space.
    fn build_layer(&mut self, buf: &mut Buffer, req_id: &mut Option<i64>) -> Status;

    /// Called bottom-up on a received frame. On entry the buffer window
    /// bounds the bytes the outer layer considers this layer's; on exit it
    /// must bound the inner layer's payload. May return `Partial` (need
    /// more bytes from the socket), `Retry` (reconnect and retry this
    /// phase), `Pending` (more sub-packets remain in the buffer), `Ok` (one
    /// complete response; `req_id` identifies the matching request), or an
    /// error status.
    fn process_response(&mut self, buf: &mut Buffer, req_id: &mut Option<i64>) -> Status;

    /// Optional veto over whether a specific queued request may be packed
    /// this round. Most layers never override this; it exists so a layer
    /// that understands per-request routing constraints (grounded in
    /// `original_source/src/util/plc.h`'s `accept_requests`/`abort_request`
    /// hooks, which the spec.md distillation does not name but which the
    /// original engine exposes) can reject a request without the engine
    /// needing to know why.
    fn accept(&mut self, _req: &Request) -> bool {
        true
    }

    /// Initial buffer size this layer needs once it is the bottom-most
    /// layer in a stack. Only the bottom layer's value is consulted, by
    /// `Registry::get` when seeding a new PLC's buffer (spec.md §4.6).
    fn initial_buffer_size(&self) -> usize {
        256
    }
}
