//! The ordered chain of layers that makes up one PLC dialect (spec §4.2 —
//! component C2).
//!
//! Layer 0 is the top of the stack: the outermost envelope, closest to the
//! request/response API the tag layer sees. The last layer is the bottom:
//! closest to the wire. `reserve_space`, `connect` and `disconnect` are
//! driven top-down (index 0 first); `build_layer` and `process_response`
//! are driven bottom-up (last index first), mirroring the direction data
//! actually flows in each phase.

use crate::buffer::Buffer;
use crate::layer::Layer;
use crate::request::Request;
use crate::status::Status;

/// An ordered, owned chain of [`Layer`] trait objects.
pub struct LayerStack {
    layers: Vec<Box<dyn Layer>>,
}

impl LayerStack {
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Self {
        LayerStack { layers }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The bottom-most layer's preferred initial buffer size, used by the
    /// registry when seeding a freshly constructed PLC (spec.md §4.6).
    pub fn initial_buffer_size(&self) -> usize {
        self.layers
            .last()
            .map(|l| l.initial_buffer_size())
            .unwrap_or(256)
    }

    /// Top-down: reset every layer. Idempotent per layer (P7).
    pub fn initialize(&mut self) -> Status {
        for layer in self.layers.iter_mut() {
            let status = layer.initialize();
            if status != Status::Ok {
                return status;
            }
        }
        Status::Ok
    }

    /// Top-down connect handshake pass. Stops at the first non-`Ok` layer
    /// so the caller can re-drive the same phase once that layer is ready.
    pub fn connect(&mut self, buf: &mut Buffer) -> Status {
        for layer in self.layers.iter_mut() {
            let status = layer.connect(buf);
            if status != Status::Ok {
                return status;
            }
        }
        Status::Ok
    }

    /// Top-down disconnect pass, symmetric to [`connect`](LayerStack::connect).
    pub fn disconnect(&mut self, buf: &mut Buffer) -> Status {
        for layer in self.layers.iter_mut() {
            let status = layer.disconnect(buf);
            if status != Status::Ok {
                return status;
            }
        }
        Status::Ok
    }

    /// Top-down: let every layer narrow the buffer window to reserve its
    /// header/trailer space before a request is built into it.
    pub fn reserve_space(&mut self, buf: &mut Buffer, req_id: &mut Option<i64>) -> Status {
        for layer in self.layers.iter_mut() {
            let status = layer.reserve_space(buf, req_id);
            if status != Status::Ok {
                return status;
            }
        }
        Status::Ok
    }

    /// Bottom-up: let every layer fill in the header/trailer bytes it
    /// reserved, innermost first, so an outer layer can see (and checksum,
    /// length-prefix, etc.) the bytes an inner layer already committed.
    pub fn build_layer(&mut self, buf: &mut Buffer, req_id: &mut Option<i64>) -> Status {
        let mut status = Status::Ok;
        for layer in self.layers.iter_mut().rev() {
            status = layer.build_layer(buf, req_id);
            if !status.is_progress() {
                return status;
            }
        }
        status
    }

    /// Bottom-up: strip framing from a received buffer one layer at a time.
    pub fn process_response(&mut self, buf: &mut Buffer, req_id: &mut Option<i64>) -> Status {
        let mut status = Status::Ok;
        for layer in self.layers.iter_mut().rev() {
            status = layer.process_response(buf, req_id);
            if !status.is_progress() {
                return status;
            }
        }
        status
    }

    /// True if every layer is willing to carry `req`. A layer that never
    /// overrides `accept` always votes yes.
    pub fn accepts(&mut self, req: &Request) -> bool {
        self.layers.iter_mut().all(|l| l.accept(req))
    }
}
