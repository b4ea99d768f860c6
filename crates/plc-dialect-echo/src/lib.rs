//! A minimal one-layer dialect: an 8-byte header (4-byte big-endian
//! `req_id`, 4-byte big-endian payload length) followed by the payload.
//!
//! It exists to give `plc-core`'s engine and scheduler something concrete
//! to drive end to end in tests — exactly one request per frame, no
//! packing, no handshake — not to model any real PLC wire protocol.

use std::sync::atomic::{AtomicI64, Ordering};

use plc_core::buffer::Buffer;
use plc_core::layer::Layer;
use plc_core::status::Status;

const HEADER_LEN: usize = 8;

/// The sole layer of the echo dialect.
pub struct EchoLayer {
    next_req_id: AtomicI64,
}

impl EchoLayer {
    pub fn new() -> Self {
        EchoLayer {
            next_req_id: AtomicI64::new(1),
        }
    }
}

impl Default for EchoLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for EchoLayer {
    fn reserve_space(&mut self, buf: &mut Buffer, _req_id: &mut Option<i64>) -> Status {
        buf.claim_header(HEADER_LEN)
    }

    /// The request's own build callback has already written its payload
    /// into `[HEADER_LEN, payload_start)` and advanced `payload_start`
    /// past it (via `claim_header`); this only has to fill in the header
    /// this layer reserved at offset zero.
    fn build_layer(&mut self, buf: &mut Buffer, req_id: &mut Option<i64>) -> Status {
        let id = *req_id.get_or_insert_with(|| self.next_req_id.fetch_add(1, Ordering::Relaxed));
        let payload_len = (buf.payload_start() - HEADER_LEN) as u32;

        let slice = buf.as_mut_slice();
        slice[0..4].copy_from_slice(&(id as u32).to_be_bytes());
        slice[4..8].copy_from_slice(&payload_len.to_be_bytes());

        Status::Ok
    }

    fn process_response(&mut self, buf: &mut Buffer, req_id: &mut Option<i64>) -> Status {
        if buf.window_len() < HEADER_LEN {
            return Status::Partial;
        }
        let start = buf.payload_start();
        let header = &buf.as_slice()[start..start + HEADER_LEN];
        let id = u32::from_be_bytes(header[0..4].try_into().unwrap()) as i64;
        let payload_len = u32::from_be_bytes(header[4..8].try_into().unwrap()) as usize;

        if buf.window_len() < HEADER_LEN + payload_len {
            return Status::Partial;
        }

        *req_id = Some(id);
        if buf.claim_header(HEADER_LEN) != Status::Ok {
            return Status::OutOfBounds;
        }
        let new_end = buf.payload_start() + payload_len;
        buf.set_span(buf.payload_start(), new_end)
    }

    fn initial_buffer_size(&self) -> usize {
        512
    }
}
