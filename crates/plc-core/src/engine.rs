//! The per-PLC connection state machine (spec §4.4 — component C4):
//! dispatch, connect, send/receive and disconnect, plus the retry and idle
//! timing discipline that wraps them.
//!
//! [`PlcState`] owns everything the state machine mutates. It is always
//! accessed through the single `tokio::sync::Mutex` a [`crate::plc::Plc`]
//! holds, so within one lock acquisition the code below may treat itself as
//! the sole writer — there is no separate internal locking here.

use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace, warn};

use crate::buffer::Buffer;
use crate::request::RequestQueue;
use crate::socket::Socket;
use crate::stack::LayerStack;
use crate::status::Status;

/// Lower bound of the exponential backoff applied after a connection error
/// (grounded in `original_source/src/util/plc.c`'s `MIN_RETRY_INTERVAL_MS`).
pub const MIN_RETRY_INTERVAL_MS: u64 = 1000;
/// Upper bound the backoff is clamped to.
pub const MAX_RETRY_INTERVAL_MS: u64 = 16000;
/// Scheduler wake-up cadence while a PLC is idle or mid-phase.
pub const HEARTBEAT_INTERVAL_MS: u64 = 200;
/// Default span of inactivity before a connected-but-unused PLC tears down
/// its socket.
pub const DEFAULT_IDLE_TIMEOUT_MS: u32 = 5000;
/// Upper bound placed on a graceful disconnect during teardown.
pub const DESTROY_DISCONNECT_TIMEOUT_MS: u64 = 500;

/// Coarse phase of the connection state machine. Each variant corresponds
/// to one of the subgraphs in spec.md's component C4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Disconnected,
    Connecting,
    Idle,
    Dispatching,
    Receiving,
    Disconnecting,
    /// Backing off after an error; `retry_interval_ms` has already doubled.
    Retrying,
}

/// Everything the engine mutates across one PLC's lifetime: its layer
/// stack, shared buffer, request queue, current socket (if connected) and
/// retry/idle bookkeeping.
pub struct PlcState {
    pub engine: EngineState,
    pub stack: LayerStack,
    pub buf: Buffer,
    pub queue: RequestQueue,
    socket: Option<Box<dyn Socket>>,
    new_socket: Box<dyn Fn() -> Box<dyn Socket> + Send + Sync>,
    retry_interval_ms: u64,
    idle_timeout_ms: u32,
    last_activity: Instant,
    read_scratch: Vec<u8>,
}

impl PlcState {
    pub fn new(
        stack: LayerStack,
        idle_timeout_ms: u32,
        new_socket: Box<dyn Fn() -> Box<dyn Socket> + Send + Sync>,
    ) -> Self {
        let buf_capacity = stack.initial_buffer_size();
        PlcState {
            engine: EngineState::Disconnected,
            stack,
            buf: Buffer::with_capacity(buf_capacity),
            queue: RequestQueue::new(),
            socket: None,
            new_socket,
            retry_interval_ms: MIN_RETRY_INTERVAL_MS,
            idle_timeout_ms,
            last_activity: Instant::now(),
            read_scratch: vec![0u8; 4096],
        }
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Double the backoff, clamped to `MAX_RETRY_INTERVAL_MS` (I4).
    fn bump_retry_interval(&mut self) {
        self.retry_interval_ms = (self.retry_interval_ms * 2).min(MAX_RETRY_INTERVAL_MS);
    }

    fn reset_retry_interval(&mut self) {
        self.retry_interval_ms = MIN_RETRY_INTERVAL_MS;
    }

    fn idle_deadline_elapsed(&self) -> bool {
        self.idle_timeout_ms > 0
            && self.last_activity.elapsed() >= Duration::from_millis(self.idle_timeout_ms as u64)
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Drive `state` through as many non-blocking transitions as it will take
/// without yielding. The scheduler calls this once per wake-up; it loops
/// internally while progress is being made (mirroring `Status::Pending`'s
/// "tail call" semantics) and returns only when the state machine needs to
/// wait on I/O or on the heartbeat/notify select.
#[instrument(level = "debug", skip(state), fields(engine = ?state.engine))]
pub async fn step(state: &mut PlcState) {
    loop {
        let state_before = state.engine;
        trace!(?state_before, "engine transition");
        match state.engine {
            EngineState::Disconnected => {
                if state.queue.is_empty() {
                    return;
                }
                state.engine = EngineState::Connecting;
            }
            EngineState::Connecting => {
                connect(state).await;
            }
            EngineState::Idle => {
                if !state.queue.is_empty() {
                    state.engine = EngineState::Dispatching;
                } else if state.idle_deadline_elapsed() {
                    debug!("idle timeout elapsed, disconnecting");
                    state.engine = EngineState::Disconnecting;
                } else {
                    return;
                }
            }
            EngineState::Dispatching => {
                dispatch(state).await;
            }
            EngineState::Receiving => {
                receive(state).await;
            }
            EngineState::Disconnecting => {
                disconnect(state).await;
            }
            EngineState::Retrying => {
                if state.last_activity.elapsed() >= state.retry_interval() {
                    state.engine = EngineState::Connecting;
                } else {
                    return;
                }
            }
        }
        if state.engine == state_before {
            // No forward progress was made (e.g. waiting on I/O already
            // issued); yield back to the scheduler's select.
            return;
        }
    }
}

async fn connect(state: &mut PlcState) {
    let mut socket = (state.new_socket)();
    let status = socket.connect().await;
    if status != Status::Ok {
        warn!(?status, "connect failed");
        fail(state, status);
        return;
    }
    state.stack.initialize();

    loop {
        state.buf.reset();
        let cap = state.buf.capacity();
        state.buf.set_span(0, cap);
        let status = state.stack.connect(&mut state.buf);
        match status {
            Status::Ok => break,
            Status::Pending => {
                let window = state.buf.window().to_vec();
                if socket.write_all(&window).await != Status::Ok {
                    fail(state, Status::Retry);
                    return;
                }
                match read_some(&mut *socket, &mut state.buf, &mut state.read_scratch).await {
                    Ok(_) => {
                        let mut req_id = None;
                        state.stack.process_response(&mut state.buf, &mut req_id);
                    }
                    Err(status) => {
                        fail(state, status);
                        return;
                    }
                }
            }
            other => {
                fail(state, other);
                return;
            }
        }
    }

    trace!("connected");
    state.socket = Some(socket);
    state.reset_retry_interval();
    state.touch();
    state.engine = EngineState::Idle;
}

/// Pack as many queued requests as fit into one frame and send it
/// (spec.md's multi-request packing example in the boundary scenarios).
///
/// Contract with a request's build callback: on [`Status::TooSmall`] it
/// must leave the buffer untouched, so the engine can fall back to
/// whatever was already packed without having to roll anything back.
async fn dispatch(state: &mut PlcState) {
    if state.queue.is_empty() {
        state.engine = EngineState::Idle;
        return;
    }

    state.buf.reset();
    let cap = state.buf.capacity();
    state.buf.set_span(0, cap);
    let mut req_id = None;

    if state.stack.reserve_space(&mut state.buf, &mut req_id) != Status::Ok {
        fail(state, Status::TooSmall);
        return;
    }

    let mut packed = 0usize;
    loop {
        let Some(req_arc) = state.queue.get(packed).cloned() else {
            break;
        };

        // Give every layer a chance to veto this request before it is built
        // into the frame (spec.md's `accept_requests`/`abort_request` hook).
        // A veto is not an error: whatever was packed so far is still sent.
        let accepted = {
            let req = req_arc.lock().expect("request mutex poisoned");
            state.stack.accepts(&req)
        };
        if !accepted {
            debug!(packed, "request vetoed by layer stack, stopping packing");
            break;
        }

        let build_status = {
            let mut req = req_arc.lock().expect("request mutex poisoned");
            req.build_request(&mut state.buf)
        };
        if build_status == Status::TooSmall {
            if packed == 0 {
                fail(state, Status::TooSmall);
                return;
            }
            break;
        }
        if !build_status.is_progress() {
            fail(state, build_status);
            return;
        }

        match state.stack.build_layer(&mut state.buf, &mut req_id) {
            Status::Ok => {
                req_arc.lock().expect("request mutex poisoned").req_id = req_id;
                packed += 1;
                break;
            }
            Status::Pending => {
                req_arc.lock().expect("request mutex poisoned").req_id = req_id;
                packed += 1;
                continue;
            }
            Status::TooSmall => {
                if packed == 0 {
                    fail(state, Status::TooSmall);
                    return;
                }
                break;
            }
            other => {
                fail(state, other);
                return;
            }
        }
    }

    if packed == 0 {
        // Everything queued was vetoed; nothing to send this round.
        state.engine = EngineState::Idle;
        return;
    }

    let Some(socket) = state.socket.as_mut() else {
        fail(state, Status::Retry);
        return;
    };
    let frame = state.buf.framed_bytes();
    if socket.write_all(&frame).await != Status::Ok {
        fail(state, Status::Retry);
        return;
    }
    state.touch();
    state.engine = EngineState::Receiving;
}

/// Read and demultiplex responses until the queue head's response is fully
/// parsed. The buffer is reset exactly once, before the first read of this
/// phase — unlike `dispatch`'s frame, which is built fresh, what arrives
/// here is whatever the peer sends, so there is nothing to preserve from
/// the just-sent request.
///
/// `Status::Partial` and `Status::Pending` are deliberately not the same
/// thing (spec.md §4.4): `Partial` means the buffer doesn't yet hold a
/// complete response, so another socket read is needed; `Pending` means a
/// full response was just parsed out of the front of the buffer and more
/// already-received bytes remain behind it, so the next parse pass must
/// run against the existing buffer with no I/O at all.
async fn receive(state: &mut PlcState) {
    state.buf.reset();

    loop {
        let read_result = match state.socket.as_mut() {
            Some(socket) => {
                read_some(&mut **socket, &mut state.buf, &mut state.read_scratch).await
            }
            None => {
                fail(state, Status::Retry);
                return;
            }
        };
        match read_result {
            Ok(_) => {}
            Err(status) => {
                fail(state, status);
                return;
            }
        }

        // Reparse the buffer without further I/O for as long as it keeps
        // yielding already-complete responses.
        loop {
            let mut req_id = None;
            let status = state.stack.process_response(&mut state.buf, &mut req_id);
            match status {
                Status::Partial => break,
                Status::Pending => {
                    dispatch_to_queue_head(state, req_id);
                    continue;
                }
                Status::Ok => {
                    dispatch_to_queue_head(state, req_id);
                    state.touch();
                    state.reset_retry_interval();
                    state.engine = EngineState::Idle;
                    return;
                }
                other => {
                    fail(state, other);
                    return;
                }
            }
        }
    }
}

/// Match a demultiplexed response against the queue head (O1 + the
/// "strict FIFO, drop unmatched" rule). A request that was unlinked via
/// `stop_request` while in flight simply has no queue entry to match; its
/// response is silently discarded.
fn dispatch_to_queue_head(state: &mut PlcState, req_id: Option<i64>) {
    let matches = match state.queue.front() {
        Some(front) => front.lock().expect("request mutex poisoned").req_id == req_id,
        None => false,
    };
    if matches {
        if let Some(req) = state.queue.pop_front() {
            req.lock()
                .expect("request mutex poisoned")
                .process_response(&mut state.buf);
        }
    }
}

/// Drive the (possibly multi-step) disconnect handshake to completion, then
/// close the socket. Any error encountered here goes through [`reset`]
/// rather than [`fail`]: the socket is already on its way down, so there is
/// no graceful disconnect left to attempt before backing off.
async fn disconnect(state: &mut PlcState) {
    let Some(mut socket) = state.socket.take() else {
        state.engine = EngineState::Disconnected;
        return;
    };

    state.buf.reset();
    let cap = state.buf.capacity();
    state.buf.set_span(0, cap);
    loop {
        match state.stack.disconnect(&mut state.buf) {
            Status::Ok => break,
            Status::Pending => {
                let window = state.buf.window().to_vec();
                if socket.write_all(&window).await != Status::Ok {
                    reset(state, Status::Retry);
                    return;
                }
                match read_some(&mut *socket, &mut state.buf, &mut state.read_scratch).await {
                    Ok(_) => {
                        let mut req_id = None;
                        let status = state.stack.process_response(&mut state.buf, &mut req_id);
                        if !status.is_progress() {
                            reset(state, status);
                            return;
                        }
                    }
                    Err(status) => {
                        reset(state, status);
                        return;
                    }
                }
            }
            other => {
                reset(state, other);
                return;
            }
        }
    }

    socket.shutdown().await;
    state.engine = EngineState::Disconnected;
}

/// Disconnect-and-back-off: the wire is suspect, so tear the socket down,
/// double the backoff (I4) and let a fresh `connect` attempt re-run
/// `reserve_space`/`dispatch` once the retry deadline passes.
fn fail(state: &mut PlcState, status: Status) {
    warn!(?status, "connection error, backing off");
    state.socket = None;
    state.bump_retry_interval();
    state.last_activity = Instant::now();
    state.engine = EngineState::Retrying;
}

/// Hard reset: a failure *during* the disconnect handshake itself. The
/// socket is already gone (taken by the caller), so this only has to
/// reinitialize the layer stack (idempotent per P7 — harmless even though
/// `connect` will reinitialize again on the next attempt) and apply the
/// same backoff as `fail` before retrying.
fn reset(state: &mut PlcState, status: Status) {
    warn!(?status, "error during disconnect, resetting");
    state.stack.initialize();
    state.bump_retry_interval();
    state.last_activity = Instant::now();
    state.engine = EngineState::Retrying;
}

/// Read one chunk from `socket` and append it to `buf`'s window, growing
/// the backing storage if needed. Takes disjoint field references rather
/// than `&mut PlcState` so callers can hold a live borrow of
/// `state.socket` (obtained via `Option::as_mut`) across the call.
async fn read_some(
    socket: &mut dyn Socket,
    buf: &mut Buffer,
    scratch: &mut [u8],
) -> Result<usize, Status> {
    let n = socket.read(scratch).await?;
    if n == 0 {
        return Err(Status::Retry);
    }
    let start = buf.payload_end();
    let end = start + n;
    if end > buf.capacity() {
        buf.ensure_capacity(end);
    }
    buf.as_mut_slice()[start..end].copy_from_slice(&scratch[..n]);
    buf.set_span(buf.payload_start(), end);
    Ok(n)
}
