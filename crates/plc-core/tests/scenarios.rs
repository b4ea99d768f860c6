//! Integration tests driving the engine state machine end to end with an
//! in-memory socket, covering the boundary scenarios and invariants that
//! motivate the dispatch/retry design.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use plc_core::buffer::Buffer;
use plc_core::engine::{self, EngineState, PlcState, MIN_RETRY_INTERVAL_MS};
use plc_core::layer::Layer;
use plc_core::request::Request;
use plc_core::socket::Socket;
use plc_core::stack::LayerStack;
use plc_core::status::Status;

/// A one-layer dialect that claims a shared 4-byte header and always
/// offers to pack another request, matching the packing example in the
/// boundary scenarios.
struct PackingLayer {
    header_claim: usize,
    buffer_size: usize,
}

impl Layer for PackingLayer {
    fn reserve_space(&mut self, buf: &mut Buffer, _req_id: &mut Option<i64>) -> Status {
        buf.claim_header(self.header_claim)
    }

    fn build_layer(&mut self, _buf: &mut Buffer, _req_id: &mut Option<i64>) -> Status {
        Status::Pending
    }

    fn process_response(&mut self, _buf: &mut Buffer, _req_id: &mut Option<i64>) -> Status {
        Status::Ok
    }

    fn initial_buffer_size(&self) -> usize {
        self.buffer_size
    }
}

fn fixed_payload_request(len: usize) -> Arc<Mutex<Request>> {
    Arc::new(Mutex::new(Request::new(
        move |buf, _id| {
            if buf.window_len() < len {
                return Status::TooSmall;
            }
            buf.window_mut()[..len].fill(0xAB);
            buf.claim_header(len)
        },
        |_buf| Status::Ok,
    )))
}

#[derive(Default)]
struct MockSocket {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Chunks handed back in order, one per `read` call. Once exhausted,
    /// `read` reports the peer as gone so a test can't hang forever on an
    /// unfulfillable read.
    reads: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

#[async_trait]
impl Socket for MockSocket {
    async fn connect(&mut self) -> Status {
        Status::Ok
    }

    async fn write_all(&mut self, buf: &[u8]) -> Status {
        self.writes.lock().unwrap().push(buf.to_vec());
        Status::Ok
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Status> {
        match self.reads.lock().unwrap().pop_front() {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => Err(Status::Retry),
        }
    }

    async fn shutdown(&mut self) {}
}

/// A one-layer dialect whose responses carry a 4-byte big-endian `req_id`
/// per packed request, with no payload — enough to exercise demultiplexing
/// two sub-responses out of a single socket read (boundary scenario 2).
struct DuoIdLayer {
    header_claim: usize,
    next_id: std::sync::atomic::AtomicI64,
}

impl Layer for DuoIdLayer {
    fn reserve_space(&mut self, buf: &mut Buffer, _req_id: &mut Option<i64>) -> Status {
        buf.claim_header(self.header_claim)
    }

    fn build_layer(&mut self, _buf: &mut Buffer, req_id: &mut Option<i64>) -> Status {
        *req_id = Some(self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed));
        Status::Pending
    }

    fn process_response(&mut self, buf: &mut Buffer, req_id: &mut Option<i64>) -> Status {
        if buf.window_len() < 4 {
            return Status::Partial;
        }
        let start = buf.payload_start();
        let id = u32::from_be_bytes(buf.as_slice()[start..start + 4].try_into().unwrap()) as i64;
        *req_id = Some(id);
        if buf.claim_header(4) != Status::Ok {
            return Status::OutOfBounds;
        }
        if buf.window_len() > 0 {
            Status::Pending
        } else {
            Status::Ok
        }
    }

    fn initial_buffer_size(&self) -> usize {
        64
    }
}

/// A one-layer dialect carrying a 4-byte big-endian length prefix ahead of
/// the payload, with no packing — used to exercise a response split across
/// two socket reads (boundary scenario 4).
struct LengthPrefixedLayer;

impl Layer for LengthPrefixedLayer {
    fn reserve_space(&mut self, buf: &mut Buffer, _req_id: &mut Option<i64>) -> Status {
        buf.claim_header(4)
    }

    fn build_layer(&mut self, _buf: &mut Buffer, req_id: &mut Option<i64>) -> Status {
        *req_id = Some(1);
        Status::Ok
    }

    fn process_response(&mut self, buf: &mut Buffer, req_id: &mut Option<i64>) -> Status {
        if buf.window_len() < 4 {
            return Status::Partial;
        }
        let start = buf.payload_start();
        let len = u32::from_be_bytes(buf.as_slice()[start..start + 4].try_into().unwrap()) as usize;
        if buf.window_len() < 4 + len {
            return Status::Partial;
        }
        *req_id = Some(1);
        if buf.claim_header(4) != Status::Ok {
            return Status::OutOfBounds;
        }
        let new_end = buf.payload_start() + len;
        buf.set_span(buf.payload_start(), new_end)
    }

    fn initial_buffer_size(&self) -> usize {
        64
    }
}

#[tokio::test]
async fn two_requests_are_packed_into_one_frame() {
    let writes = Arc::new(Mutex::new(Vec::new()));
    let writes_for_socket = writes.clone();

    let stack = LayerStack::new(vec![Box::new(PackingLayer {
        header_claim: 4,
        buffer_size: 64,
    })]);
    let mut state = PlcState::new(
        stack,
        5000,
        Box::new(move || {
            Box::new(MockSocket {
                writes: writes_for_socket.clone(),
                ..Default::default()
            }) as Box<dyn Socket>
        }),
    );

    state.queue.start(fixed_payload_request(10));
    state.queue.start(fixed_payload_request(10));

    engine::step(&mut state).await;

    let writes = writes.lock().unwrap();
    assert_eq!(writes.len(), 1, "expected exactly one frame written");
    assert_eq!(writes[0].len(), 4 + 10 + 10);
}

#[tokio::test]
async fn too_small_first_request_is_fatal_and_issues_no_write() {
    let writes = Arc::new(Mutex::new(Vec::new()));
    let writes_for_socket = writes.clone();

    let stack = LayerStack::new(vec![Box::new(PackingLayer {
        header_claim: 4,
        buffer_size: 20,
    })]);
    let mut state = PlcState::new(
        stack,
        5000,
        Box::new(move || {
            Box::new(MockSocket {
                writes: writes_for_socket.clone(),
                ..Default::default()
            }) as Box<dyn Socket>
        }),
    );

    state.queue.start(fixed_payload_request(40));

    engine::step(&mut state).await;

    assert!(writes.lock().unwrap().is_empty());
    assert_eq!(state.engine, EngineState::Retrying);
    assert_eq!(
        state.retry_interval(),
        Duration::from_millis(MIN_RETRY_INTERVAL_MS * 2)
    );
}

#[tokio::test]
async fn start_request_rejects_a_request_already_queued() {
    let stack = LayerStack::new(vec![Box::new(PackingLayer {
        header_claim: 4,
        buffer_size: 64,
    })]);
    let mut state = PlcState::new(stack, 5000, Box::new(|| Box::new(MockSocket::default())));

    let req = fixed_payload_request(10);
    assert_eq!(state.queue.start(req.clone()), Status::Ok);
    assert_eq!(state.queue.start(req), Status::Busy);
    assert_eq!(state.queue.len(), 1);
}

/// Boundary scenario 2's receive side (spec.md §8): two packed requests'
/// responses arrive concatenated in a single socket read, and each is
/// demultiplexed to the right queue entry in order.
#[tokio::test]
async fn two_responses_from_one_read_are_demultiplexed_in_order() {
    let writes = Arc::new(Mutex::new(Vec::new()));
    let writes_for_socket = writes.clone();
    let reads = Arc::new(Mutex::new(VecDeque::new()));
    // One read delivering both 4-byte "id1 | id2" sub-responses at once.
    reads
        .lock()
        .unwrap()
        .push_back([0u8, 0, 0, 1, 0, 0, 0, 2].to_vec());
    let reads_for_socket = reads.clone();

    let stack = LayerStack::new(vec![Box::new(DuoIdLayer {
        header_claim: 4,
        next_id: std::sync::atomic::AtomicI64::new(1),
    })]);
    let mut state = PlcState::new(
        stack,
        5000,
        Box::new(move || {
            Box::new(MockSocket {
                writes: writes_for_socket.clone(),
                reads: reads_for_socket.clone(),
            }) as Box<dyn Socket>
        }),
    );

    let order = Arc::new(Mutex::new(Vec::new()));
    let order_a = order.clone();
    let order_b = order.clone();
    state.queue.start(Arc::new(Mutex::new(Request::new(
        |_buf, _id| Status::Ok,
        move |_buf| {
            order_a.lock().unwrap().push("a");
            Status::Ok
        },
    ))));
    state.queue.start(Arc::new(Mutex::new(Request::new(
        |_buf, _id| Status::Ok,
        move |_buf| {
            order_b.lock().unwrap().push("b");
            Status::Ok
        },
    ))));

    // `step` drives connect (no handshake needed by this dialect), pack,
    // send and receive in one internal loop since each phase makes forward
    // progress without yielding to the scheduler.
    engine::step(&mut state).await;

    assert_eq!(writes.lock().unwrap().len(), 1, "both requests packed into one frame");
    assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    assert!(state.queue.is_empty());
    assert_eq!(state.engine, EngineState::Idle);
}

/// Boundary scenario 4 (spec.md §8): a response whose header arrives in one
/// socket read and whose remainder arrives in a second is still parsed as
/// exactly one complete response.
#[tokio::test]
async fn response_split_across_two_reads_yields_one_process_call() {
    let writes = Arc::new(Mutex::new(Vec::new()));
    let writes_for_socket = writes.clone();
    let reads = Arc::new(Mutex::new(VecDeque::new()));
    // Length prefix (4) split mid-header, then the rest of the header plus
    // the 4-byte payload in a second chunk.
    reads.lock().unwrap().push_back(vec![0, 0]);
    reads.lock().unwrap().push_back(vec![0, 4, b'D', b'A', b'T', b'A']);
    let reads_for_socket = reads.clone();

    let stack = LayerStack::new(vec![Box::new(LengthPrefixedLayer)]);
    let mut state = PlcState::new(
        stack,
        5000,
        Box::new(move || {
            Box::new(MockSocket {
                writes: writes_for_socket.clone(),
                reads: reads_for_socket.clone(),
            }) as Box<dyn Socket>
        }),
    );

    let calls = Arc::new(Mutex::new(0usize));
    let calls_for_req = calls.clone();
    state.queue.start(Arc::new(Mutex::new(Request::new(
        |buf, _id| buf.claim_header(4),
        move |_buf| {
            *calls_for_req.lock().unwrap() += 1;
            Status::Ok
        },
    ))));

    engine::step(&mut state).await;

    assert_eq!(*calls.lock().unwrap(), 1);
    assert_eq!(state.engine, EngineState::Idle);
}
