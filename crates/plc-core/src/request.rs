//! The FIFO of outstanding tag requests (spec §4.3 — component C3).
//!
//! A [`Request`] pairs a build callback (fills the request's payload into
//! the buffer window the layer stack reserved for it) with a process
//! callback (receives the matching response slice). Requests are looked up
//! by [`RequestHandle`] identity so a request can appear in the queue at
//! most once, matching the invariant in spec.md §3.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::buffer::Buffer;
use crate::status::Status;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque identity for a queued request, independent of its (possibly
/// still-unassigned) wire `req_id`. Used by `stop_request` to find and
/// unlink a specific request regardless of whether it has been sent yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(u64);

impl RequestHandle {
    fn new() -> Self {
        RequestHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

/// One outstanding tag request: an opaque client context plus the
/// build/process callback pair the tag-object layer supplied.
///
/// The build callback writes its payload into the buffer's current window
/// and then calls `Buffer::claim_header` with the number of bytes it wrote,
/// advancing past them so a second request packed into the same frame
/// writes after it. On `Status::TooSmall` it must leave the buffer
/// untouched.
pub struct Request {
    handle: RequestHandle,
    /// The dialect-opaque wire id assigned once this request has been
    /// handed to `build_request` (invariant I5 — becomes `Some` only after
    /// the first successful build pass, and the registry never assigns the
    /// same id to two simultaneously in-flight requests).
    pub req_id: Option<i64>,
    build: Box<dyn FnMut(&mut Buffer, Option<i64>) -> Status + Send>,
    process: Box<dyn FnMut(&mut Buffer) -> Status + Send>,
}

impl Request {
    /// Construct a new, unlinked request from a build/process callback
    /// pair. `build` fills the payload area the layer stack reserved;
    /// `process` is invoked with the buffer window narrowed to this
    /// request's own response slice.
    pub fn new(
        build: impl FnMut(&mut Buffer, Option<i64>) -> Status + Send + 'static,
        process: impl FnMut(&mut Buffer) -> Status + Send + 'static,
    ) -> Self {
        Request {
            handle: RequestHandle::new(),
            req_id: None,
            build: Box::new(build),
            process: Box::new(process),
        }
    }

    pub fn handle(&self) -> RequestHandle {
        self.handle
    }

    pub(crate) fn build_request(&mut self, buf: &mut Buffer) -> Status {
        (self.build)(buf, self.req_id)
    }

    pub(crate) fn process_response(&mut self, buf: &mut Buffer) -> Status {
        (self.process)(buf)
    }
}

/// FIFO queue of outstanding requests. Dispatched strictly in queue order
/// (spec.md O1); the head is always the next build/demux candidate.
#[derive(Default)]
pub struct RequestQueue {
    items: VecDeque<Arc<std::sync::Mutex<Request>>>,
}

impl RequestQueue {
    pub fn new() -> Self {
        RequestQueue {
            items: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Push `request` at the back of the queue. Rejects a request already
    /// linked (by `Arc` pointer identity) with [`Status::Busy`] — P3 relies
    /// on this to guarantee a request appears in the queue at most once.
    pub fn start(&mut self, request: Arc<std::sync::Mutex<Request>>) -> Status {
        if self.contains(&request) {
            return Status::Busy;
        }
        self.items.push_back(request);
        Status::Ok
    }

    /// Unlink the request identified by `handle`, if present. Does nothing
    /// if the request was never queued or has already been dispatched.
    pub fn stop(&mut self, handle: RequestHandle) -> Status {
        let before = self.items.len();
        self.items.retain(|r| r.lock().unwrap().handle() != handle);
        if self.items.len() == before {
            Status::NotFound
        } else {
            Status::Ok
        }
    }

    pub fn front(&self) -> Option<&Arc<std::sync::Mutex<Request>>> {
        self.items.front()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<std::sync::Mutex<Request>>> {
        self.items.get(index)
    }

    /// Remove and return the head of the queue (a response has been fully
    /// dispatched to it).
    pub fn pop_front(&mut self) -> Option<Arc<std::sync::Mutex<Request>>> {
        self.items.pop_front()
    }

    fn contains(&self, request: &Arc<std::sync::Mutex<Request>>) -> bool {
        self.items.iter().any(|r| Arc::ptr_eq(r, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy() -> Arc<std::sync::Mutex<Request>> {
        Arc::new(std::sync::Mutex::new(Request::new(
            |_buf, _id| Status::Ok,
            |_buf| Status::Ok,
        )))
    }

    #[test]
    fn start_rejects_duplicate() {
        let mut q = RequestQueue::new();
        let r = dummy();
        assert_eq!(q.start(r.clone()), Status::Ok);
        assert_eq!(q.start(r.clone()), Status::Busy);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn stop_unlinks() {
        let mut q = RequestQueue::new();
        let r = dummy();
        let handle = r.lock().unwrap().handle();
        q.start(r);
        assert_eq!(q.stop(handle), Status::Ok);
        assert!(q.is_empty());
        assert_eq!(q.stop(handle), Status::NotFound);
    }
}
