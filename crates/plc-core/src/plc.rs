//! The handle applications hold to one connected PLC.
//!
//! A [`Plc`] bundles the shared, mutex-guarded [`PlcState`] with the
//! [`Wakeups`] the background scheduler task listens on. Construction
//! spawns that task; dropping the last `Arc<Plc>` (observed by the
//! registry, see [`crate::registry`]) signals it to terminate and tears
//! the connection down within a bounded window.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::engine::{PlcState, DESTROY_DISCONNECT_TIMEOUT_MS};
use crate::request::{Request, RequestHandle};
use crate::scheduler::{self, Wakeups};
use crate::socket::Socket;
use crate::stack::LayerStack;
use crate::status::{PlcError, Result, Status};

/// A live connection to one PLC, shared by every tag object that was
/// constructed with the same effective attributes.
pub struct Plc {
    state: Arc<Mutex<PlcState>>,
    wakeups: Arc<Wakeups>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Plc {
    /// Construct a new PLC and spawn its scheduler task. Not normally
    /// called directly by applications — see [`crate::registry::get`].
    pub fn spawn(
        stack: LayerStack,
        idle_timeout_ms: u32,
        new_socket: Box<dyn Fn() -> Box<dyn Socket> + Send + Sync>,
    ) -> Arc<Self> {
        let state = Arc::new(Mutex::new(PlcState::new(stack, idle_timeout_ms, new_socket)));
        let wakeups = Arc::new(Wakeups::new());

        let task = tokio::spawn(scheduler::run(state.clone(), wakeups.clone()));

        Arc::new(Plc {
            state,
            wakeups,
            task: Mutex::new(Some(task)),
        })
    }

    /// Queue `request` for dispatch and wake the scheduler. Returns
    /// [`PlcError::Busy`] if the same request handle is already queued (P3).
    pub async fn start_request(&self, request: Request) -> Result<RequestHandle> {
        let handle = request.handle();
        let shared = Arc::new(std::sync::Mutex::new(request));
        let status = {
            let mut guard = self.state.lock().await;
            guard.queue.start(shared)
        };
        if status == Status::Busy {
            return Err(PlcError::Busy);
        }
        self.wakeups.request_added.notify_one();
        Ok(handle)
    }

    /// Unlink a previously queued request. A response that arrives for it
    /// afterward is silently dropped by the demultiplexer.
    pub async fn stop_request(&self, handle: RequestHandle) -> Result<()> {
        let mut guard = self.state.lock().await;
        match guard.queue.stop(handle) {
            Status::Ok => Ok(()),
            _ => Err(PlcError::NotFound(format!("{handle:?}"))),
        }
    }

    /// Signal the scheduler to stop and wait (bounded) for a graceful
    /// disconnect. Callers that can `.await` should prefer this over
    /// relying on `Drop`, since it observes the scheduler task actually
    /// finishing rather than just firing the signal (scenario 6).
    pub async fn shutdown(&self) {
        self.wakeups.terminate.notify_one();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(
                std::time::Duration::from_millis(DESTROY_DISCONNECT_TIMEOUT_MS),
                handle,
            )
            .await;
        }
    }
}

impl Drop for Plc {
    /// The last strong reference dropping (sync context, can't `.await`)
    /// still has to unblock the scheduler so it can run its own bounded
    /// disconnect — see `scheduler::run`'s handling of `terminate`, which
    /// is what actually enforces `DESTROY_DISCONNECT_TIMEOUT_MS`.
    fn drop(&mut self) {
        self.wakeups.terminate.notify_one();
    }
}
