//! The per-PLC background task (spec §4.5 — component C5).
//!
//! Each [`crate::plc::Plc`] owns exactly one `tokio::task`, spawned once and
//! running for the PLC's whole lifetime. Giving every PLC its own task is
//! what satisfies invariant I1 ("at most one state-machine step executes at
//! a time for a given PLC") without any contended locking on the hot path:
//! the `tokio::sync::Mutex` around [`crate::engine::PlcState`] is only ever
//! acquired by this one task plus short-lived calls from
//! `start_request`/`stop_request`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::interval;
use tracing::debug;

use crate::engine::{self, EngineState, PlcState, DESTROY_DISCONNECT_TIMEOUT_MS, HEARTBEAT_INTERVAL_MS};

/// Shared wake-up plumbing between the scheduler task and the handles that
/// queue requests or request shutdown.
pub struct Wakeups {
    pub request_added: Notify,
    pub terminate: Notify,
}

impl Wakeups {
    pub fn new() -> Self {
        Wakeups {
            request_added: Notify::new(),
            terminate: Notify::new(),
        }
    }
}

impl Default for Wakeups {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the scheduler loop for one PLC until `wakeups.terminate` fires.
/// Intended to be handed straight to `tokio::spawn`.
pub async fn run(state: Arc<Mutex<PlcState>>, wakeups: Arc<Wakeups>) {
    let mut heartbeat = interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));

    loop {
        {
            let mut guard = state.lock().await;
            engine::step(&mut guard).await;
        }

        tokio::select! {
            _ = heartbeat.tick() => {}
            _ = wakeups.request_added.notified() => {}
            _ = wakeups.terminate.notified() => {
                debug!("scheduler received terminate signal");
                break;
            }
        }
    }

    // Force a clean disconnect even if termination arrived mid-idle, then
    // drain `step` until the engine settles, all bounded by the teardown
    // deadline so a stuck I/O call can't hold the task open forever
    // (scenario 6: "within 500ms ... fully freed").
    let drain = async {
        loop {
            let mut guard = state.lock().await;
            if !matches!(guard.engine, EngineState::Disconnected | EngineState::Disconnecting) {
                guard.engine = EngineState::Disconnecting;
            }
            engine::step(&mut guard).await;
            let done = guard.engine == EngineState::Disconnected;
            drop(guard);
            if done {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(Duration::from_millis(DESTROY_DISCONNECT_TIMEOUT_MS), drain).await;
}
