//! The process-wide table that lets two `get` calls with identical
//! effective attributes share one [`Plc`] (spec §4.6 — component C6).
//!
//! The original C implementation keeps a manual refcount, a destructor
//! callback and a process-wide linked list under one mutex. Rust's
//! `Arc`/`Weak` pair gives the same sharing-with-teardown semantics for
//! free: the map holds only `Weak` handles, so a `Plc` already dropped by
//! every caller simply fails to upgrade and is treated as absent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use tracing::{debug, instrument};

use crate::config::Attribs;
use crate::plc::Plc;
use crate::socket::Socket;
use crate::stack::LayerStack;
use crate::status::Result;

type Table = Mutex<HashMap<String, Weak<Plc>>>;

fn table() -> &'static Table {
    static TABLE: OnceLock<Table> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Look up or create the `Plc` for `dialect` + `attrs`, constructing a
/// fresh one via `build` only on a cache miss (or after the previous
/// instance's last `Arc` was dropped and reaped).
///
/// `build` receives the parsed attributes and returns the layer stack and
/// socket factory a dialect crate assembles for them.
#[instrument(level = "debug", skip(build), fields(key))]
pub fn get<F>(dialect: &str, attrs: &str, build: F) -> Result<Arc<Plc>>
where
    F: FnOnce(&Attribs) -> (LayerStack, Box<dyn Fn() -> Box<dyn Socket> + Send + Sync>),
{
    let parsed = Attribs::parse(attrs)?;
    let key = parsed.registry_key(dialect);
    tracing::Span::current().record("key", tracing::field::display(&key));

    let mut guard = table().lock().expect("registry mutex poisoned");
    if let Some(existing) = guard.get(&key).and_then(Weak::upgrade) {
        debug!("reusing existing plc for key");
        return Ok(existing);
    }

    debug!("no live plc for key, building a fresh one");
    let (stack, new_socket) = build(&parsed);
    let plc = Plc::spawn(stack, parsed.idle_timeout_ms, new_socket);
    guard.insert(key, Arc::downgrade(&plc));
    Ok(plc)
}

/// Number of live entries, including any whose `Plc` has already been
/// dropped but not yet reaped by a subsequent `get`. Exposed for tests.
#[cfg(test)]
pub(crate) fn len() -> usize {
    table().lock().expect("registry mutex poisoned").len()
}

#[cfg(test)]
pub(crate) fn clear() {
    table().lock().expect("registry mutex poisoned").clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;
    use crate::socket::Socket;
    use crate::status::Status;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopLayer;
    impl Layer for NoopLayer {
        fn reserve_space(&mut self, _buf: &mut crate::buffer::Buffer, _req_id: &mut Option<i64>) -> Status {
            Status::Ok
        }
        fn build_layer(&mut self, _buf: &mut crate::buffer::Buffer, _req_id: &mut Option<i64>) -> Status {
            Status::Ok
        }
        fn process_response(&mut self, _buf: &mut crate::buffer::Buffer, _req_id: &mut Option<i64>) -> Status {
            Status::Ok
        }
    }

    struct NeverConnects;
    #[async_trait]
    impl Socket for NeverConnects {
        async fn connect(&mut self) -> Status {
            Status::Retry
        }
        async fn write_all(&mut self, _buf: &[u8]) -> Status {
            Status::Retry
        }
        async fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Status> {
            Err(Status::Retry)
        }
        async fn shutdown(&mut self) {}
    }

    fn build(_attribs: &Attribs) -> (LayerStack, Box<dyn Fn() -> Box<dyn Socket> + Send + Sync>) {
        (
            LayerStack::new(vec![Box::new(NoopLayer)]),
            Box::new(|| Box::new(NeverConnects) as Box<dyn Socket>),
        )
    }

    #[tokio::test]
    async fn identical_attributes_share_one_plc() {
        clear();
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let build_counting = |attribs: &Attribs| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            build(attribs)
        };

        let a = get("echo", "gateway=10.0.0.1:44818", build_counting).unwrap();
        let b = get("echo", "gateway=10.0.0.1:44818", build_counting).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);

        drop(a);
        drop(b);
        clear();
    }

    #[tokio::test]
    async fn different_gateways_get_distinct_plcs() {
        clear();
        let a = get("echo", "gateway=10.0.0.1", build).unwrap();
        let b = get("echo", "gateway=10.0.0.2", build).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        clear();
    }
}
