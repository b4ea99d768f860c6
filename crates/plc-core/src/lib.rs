//! Per-PLC tag connection engine.
//!
//! This crate implements the dialect-agnostic half of a PLC tag-access
//! library: a layered wire-protocol pipeline ([`layer`], [`stack`]), the
//! connection state machine that drives it ([`engine`]), the per-PLC
//! background task that runs that machine ([`scheduler`], [`plc`]), and the
//! process-wide sharing of one connection across callers ([`registry`]).
//!
//! A concrete protocol is supplied by a separate dialect crate, which
//! implements [`layer::Layer`] for each envelope in its wire format and a
//! [`socket::Socket`] for its transport. This crate never hard-codes any
//! specific PLC family's wire format.

pub mod buffer;
pub mod config;
pub mod engine;
pub mod layer;
pub mod plc;
pub mod registry;
pub mod request;
pub mod scheduler;
pub mod socket;
pub mod stack;
pub mod status;

pub use buffer::Buffer;
pub use config::Attribs;
pub use engine::EngineState;
pub use layer::Layer;
pub use plc::Plc;
pub use request::{Request, RequestHandle};
pub use socket::Socket;
pub use stack::LayerStack;
pub use status::{PlcError, Result, Status};
