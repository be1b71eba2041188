//! The pitcher pipeline runtime: a small, event-driven framework for wiring together media
//! processing units — file readers, V4L2 capture/output devices, pixel-format converters — into
//! a directed graph, moving reference-counted multi-plane buffers between them, and driving the
//! whole thing from a single cooperative poll loop.
//!
//! A [`Context`] owns every registered [`Channel`](channel::Channel) (via
//! [`register_chn`](Context::register_chn)) and the [connections](connection) between them.
//! [`Context::run`] repeats the scheduler's phases — readiness, route, execute, reap — until
//! every channel reaches end of stream. See [`adapter`] for the built-in channel implementations
//! and [`v4l2`] for the underlying device bindings they sit on.

pub mod adapter;
pub mod buffer;
pub mod channel;
pub mod connection;
pub mod context;
pub mod error;
pub mod v4l2;

pub use buffer::{Buffer, BufferFlags, Plane};
pub use channel::{Capability, ChannelAdapter, Readiness, RunContext};
pub use context::Context;
pub use error::{ChannelId, Error, Result};
