//! Channels: named units of work wired together by the [`Context`](crate::context::Context).
//!
//! A channel wraps an [adapter](crate::adapter) — a capability that knows how to produce,
//! consume, or transform buffers — with the bookkeeping every adapter needs regardless of what
//! it does: an idle pool of recycled buffers, an output queue of buffers ready to be routed
//! downstream, and an input queue fed by its upstream connection.

use std::cell::Cell;
use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use log::{debug, trace};

use crate::buffer::Buffer;
use crate::error::{ChannelId, Error, Result};

/// Maximum length of a channel name, matching the `name[64]` field of the unit descriptor this
/// runtime's channel registration is modeled on.
pub const MAX_NAME_LEN: usize = 64;

/// Outcome of an adapter's readiness check.
///
/// Polled once per scheduler tick for every started channel before [`ChannelAdapter::run`] is
/// invoked.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Readiness {
    /// The adapter has no work to do right now; skip it this tick.
    NotReady,
    /// The adapter is ready to run.
    Ready,
    /// The adapter has reached the end of its stream. It will not be polled again; the
    /// scheduler drains its output queue, marks its last emitted buffer, and stops it.
    End,
}

/// Handle an adapter's [`run`](ChannelAdapter::run) method uses to interact with its own
/// channel's idle pool and output queue, without needing a reference to the owning
/// [`Context`](crate::context::Context).
pub struct RunContext<'a> {
    idle: &'a mut VecDeque<Buffer>,
    output: &'a mut VecDeque<Buffer>,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(idle: &'a mut VecDeque<Buffer>, output: &'a mut VecDeque<Buffer>) -> Self {
        Self { idle, output }
    }

    /// Returns whether an idle buffer is currently available, without removing it.
    pub fn poll_idle_buffer(&self) -> bool {
        !self.idle.is_empty()
    }

    /// Removes and returns an idle buffer, if one is available.
    pub fn get_idle_buffer(&mut self) -> Option<Buffer> {
        self.idle.pop_front()
    }

    /// Appends a finished buffer to the channel's output queue, to be picked up by the
    /// scheduler's route phase.
    pub fn push_back_output(&mut self, buffer: Buffer) {
        self.output.push_back(buffer);
    }
}

/// What kind of work a channel's adapter does.
///
/// Call sites that need to tell adapters apart (a CLI wiring up a capture-to-encoder graph, a
/// test asserting the right kind of channel was registered) switch on this instead of downcasting
/// `dyn ChannelAdapter` trait objects.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Capability {
    FileIn,
    FileOut,
    V4l2Capture,
    V4l2Output,
    Convert,
    Control,
}

/// The capability a channel wraps: how to allocate its buffers, how to tell whether it has work
/// to do, and how to do one unit of that work.
///
/// Adapters are single-threaded and own no synchronization; the scheduler in
/// [`Context::run`](crate::context::Context::run) never calls into two adapters concurrently.
pub trait ChannelAdapter {
    /// Which capability this adapter provides.
    fn capability(&self) -> Capability;

    /// Number of buffers this channel should be given at registration time.
    fn buffer_count(&self) -> u32;

    /// Allocates the planes backing buffer `index` (`0..buffer_count()`).
    fn alloc_buffer(&mut self, index: u32) -> Result<Vec<crate::buffer::Plane>>;

    /// Called once after buffer allocation, before the channel can be started.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when the channel transitions from `Registered` to `Started`.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Polled once per scheduler tick to decide whether [`run`](Self::run) should be called.
    fn check_ready(&mut self) -> Readiness {
        Readiness::Ready
    }

    /// Does one unit of work. `input` is the next buffer from the channel's input queue, or
    /// `None` for channels with no source (generators). Output buffers are pushed through `rt`.
    ///
    /// The scheduler releases `input` itself right after this call returns; an adapter that
    /// needs the buffer to outlive `run` (to alias its memory from an output buffer, say) must
    /// take its own reference with [`Buffer::get`] before returning.
    fn run(&mut self, input: Option<&Buffer>, rt: &mut RunContext<'_>) -> Result<()>;

    /// Recycle contract: called exactly once when a buffer's refcount drops to zero. Returning
    /// `true` lets the buffer be dropped (its planes released); returning `false` keeps it
    /// alive and has it pushed back onto the idle pool.
    fn recycle(&mut self, _buffer: &Buffer) -> bool {
        false
    }

    /// Called when the channel transitions from `Started` to `Ended`.
    fn stop(&mut self) {}

    /// Called when the channel is unregistered.
    fn cleanup(&mut self) {}

    /// File descriptor the scheduler should multiplex on for this channel, if any. Channels
    /// without one are polled unconditionally every tick (e.g. file/memory adapters).
    fn poll_fd(&self) -> Option<RawFd> {
        None
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum ChannelState {
    Registered,
    Started,
    Ended,
}

pub(crate) struct Channel {
    id: ChannelId,
    name: String,
    adapter: Box<dyn ChannelAdapter>,
    state: ChannelState,
    enabled: bool,
    idle: VecDeque<Buffer>,
    output: VecDeque<Buffer>,
    input: VecDeque<Buffer>,
    source: Option<ChannelId>,
    frame_count: u64,
}

impl Channel {
    pub(crate) fn register(
        id: ChannelId,
        name: String,
        mut adapter: Box<dyn ChannelAdapter>,
        memory_counter: Rc<Cell<i64>>,
    ) -> Result<Self> {
        let count = adapter.buffer_count();
        let mut idle = VecDeque::with_capacity(count as usize);
        for index in 0..count {
            let planes = adapter
                .alloc_buffer(index)
                .map_err(|_| Error::AllocationFailed(id, index))?;
            idle.push_back(Buffer::new_tracked(id, index, planes, memory_counter.clone()));
        }
        adapter.init()?;
        debug!("registered channel {} {:?} with {} buffers", id, name, count);

        Ok(Self {
            id,
            name,
            adapter,
            state: ChannelState::Registered,
            enabled: true,
            idle,
            output: VecDeque::new(),
            input: VecDeque::new(),
            source: None,
            frame_count: 0,
        })
    }

    pub(crate) fn id(&self) -> ChannelId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> ChannelState {
        self.state
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn source(&self) -> Option<ChannelId> {
        self.source
    }

    pub(crate) fn set_source(&mut self, source: Option<ChannelId>) {
        self.source = source;
    }

    pub(crate) fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub(crate) fn poll_fd(&self) -> Option<RawFd> {
        self.adapter.poll_fd()
    }

    pub(crate) fn capability(&self) -> Capability {
        self.adapter.capability()
    }

    pub(crate) fn start(&mut self) -> Result<()> {
        if self.state != ChannelState::Registered {
            return Err(Error::InvalidState(self.id));
        }
        self.adapter.start()?;
        self.state = ChannelState::Started;
        Ok(())
    }

    pub(crate) fn stop(&mut self) {
        if self.state == ChannelState::Started {
            self.adapter.stop();
        }
        self.state = ChannelState::Ended;
    }

    pub(crate) fn cleanup(&mut self) {
        self.adapter.cleanup();
    }

    pub(crate) fn check_ready(&mut self) -> Readiness {
        self.adapter.check_ready()
    }

    /// `pitcher_chn_poll_input`: whether this channel has a queued input buffer.
    pub(crate) fn poll_input(&self) -> bool {
        !self.input.is_empty()
    }

    pub(crate) fn push_input(&mut self, buffer: Buffer) {
        self.input.push_back(buffer);
    }

    pub(crate) fn pop_input(&mut self) -> Option<Buffer> {
        self.input.pop_front()
    }

    pub(crate) fn run(&mut self, input: Option<&Buffer>) -> Result<()> {
        let mut rt = RunContext::new(&mut self.idle, &mut self.output);
        self.adapter.run(input, &mut rt)?;
        self.frame_count += 1;
        Ok(())
    }

    pub(crate) fn poll_idle_buffer(&self) -> bool {
        !self.idle.is_empty()
    }

    pub(crate) fn get_idle_buffer(&mut self) -> Option<Buffer> {
        self.idle.pop_front()
    }

    pub(crate) fn put_buffer_idle(&mut self, buffer: Buffer) {
        self.idle.push_back(buffer);
    }

    pub(crate) fn push_output(&mut self, buffer: Buffer) {
        self.output.push_back(buffer);
    }

    pub(crate) fn pop_output(&mut self) -> Option<Buffer> {
        self.output.pop_front()
    }

    /// Dispatches the recycle contract for a buffer whose refcount has just reached zero.
    /// Returns `true` if the buffer should be pushed back onto the idle pool, `false` if it
    /// should be dropped.
    pub(crate) fn recycle(&mut self, buffer: &Buffer) -> bool {
        let destroy = self.adapter.recycle(buffer);
        trace!(
            "channel {} recycled buffer {} (destroy = {destroy})",
            self.id,
            buffer.index()
        );
        !destroy
    }
}
