//! The scheduler: a single-threaded, cooperative poll loop over a graph of channels.
//!
//! [`Context`] is a cheap, cloneable handle (an [`Rc`] around the real state) that stands in for
//! the opaque `PitcherContext` of the library this runtime is modeled on. Every public operation
//! — registering a channel, wiring a connection, running the loop — goes through it; there is no
//! process-global state anywhere else in the crate.
//!
//! [`Context::run`] repeats a fixed sequence of phases until every channel has ended:
//!
//! 1. **Reconfigure** — finalize channels that ended on the previous tick (cleanup, removal from
//!    the connection table).
//! 2. **Readiness** — poll each started channel's adapter for whether it has work to do.
//! 3. **Select** — block in `poll(2)` on the file descriptors of channels that have one, so a
//!    tick doesn't busy-loop waiting on hardware.
//! 4. **Route** — move buffers from each source channel's output queue into its destination's
//!    input queue, honoring the connection's frame-skip ratio.
//! 5. **Execute** — call `run` on every channel that is ready, feeding it its next input buffer.
//! 6. **Reap** — note which channels' readiness check reported end-of-stream, for Reconfigure to
//!    finalize next tick.
//! 7. **Termination test** — stop when every channel has reached `Ended`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use log::{debug, info, warn};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::buffer::Buffer;
use crate::channel::{Channel, ChannelAdapter, ChannelState, Readiness};
use crate::connection::ConnectionTable;
use crate::error::{ChannelId, Error, Result};

/// Upper bound on the number of simultaneously registered channels, matching the dense
/// `[0, MAX_NODES)` id space the original scheduler's fixed-size tables assumed.
pub const MAX_CHANNELS: usize = 64;

/// How long [`Context::run`]'s Select phase blocks in `poll(2)` when at least one channel has a
/// file descriptor but none of the fd-less channels report themselves ready.
const SELECT_TIMEOUT: Duration = Duration::from_millis(100);

struct Inner {
    channels: Vec<Option<Channel>>,
    connections: ConnectionTable,
    ending: Vec<ChannelId>,
    /// Set by Execute when a channel's `run` fails having produced zero frames. Checked once per
    /// tick by `run`, which force-ends every remaining channel and returns this error.
    force_exit: Option<Error>,
    /// Incremented on every buffer allocation, decremented when a buffer is actually freed
    /// (the last handle to it dropped). A standalone `Cell` rather than a plain field of `Inner`
    /// so buffers can decrement it from their own `Drop` impl without re-entering `Inner`'s
    /// `RefCell` borrow.
    memory_counter: Rc<Cell<i64>>,
}

/// A handle to the pitcher runtime's scheduler and channel table.
///
/// Clones are cheap and share the same underlying state; this mirrors the original API's
/// `PitcherContext` being freely passed around by value.
#[derive(Clone)]
pub struct Context(Rc<RefCell<Inner>>);

impl Context {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Inner {
            channels: (0..MAX_CHANNELS).map(|_| None).collect(),
            connections: ConnectionTable::new(),
            ending: Vec::new(),
            force_exit: None,
            memory_counter: Rc::new(Cell::new(0)),
        })))
    }

    /// `pitcher_register_chn`: allocates the adapter's buffers and adds it to the channel table.
    pub fn register_chn(
        &self,
        name: impl Into<String>,
        adapter: Box<dyn ChannelAdapter>,
    ) -> Result<ChannelId> {
        let name = name.into();
        if name.len() > crate::channel::MAX_NAME_LEN {
            return Err(Error::NameTooLong(name));
        }

        let mut inner = self.0.borrow_mut();
        let slot = inner
            .channels
            .iter()
            .position(|c| c.is_none())
            .ok_or(Error::TableFull(MAX_CHANNELS))?;
        let id = ChannelId(slot as u32);
        let memory_counter = inner.memory_counter.clone();
        let channel = Channel::register(id, name, adapter, memory_counter)?;
        inner.channels[slot] = Some(channel);
        Ok(id)
    }

    /// The number of buffers currently allocated but not yet freed. Zero once every channel has
    /// been unregistered and every buffer it ever allocated has been dropped.
    pub fn memory_counter(&self) -> i64 {
        self.0.borrow().memory_counter.get()
    }

    /// `pitcher_unregister_chn`.
    pub fn unregister_chn(&self, id: ChannelId) -> Result<()> {
        let mut inner = self.0.borrow_mut();
        let mut channel = inner
            .channels
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(Error::NoSuchChannel(id))?;
        channel.stop();
        channel.cleanup();
        inner.connections.disconnect_dst(id);
        inner.connections.disconnect_src(id);
        debug!("unregistered channel {}", id);
        Ok(())
    }

    fn with_channel<T>(&self, id: ChannelId, f: impl FnOnce(&mut Channel) -> T) -> Result<T> {
        let mut inner = self.0.borrow_mut();
        let channel = inner
            .channels
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(Error::NoSuchChannel(id))?;
        Ok(f(channel))
    }

    /// `pitcher_connect`.
    pub fn connect(&self, src: ChannelId, dst: ChannelId) -> Result<()> {
        self.ensure_exists(src)?;
        self.ensure_exists(dst)?;
        let mut inner = self.0.borrow_mut();
        inner.connections.connect(src, dst)?;
        drop(inner);
        self.with_channel(dst, |c| c.set_source(Some(src)))?;
        Ok(())
    }

    /// `pitcher_disconnect`.
    pub fn disconnect(&self, src: ChannelId, dst: ChannelId) -> Result<()> {
        self.0.borrow_mut().connections.disconnect(src, dst);
        self.with_channel(dst, |c| c.set_source(None)).ok();
        Ok(())
    }

    /// `pitcher_get_source`.
    pub fn get_source(&self, chn: ChannelId) -> Option<ChannelId> {
        self.with_channel(chn, |c| c.source()).ok().flatten()
    }

    /// `pitcher_set_skip`: configures a connection to forward only `numerator` out of every
    /// `denominator` buffers presented by `src`.
    pub fn set_skip(&self, src: ChannelId, dst: ChannelId, numerator: u32, denominator: u32) -> Result<()> {
        self.0
            .borrow_mut()
            .connections
            .set_skip(src, dst, numerator, denominator)
    }

    fn ensure_exists(&self, id: ChannelId) -> Result<()> {
        let inner = self.0.borrow();
        if inner.channels.get(id.index()).and_then(Option::as_ref).is_none() {
            return Err(Error::NoSuchChannel(id));
        }
        Ok(())
    }

    /// `pitcher_start_chn`.
    pub fn start_chn(&self, id: ChannelId) -> Result<()> {
        self.with_channel(id, |c| c.start())?
    }

    /// `pitcher_stop_chn`.
    pub fn stop_chn(&self, id: ChannelId) -> Result<()> {
        self.with_channel(id, |c| c.stop())
    }

    /// `pitcher_get_status`.
    pub fn is_ended(&self, id: ChannelId) -> Result<bool> {
        self.with_channel(id, |c| c.state() == ChannelState::Ended)
    }

    /// Returns the capability the channel's adapter provides.
    pub fn capability(&self, id: ChannelId) -> Result<crate::channel::Capability> {
        self.with_channel(id, Channel::capability)
    }

    /// `pitcher_poll_idle_buffer`.
    pub fn poll_idle_buffer(&self, id: ChannelId) -> Result<bool> {
        self.with_channel(id, |c| c.poll_idle_buffer())
    }

    /// `pitcher_get_idle_buffer`.
    pub fn get_idle_buffer(&self, id: ChannelId) -> Result<Option<Buffer>> {
        self.with_channel(id, |c| c.get_idle_buffer())
    }

    /// `pitcher_put_buffer_idle`.
    pub fn put_buffer_idle(&self, id: ChannelId, buffer: Buffer) -> Result<()> {
        self.with_channel(id, |c| c.put_buffer_idle(buffer))
    }

    /// `pitcher_push_back_output`.
    pub fn push_back_output(&self, id: ChannelId, buffer: Buffer) -> Result<()> {
        self.with_channel(id, |c| c.push_output(buffer))
    }

    /// `pitcher_chn_poll_input`.
    pub fn chn_poll_input(&self, id: ChannelId) -> Result<bool> {
        self.with_channel(id, |c| c.poll_input())
    }

    /// `pitcher_put_buffer`: releases a reference. On the zero transition, dispatches the owning
    /// channel's recycle contract and either drops the buffer or returns it to the idle pool.
    pub fn put_buffer(&self, buffer: Buffer) {
        if buffer.strong_count() > 1 {
            // Another handle is still outstanding; just let ours go.
            return;
        }
        let owner = buffer.owner();
        let mut inner = self.0.borrow_mut();
        let Some(channel) = inner.channels.get_mut(owner.index()).and_then(Option::as_mut) else {
            // Owning channel was already unregistered; let the buffer drop normally.
            return;
        };
        let keep = channel.recycle(&buffer);
        if keep {
            buffer.reset_for_reuse();
            channel.put_buffer_idle(buffer);
        }
    }

    /// `pitcher_start`: starts every registered channel.
    pub fn start(&self) -> Result<()> {
        let ids: Vec<ChannelId> = self.channel_ids();
        for id in ids {
            self.start_chn(id)?;
        }
        Ok(())
    }

    /// `pitcher_stop`: stops every channel.
    pub fn stop(&self) -> Result<()> {
        for id in self.channel_ids() {
            self.with_channel(id, |c| c.stop())?;
        }
        Ok(())
    }

    fn channel_ids(&self) -> Vec<ChannelId> {
        self.0
            .borrow()
            .channels
            .iter()
            .filter_map(|c| c.as_ref().map(Channel::id))
            .collect()
    }

    /// `pitcher_run`: drives the scheduler loop until every channel has ended.
    pub fn run(&self) -> Result<()> {
        loop {
            self.reconfigure();
            if self.all_ended() {
                info!("all channels ended, stopping run loop");
                return Ok(());
            }
            let readiness = self.readiness();
            self.select(&readiness);
            self.route();
            self.execute(&readiness)?;
            self.reap(&readiness);

            if let Some(err) = self.0.borrow_mut().force_exit.take() {
                warn!("force-exiting run loop: {err}");
                for id in self.channel_ids() {
                    self.with_channel(id, |c| c.stop()).ok();
                }
                return Err(err);
            }
        }
    }

    /// Phase 1: finalize channels flagged as ended on the previous tick.
    fn reconfigure(&self) {
        let ending = std::mem::take(&mut self.0.borrow_mut().ending);
        for id in ending {
            if let Ok(Some(())) = self.with_channel(id, |c| {
                if c.state() == ChannelState::Started {
                    c.stop();
                    Some(())
                } else {
                    None
                }
            }) {
                debug!("channel {} reached end of stream", id);
            }
        }
    }

    fn all_ended(&self) -> bool {
        let inner = self.0.borrow();
        let mut any = false;
        for c in inner.channels.iter().flatten() {
            any = true;
            if c.state() != ChannelState::Ended {
                return false;
            }
        }
        any
    }

    /// Phase 2: poll every started, enabled channel's adapter for readiness.
    ///
    /// A channel whose upstream source has ended without ever emitting `LAST` does not get to
    /// wait forever: once its source is `Ended` and its input queue has drained, it is reported
    /// as `End` directly, without consulting its adapter. This is the synthetic end-of-stream
    /// propagation spec'd for the case a source ends silently.
    fn readiness(&self) -> Vec<(ChannelId, Readiness)> {
        let mut inner = self.0.borrow_mut();

        let candidates: Vec<(ChannelId, Option<ChannelId>)> = inner
            .channels
            .iter()
            .flatten()
            .filter(|c| c.state() == ChannelState::Started && c.is_enabled())
            .map(|c| (c.id(), c.source()))
            .collect();

        candidates
            .into_iter()
            .map(|(id, source)| {
                let upstream_ended = source.is_some_and(|src| {
                    inner.channels[src.index()]
                        .as_ref()
                        .map(|c| c.state() == ChannelState::Ended)
                        .unwrap_or(true)
                });
                let channel = inner.channels[id.index()].as_mut().unwrap();
                if upstream_ended && !channel.poll_input() {
                    (id, Readiness::End)
                } else {
                    (id, channel.check_ready())
                }
            })
            .collect()
    }

    /// Phase 3: block in `poll(2)` on fd-backed channels so the loop doesn't spin.
    fn select(&self, readiness: &[(ChannelId, Readiness)]) {
        let have_fd_channel = {
            let inner = self.0.borrow();
            readiness.iter().any(|(id, _)| {
                inner.channels[id.index()]
                    .as_ref()
                    .and_then(Channel::poll_fd)
                    .is_some()
            })
        };
        if !have_fd_channel {
            return;
        }
        let any_fdless_ready = readiness.iter().any(|(id, r)| {
            *r == Readiness::Ready
                && self
                    .0
                    .borrow()
                    .channels
                    .get(id.index())
                    .and_then(Option::as_ref)
                    .and_then(Channel::poll_fd)
                    .is_none()
        });
        if any_fdless_ready {
            return;
        }

        let inner = self.0.borrow();
        let fds: Vec<PollFd<'_>> = readiness
            .iter()
            .filter_map(|(id, _)| inner.channels[id.index()].as_ref())
            .filter_map(|c| c.poll_fd())
            .map(|fd| {
                // Safety: the fd stays open for the lifetime of this borrow; adapters keep their
                // file descriptors alive for as long as the channel is registered.
                let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
                PollFd::new(borrowed, PollFlags::POLLIN | PollFlags::POLLOUT)
            })
            .collect();
        drop(inner);
        if fds.is_empty() {
            return;
        }
        let mut fds = fds;
        let timeout_ms = SELECT_TIMEOUT.as_millis().min(u16::MAX as u128) as u16;
        if let Err(e) = poll(&mut fds, PollTimeout::from(timeout_ms)) {
            warn!("poll failed: {e}");
        }
    }

    /// Phase 4: move at most one buffer from each source's output queue to its destination's
    /// input queue, per edge, per pass. One `src` may fan out to several `dst`s; draining the
    /// whole output queue into the first edge visited would starve the rest.
    fn route(&self) {
        let edges: Vec<(ChannelId, ChannelId)> = self.0.borrow().connections.edges().collect();
        for (src, dst) in edges {
            if let Some(buffer) = self.with_channel(src, Channel::pop_output).ok().flatten() {
                let admitted = self.0.borrow_mut().connections.admit(src, dst);
                if admitted {
                    self.with_channel(dst, |c| c.push_input(buffer.get())).ok();
                }
                self.put_buffer(buffer);
            }
        }
    }

    /// Phase 5: run every ready channel once, feeding it its next queued input if it has one.
    ///
    /// A channel whose `run` errors is stopped on the spot rather than aborting the whole graph;
    /// if it had produced zero frames before failing (a stuck head-of-pipeline), the run loop is
    /// forced to terminate with that error once this tick finishes.
    fn execute(&self, readiness: &[(ChannelId, Readiness)]) -> Result<()> {
        for (id, state) in readiness {
            if *state != Readiness::Ready {
                continue;
            }
            let input = self.with_channel(*id, Channel::pop_input)?;
            let has_source = self.with_channel(*id, Channel::source)?.is_some();
            if has_source && input.is_none() {
                // Waiting on upstream; nothing to do this tick.
                continue;
            }
            let result = self.with_channel(*id, |c| c.run(input.as_ref()))?;
            if let Some(buffer) = input {
                self.put_buffer(buffer);
            }
            if let Err(e) = result {
                let frames = self.with_channel(*id, Channel::frame_count)?;
                warn!("channel {} run failed after {} frames: {e}", id, frames);
                self.with_channel(*id, |c| c.stop())?;
                if frames == 0 {
                    let mut inner = self.0.borrow_mut();
                    if inner.force_exit.is_none() {
                        inner.force_exit = Some(Error::Adapter(*id, Box::new(e)));
                    }
                }
            }
        }
        Ok(())
    }

    /// Phase 6: remember which channels reported end-of-stream, for Reconfigure to finalize.
    fn reap(&self, readiness: &[(ChannelId, Readiness)]) {
        let mut inner = self.0.borrow_mut();
        for (id, state) in readiness {
            if *state == Readiness::End {
                inner.ending.push(*id);
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::convert::Yuv420ToNv12;
    use crate::adapter::file::{FileReader, FileWriter};
    use crate::channel::RunContext;
    use crate::v4l2::Pixelformat;
    use std::io::{Read, Write};

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("pitcher-ctx-test-{}-{}.raw", std::process::id(), name))
    }

    fn write_frames(path: &std::path::Path, frame_size: usize, count: usize, seed: u8) {
        let mut f = std::fs::File::create(path).unwrap();
        for i in 0..count {
            let byte = seed.wrapping_add(i as u8);
            f.write_all(&vec![byte; frame_size]).unwrap();
        }
    }

    #[test]
    fn straight_copy_is_byte_identical() {
        let src = temp_path("copy-src");
        let dst = temp_path("copy-dst");
        let frame_size = 16;
        write_frames(&src, frame_size, 3, 7);

        let ctx = Context::new();
        let reader = FileReader::open(&src, Pixelformat::YUYV, 4, 2).unwrap();
        let writer = FileWriter::create(&dst).unwrap();

        let r = ctx.register_chn("reader", Box::new(reader)).unwrap();
        let w = ctx.register_chn("writer", Box::new(writer)).unwrap();
        ctx.connect(r, w).unwrap();
        ctx.start().unwrap();
        ctx.run().unwrap();

        let mut expected = Vec::new();
        std::fs::File::open(&src).unwrap().read_to_end(&mut expected).unwrap();
        let mut actual = Vec::new();
        std::fs::File::open(&dst).unwrap().read_to_end(&mut actual).unwrap();
        assert_eq!(actual, expected);

        std::fs::remove_file(&src).ok();
        std::fs::remove_file(&dst).ok();
    }

    #[test]
    fn memory_counter_returns_to_zero_after_teardown() {
        let src = temp_path("mem-src");
        let dst = temp_path("mem-dst");
        let frame_size = 16;
        write_frames(&src, frame_size, 3, 1);

        let ctx = Context::new();
        let reader = FileReader::open(&src, Pixelformat::YUYV, 4, 2).unwrap();
        let writer = FileWriter::create(&dst).unwrap();

        let r = ctx.register_chn("reader", Box::new(reader)).unwrap();
        let w = ctx.register_chn("writer", Box::new(writer)).unwrap();
        assert!(ctx.memory_counter() > 0);

        ctx.connect(r, w).unwrap();
        ctx.start().unwrap();
        ctx.run().unwrap();
        assert!(ctx.memory_counter() > 0);

        ctx.unregister_chn(r).unwrap();
        ctx.unregister_chn(w).unwrap();
        assert_eq!(ctx.memory_counter(), 0);

        std::fs::remove_file(&src).ok();
        std::fs::remove_file(&dst).ok();
    }

    #[test]
    fn looping_reader_repeats_the_file() {
        let src = temp_path("loop-src");
        let dst = temp_path("loop-dst");
        let frame_size = 8;
        write_frames(&src, frame_size, 10, 1);

        let ctx = Context::new();
        let reader = FileReader::open(&src, Pixelformat::YUYV, 4, 1)
            .unwrap()
            .with_loop(true)
            .with_frame_limit(30);
        let writer = FileWriter::create(&dst).unwrap();

        let r = ctx.register_chn("reader", Box::new(reader)).unwrap();
        let w = ctx.register_chn("writer", Box::new(writer)).unwrap();
        ctx.connect(r, w).unwrap();
        ctx.start().unwrap();
        ctx.run().unwrap();

        let meta = std::fs::metadata(&dst).unwrap();
        assert_eq!(meta.len() as usize, frame_size * 30);

        std::fs::remove_file(&src).ok();
        std::fs::remove_file(&dst).ok();
    }

    #[test]
    fn frame_skip_ratio_reduces_sink_frame_count() {
        let src = temp_path("skip-src");
        let dst = temp_path("skip-dst");
        let frame_size = 4;
        write_frames(&src, frame_size, 30, 0);

        let ctx = Context::new();
        let reader = FileReader::open(&src, Pixelformat::YUYV, 2, 1).unwrap();
        let writer = FileWriter::create(&dst).unwrap();

        let r = ctx.register_chn("reader", Box::new(reader)).unwrap();
        let w = ctx.register_chn("writer", Box::new(writer)).unwrap();
        ctx.connect(r, w).unwrap();
        ctx.set_skip(r, w, 1, 3).unwrap();
        ctx.start().unwrap();
        ctx.run().unwrap();

        let meta = std::fs::metadata(&dst).unwrap();
        assert_eq!(meta.len() as usize / frame_size, 10);

        std::fs::remove_file(&src).ok();
        std::fs::remove_file(&dst).ok();
    }

    #[test]
    fn converter_interleaves_chroma_end_to_end() {
        let src = temp_path("conv-src");
        let dst = temp_path("conv-dst");
        let conv = Yuv420ToNv12::new(4, 4);
        let frame_size = 4 * 4 + (4 * 4 / 4) * 2;
        write_frames(&src, frame_size, 2, 5);

        let ctx = Context::new();
        let reader = FileReader::open(&src, Pixelformat::YUV420, 4, 4).unwrap();
        let writer = FileWriter::create(&dst).unwrap();

        let r = ctx.register_chn("reader", Box::new(reader)).unwrap();
        let c = ctx.register_chn("convert", Box::new(conv)).unwrap();
        let w = ctx.register_chn("writer", Box::new(writer)).unwrap();
        ctx.connect(r, c).unwrap();
        ctx.connect(c, w).unwrap();
        ctx.start().unwrap();
        ctx.run().unwrap();

        let meta = std::fs::metadata(&dst).unwrap();
        assert_eq!(meta.len() as usize, frame_size * 2);

        std::fs::remove_file(&src).ok();
        std::fs::remove_file(&dst).ok();
    }

    struct FailingSink;

    impl ChannelAdapter for FailingSink {
        fn capability(&self) -> crate::channel::Capability {
            crate::channel::Capability::FileOut
        }
        fn buffer_count(&self) -> u32 {
            0
        }
        fn alloc_buffer(&mut self, _index: u32) -> Result<Vec<crate::buffer::Plane>> {
            unreachable!()
        }
        fn run(&mut self, _input: Option<&Buffer>, _rt: &mut RunContext<'_>) -> Result<()> {
            Err(Error::Io(std::io::Error::other("sink exploded")))
        }
    }

    #[test]
    fn early_error_in_downstream_ends_both_channels() {
        let src = temp_path("err-src");
        let frame_size = 4;
        write_frames(&src, frame_size, 5, 9);

        let ctx = Context::new();
        let reader = FileReader::open(&src, Pixelformat::YUYV, 2, 1).unwrap();
        let r = ctx.register_chn("reader", Box::new(reader)).unwrap();
        let w = ctx.register_chn("sink", Box::new(FailingSink)).unwrap();
        ctx.connect(r, w).unwrap();
        ctx.start().unwrap();

        let err = ctx.run();
        assert!(err.is_err());
        assert!(ctx.is_ended(w).unwrap());

        std::fs::remove_file(&src).ok();
    }
}
