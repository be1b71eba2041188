//! V4L2 memory-to-memory capture and output channels.
//!
//! Grounded on `pitcher_v4l2_capture`/`pitcher_v4l2_output` in the original test harness's
//! `v4l2.c`: format negotiation, `REQBUFS`/`QBUF`/`DQBUF` streaming I/O and `STREAMON`/`STREAMOFF`
//! are all handled by [`crate::v4l2::stream`]; this module is the seam between that binding layer
//! and the channel/buffer abstractions the scheduler understands.
//!
//! A captured frame is copied out of the driver's mmap'd slot into one of this channel's own
//! buffers as soon as it's dequeued, and the driver slot is immediately re-queued by
//! [`crate::v4l2::stream::ReadStream::dequeue`]. This decouples the V4L2 buffer's own cycle (which
//! must keep moving to keep the driver fed) from the refcount of the [`Buffer`] handed downstream,
//! at the cost of one extra copy per frame.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::path::Path;

use log::warn;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::buffer::{Buffer, BufferFlags, Plane};
use crate::channel::{Capability, ChannelAdapter, Readiness, RunContext};
use crate::error::Result;
use crate::v4l2::format::PixFormat;
use crate::v4l2::stream::{ReadStream, WriteStream};
use crate::v4l2::{Device, Pixelformat};

/// Number of buffers requested from the driver, and (for capture) the depth of this channel's
/// own downstream buffer pool.
const DEFAULT_BUFFER_COUNT: u32 = 4;

fn poll_readable(fd: RawFd, flag: PollFlags) -> bool {
    // Safety: `fd` stays open for the duration of this call; it is owned by the stream for as
    // long as the channel is registered.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut fds = [PollFd::new(borrowed, flag)];
    matches!(poll(&mut fds, PollTimeout::from(0u16)), Ok(n) if n > 0)
}

/// A source channel driven by a V4L2 capture device (`VIDEO_CAPTURE`).
pub struct V4l2Capture {
    stream: ReadStream,
    frame_size: usize,
    frame_count: u64,
    frame_limit: Option<u64>,
    ended: bool,
}

impl V4l2Capture {
    pub fn open(path: impl AsRef<Path>, format: Pixelformat, width: u32, height: u32) -> Result<Self> {
        let device = Device::open(path.as_ref()).map_err(io::Error::other)?;
        let video = device
            .video_capture(PixFormat::new(width, height, format))
            .map_err(io::Error::other)?;
        let frame_size = video.format().size_image() as usize;
        let stream = video
            .into_stream(DEFAULT_BUFFER_COUNT)
            .map_err(io::Error::other)?;
        Ok(Self {
            stream,
            frame_size,
            frame_count: 0,
            frame_limit: None,
            ended: false,
        })
    }

    /// Stop after capturing this many frames.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }
}

impl ChannelAdapter for V4l2Capture {
    fn capability(&self) -> Capability {
        Capability::V4l2Capture
    }

    fn buffer_count(&self) -> u32 {
        DEFAULT_BUFFER_COUNT
    }

    fn alloc_buffer(&mut self, _index: u32) -> Result<Vec<Plane>> {
        Ok(vec![Plane::owned(self.frame_size)])
    }

    fn start(&mut self) -> Result<()> {
        self.stream.stream_on().map_err(io::Error::other)?;
        Ok(())
    }

    fn check_ready(&mut self) -> Readiness {
        if self.ended {
            return Readiness::End;
        }
        if poll_readable(self.stream.as_raw_fd(), PollFlags::POLLIN) {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }

    fn run(&mut self, _input: Option<&Buffer>, rt: &mut RunContext<'_>) -> Result<()> {
        let Some(out) = rt.get_idle_buffer() else {
            return Ok(());
        };

        let frame_size = self.frame_size;
        let mut had_error = false;
        self.stream
            .dequeue(|view| {
                let mut plane = out.plane_mut(0);
                let n = view.len().min(frame_size);
                plane.as_mut_slice()[..n].copy_from_slice(&view[..n]);
                plane.set_bytes_used(n);
                had_error = view.is_error();
                Ok(())
            })
            .map_err(io::Error::other)?;

        if had_error {
            out.insert_flags(BufferFlags::ERROR);
        }

        self.frame_count += 1;
        if let Some(limit) = self.frame_limit {
            if self.frame_count >= limit {
                self.ended = true;
            }
        }
        if self.ended {
            out.insert_flags(BufferFlags::LAST);
        }

        rt.push_back_output(out);
        Ok(())
    }

    fn poll_fd(&self) -> Option<RawFd> {
        Some(self.stream.as_raw_fd())
    }
}

/// A sink channel driven by a V4L2 output device (`VIDEO_OUTPUT`), e.g. an encoder's bitstream
/// or a decoder's reconstructed-frame queue.
pub struct V4l2Output {
    stream: WriteStream,
    frame_count: u64,
    ended: bool,
}

impl V4l2Output {
    pub fn open(path: impl AsRef<Path>, format: Pixelformat, width: u32, height: u32) -> Result<Self> {
        let device = Device::open(path.as_ref()).map_err(io::Error::other)?;
        let video = device
            .video_output(PixFormat::new(width, height, format))
            .map_err(io::Error::other)?;
        let stream = video
            .into_stream(DEFAULT_BUFFER_COUNT)
            .map_err(io::Error::other)?;
        Ok(Self {
            stream,
            frame_count: 0,
            ended: false,
        })
    }

    fn reclaim_finished(&mut self) {
        loop {
            match self.stream.dequeue() {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(e) => {
                    warn!("v4l2 output buffer reclaim failed: {e}");
                    break;
                }
            }
        }
    }
}

impl ChannelAdapter for V4l2Output {
    fn capability(&self) -> Capability {
        Capability::V4l2Output
    }

    fn buffer_count(&self) -> u32 {
        0
    }

    fn alloc_buffer(&mut self, _index: u32) -> Result<Vec<Plane>> {
        unreachable!("V4l2Output registers with buffer_count() == 0")
    }

    fn start(&mut self) -> Result<()> {
        self.stream.stream_on().map_err(io::Error::other)?;
        Ok(())
    }

    fn check_ready(&mut self) -> Readiness {
        if self.ended {
            Readiness::End
        } else {
            Readiness::Ready
        }
    }

    fn run(&mut self, input: Option<&Buffer>, _rt: &mut RunContext<'_>) -> Result<()> {
        let Some(input) = input else {
            return Ok(());
        };

        self.reclaim_finished();
        let Some(slot) = self.stream.free_slot() else {
            warn!("v4l2 output queue full, dropping frame");
            return Ok(());
        };

        let plane = input.plane(0);
        let data = &plane.as_slice()[..plane.bytes_used()];
        let keyframe = input.flags().contains(BufferFlags::KEYFRAME);
        self.stream
            .queue(slot, data, keyframe)
            .map_err(io::Error::other)?;
        drop(plane);

        self.frame_count += 1;
        if input.is_last() {
            self.ended = true;
        }
        Ok(())
    }
}
