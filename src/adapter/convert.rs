//! Planar YUV 4:2:0 format conversion.
//!
//! The original test harness does this kind of reformatting with a dedicated `cvrt` node
//! (`init_convert_node` et al.) sitting between two V4L2 channels or between a file channel and
//! a V4L2 channel whenever their negotiated pixel formats don't match. This adapter covers the
//! one conversion the harness actually needs in that role: planar 4:2:0 (`I420`/`YUV420`) to
//! semi-planar 4:2:0 (`NV12`), by interleaving the two chroma planes.

use crate::buffer::{Buffer, BufferFlags, Plane};
use crate::channel::{Capability, ChannelAdapter, Readiness, RunContext};
use crate::error::{Error, Result};
use crate::v4l2::Pixelformat;

const DEFAULT_BUFFER_COUNT: u32 = 4;

/// Converts `YUV420`/`I420` input frames to `NV12`.
pub struct Yuv420ToNv12 {
    width: usize,
    height: usize,
    ended: bool,
}

impl Yuv420ToNv12 {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as usize,
            height: height as usize,
            ended: false,
        }
    }

    fn luma_size(&self) -> usize {
        self.width * self.height
    }

    fn chroma_size(&self) -> usize {
        self.luma_size() / 4
    }

    fn frame_size(&self) -> usize {
        self.luma_size() + self.chroma_size() * 2
    }

    fn convert(&self, input: &Buffer, output: &Buffer) -> Result<()> {
        let luma = self.luma_size();
        let chroma = self.chroma_size();
        let src = input.plane(0);
        let src = src.as_slice();
        if src.len() < luma + chroma * 2 {
            return Err(Error::Adapter(
                input.owner(),
                format!("input frame too small: {} < {}", src.len(), luma + chroma * 2).into(),
            ));
        }
        let y = &src[..luma];
        let u = &src[luma..luma + chroma];
        let v = &src[luma + chroma..luma + chroma * 2];

        let mut dst = output.plane_mut(0);
        let dst = dst.as_mut_slice();
        dst[..luma].copy_from_slice(y);
        for i in 0..chroma {
            dst[luma + i * 2] = u[i];
            dst[luma + i * 2 + 1] = v[i];
        }
        drop(src);
        output.plane_mut(0).set_bytes_used(self.frame_size());
        Ok(())
    }
}

impl ChannelAdapter for Yuv420ToNv12 {
    fn capability(&self) -> Capability {
        Capability::Convert
    }

    fn buffer_count(&self) -> u32 {
        DEFAULT_BUFFER_COUNT
    }

    fn alloc_buffer(&mut self, _index: u32) -> Result<Vec<Plane>> {
        Ok(vec![Plane::owned(self.frame_size())])
    }

    fn check_ready(&mut self) -> Readiness {
        if self.ended {
            Readiness::End
        } else {
            Readiness::Ready
        }
    }

    fn run(&mut self, input: Option<&Buffer>, rt: &mut RunContext<'_>) -> Result<()> {
        let Some(input) = input else {
            return Ok(());
        };
        let Some(output) = rt.get_idle_buffer() else {
            // No free output buffer this tick; the input is still released by the scheduler and
            // that frame is dropped, same as a source overrunning a full downstream queue would.
            return Ok(());
        };

        self.convert(input, &output)?;

        if input.is_last() {
            output.insert_flags(BufferFlags::LAST);
            self.ended = true;
        }

        rt.push_back_output(output);
        Ok(())
    }
}

pub fn pixelformat_in() -> Pixelformat {
    Pixelformat::YUV420
}

pub fn pixelformat_out() -> Pixelformat {
    Pixelformat::NV12
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelId;
    use std::collections::VecDeque;

    #[test]
    fn interleaves_chroma_planes() {
        let conv = Yuv420ToNv12::new(2, 2);
        let mut src = vec![0u8; conv.frame_size()];
        src[0..4].copy_from_slice(&[10, 11, 12, 13]); // Y
        src[4] = 20; // U
        src[5] = 30; // V

        let input = Buffer::new(ChannelId(0), 0, vec![Plane::owned(0)]);
        input.plane_mut(0).set_bytes_used(0);
        *input.plane_mut(0) = {
            let mut p = Plane::owned(src.len());
            p.as_mut_slice().copy_from_slice(&src);
            p.set_bytes_used(src.len());
            p
        };

        let output = Buffer::new(ChannelId(1), 0, vec![Plane::owned(conv.frame_size())]);
        conv.convert(&input, &output).unwrap();

        let out = output.plane(0);
        let out = out.as_slice();
        assert_eq!(&out[0..4], &[10, 11, 12, 13]);
        assert_eq!(&out[4..6], &[20, 30]);
    }

    #[test]
    fn propagates_last_flag() {
        let mut conv = Yuv420ToNv12::new(2, 2);
        let input = Buffer::new(ChannelId(0), 0, vec![Plane::owned(conv.frame_size())]);
        input.plane_mut(0).set_bytes_used(conv.frame_size());
        input.insert_flags(BufferFlags::LAST);

        let idle_buf = Buffer::new(ChannelId(1), 0, vec![Plane::owned(conv.frame_size())]);
        let mut idle = VecDeque::from([idle_buf]);
        let mut output = VecDeque::new();
        let mut rt = RunContext::new(&mut idle, &mut output);

        conv.run(Some(&input), &mut rt).unwrap();

        assert_eq!(output.len(), 1);
        assert!(output.front().unwrap().is_last());
        assert_eq!(conv.check_ready(), Readiness::End);
    }
}
