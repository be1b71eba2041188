//! A termination watchdog channel.
//!
//! Grounded on the `ctrl` node in the original test harness's `main`: a channel with no source or
//! sink of its own, registered purely so its `check_ready` (`check_ctrl_ready`) can watch a
//! process-wide termination condition — there, a `SIGINT`/`SIGTERM` flag plus a scan of every
//! other node's connection state — and signal end-of-stream once it fires, which the scheduler
//! treats the same as any other channel reaching `Ended`.
//!
//! The scan-of-global-`nodes[]` part of the original is not something a channel needs to know how
//! to do; callers inject whatever predicate answers "should the graph stop now" instead, e.g. one
//! that watches a `Arc<AtomicBool>` flipped by a signal handler.

use crate::buffer::{Buffer, Plane};
use crate::channel::{Capability, ChannelAdapter, Readiness, RunContext};
use crate::error::Result;

/// A no-op channel whose sole purpose is deciding, via an injected predicate, when the graph
/// should terminate.
pub struct Watchdog {
    should_stop: Box<dyn FnMut() -> bool>,
}

impl Watchdog {
    pub fn new(should_stop: impl FnMut() -> bool + 'static) -> Self {
        Self {
            should_stop: Box::new(should_stop),
        }
    }
}

impl ChannelAdapter for Watchdog {
    fn capability(&self) -> Capability {
        Capability::Control
    }

    fn buffer_count(&self) -> u32 {
        0
    }

    fn alloc_buffer(&mut self, _index: u32) -> Result<Vec<Plane>> {
        unreachable!("Watchdog registers with buffer_count() == 0")
    }

    fn check_ready(&mut self) -> Readiness {
        if (self.should_stop)() {
            Readiness::End
        } else {
            Readiness::NotReady
        }
    }

    fn run(&mut self, _input: Option<&Buffer>, _rt: &mut RunContext<'_>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_end_once_predicate_fires() {
        let flag = std::rc::Rc::new(std::cell::Cell::new(false));
        let watched = flag.clone();
        let mut watchdog = Watchdog::new(move || watched.get());

        assert_eq!(watchdog.check_ready(), Readiness::NotReady);
        flag.set(true);
        assert_eq!(watchdog.check_ready(), Readiness::End);
    }
}
