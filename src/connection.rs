//! The connection table: directed edges between channels, with an optional frame-skip ratio.
//!
//! `pitcher_connect`/`pitcher_disconnect`/`pitcher_set_skip` in the original API operated on a
//! flat table keyed by `(src, dst)`; a destination channel has at most one source. We keep the
//! same shape: a `Vec` of edges, since the channel counts this runtime deals with are small
//! enough that a linear scan per scheduler tick is cheaper than hashing.

use log::trace;

use crate::error::{ChannelId, Error, Result};

/// A rational frame-skip ratio: `keep` frames pass through for every `total` presented.
///
/// Distribution uses a token-bucket accumulator rather than naive modulo counting, so the kept
/// frames are spread evenly across the sequence instead of clustering at the start of each
/// period (1 kept out of 3 keeps frame 0, 3, 6, ... evenly rather than 0, 1, 2 then a gap).
#[derive(Clone, Copy, Debug)]
pub(crate) struct SkipRatio {
    keep: u32,
    total: u32,
    credit: u32,
}

impl SkipRatio {
    fn new(keep: u32, total: u32) -> Result<Self> {
        if total == 0 || keep > total {
            return Err(Error::InvalidSkipRatio(keep, total));
        }
        Ok(Self {
            keep,
            total,
            credit: 0,
        })
    }

    const NONE: Self = Self {
        keep: 1,
        total: 1,
        credit: 0,
    };

    /// Advances the accumulator by one presented frame and returns whether it should be kept.
    fn admit(&mut self) -> bool {
        self.credit += self.keep;
        if self.credit >= self.total {
            self.credit -= self.total;
            true
        } else {
            false
        }
    }
}

pub(crate) struct Connection {
    pub(crate) src: ChannelId,
    pub(crate) dst: ChannelId,
    ratio: SkipRatio,
}

#[derive(Default)]
pub(crate) struct ConnectionTable {
    edges: Vec<Connection>,
}

impl ConnectionTable {
    pub(crate) fn new() -> Self {
        Self { edges: Vec::new() }
    }

    pub(crate) fn connect(&mut self, src: ChannelId, dst: ChannelId) -> Result<()> {
        if src == dst {
            return Err(Error::SelfConnection(src));
        }
        if self.edges.iter().any(|e| e.dst == dst) {
            return Err(Error::AlreadyConnected(dst));
        }
        self.edges.push(Connection {
            src,
            dst,
            ratio: SkipRatio::NONE,
        });
        trace!("connected {} -> {}", src, dst);
        Ok(())
    }

    pub(crate) fn disconnect(&mut self, src: ChannelId, dst: ChannelId) {
        self.edges.retain(|e| !(e.src == src && e.dst == dst));
    }

    /// `pitcher_disconnect` by destination alone, used when a channel is unregistered and needs
    /// to stop receiving input regardless of who its source was.
    pub(crate) fn disconnect_dst(&mut self, dst: ChannelId) {
        self.edges.retain(|e| e.dst != dst);
    }

    pub(crate) fn disconnect_src(&mut self, src: ChannelId) {
        self.edges.retain(|e| e.src != src);
    }

    pub(crate) fn set_skip(&mut self, src: ChannelId, dst: ChannelId, numerator: u32, denominator: u32) -> Result<()> {
        let ratio = SkipRatio::new(numerator, denominator)?;
        let edge = self
            .edges
            .iter_mut()
            .find(|e| e.src == src && e.dst == dst)
            .ok_or(Error::NoSuchChannel(dst))?;
        edge.ratio = ratio;
        Ok(())
    }

    pub(crate) fn source_of(&self, dst: ChannelId) -> Option<ChannelId> {
        self.edges.iter().find(|e| e.dst == dst).map(|e| e.src)
    }

    /// Returns `true` if a buffer presented right now from `src` to `dst` should be forwarded,
    /// advancing that edge's skip accumulator as a side effect.
    pub(crate) fn admit(&mut self, src: ChannelId, dst: ChannelId) -> bool {
        match self.edges.iter_mut().find(|e| e.src == src && e.dst == dst) {
            Some(edge) => edge.ratio.admit(),
            None => true,
        }
    }

    pub(crate) fn edges(&self) -> impl Iterator<Item = (ChannelId, ChannelId)> + '_ {
        self.edges.iter().map(|e| (e.src, e.dst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_ratio_alternates() {
        let mut r = SkipRatio::new(1, 2).unwrap();
        let kept: Vec<bool> = (0..6).map(|_| r.admit()).collect();
        assert_eq!(kept, vec![false, true, false, true, false, true]);
    }

    #[test]
    fn one_third_spreads_evenly() {
        let mut r = SkipRatio::new(1, 3).unwrap();
        let kept: Vec<usize> = (0..9)
            .enumerate()
            .filter_map(|(i, _)| if r.admit() { Some(i) } else { None })
            .collect();
        assert_eq!(kept, vec![2, 5, 8]);
    }

    #[test]
    fn rejects_invalid_ratio() {
        assert!(SkipRatio::new(2, 1).is_err());
        assert!(SkipRatio::new(1, 0).is_err());
    }

    #[test]
    fn connect_rejects_self_and_duplicate_dst() {
        let mut t = ConnectionTable::new();
        let a = ChannelId(0);
        let b = ChannelId(1);
        let c = ChannelId(2);
        assert!(t.connect(a, a).is_err());
        t.connect(a, b).unwrap();
        assert!(t.connect(c, b).is_err());
    }
}
