//! Error types for the pitcher runtime.

use std::fmt;

use thiserror::Error;

/// Identifies a channel registered with a [`Context`](crate::context::Context).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub(crate) u32);

impl ChannelId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The error type returned by pitcher runtime operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A channel name exceeded [`MAX_NAME_LEN`](crate::channel::MAX_NAME_LEN).
    #[error("channel name {0:?} exceeds the maximum length")]
    NameTooLong(String),

    /// The context's channel table is full.
    #[error("no free channel slots (maximum of {0} channels already registered)")]
    TableFull(usize),

    /// No channel with that id is currently registered.
    #[error("channel {0} not found")]
    NoSuchChannel(ChannelId),

    /// The requested operation requires a state the channel is not in.
    #[error("channel {0} is not in a state that permits this operation")]
    InvalidState(ChannelId),

    /// A channel was connected to itself.
    #[error("cannot connect channel {0} to itself")]
    SelfConnection(ChannelId),

    /// The destination channel of a connection already has a source.
    #[error("channel {0} already has a source connected")]
    AlreadyConnected(ChannelId),

    /// A frame-skip ratio had a zero denominator or a numerator greater than the denominator.
    #[error("invalid frame-skip ratio {0}/{1}")]
    InvalidSkipRatio(u32, u32),

    /// A channel's adapter failed to allocate one of its buffers.
    #[error("channel {0} failed to allocate buffer {1}")]
    AllocationFailed(ChannelId, u32),

    /// A channel's adapter reported an error from its own domain (I/O, format negotiation, ...).
    #[error("channel {0} adapter error: {1}")]
    Adapter(ChannelId, #[source] Box<dyn std::error::Error + Send + Sync>),

    /// An underlying I/O error occurred outside of any specific channel's adapter.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`](std::result::Result) for pitcher runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
