//! Receive-source seam between the session and its transport.

use std::os::fd::RawFd;

use crate::error::Result;
use crate::record::RawCapture;

/// Bytes read per receive call.
pub const RECV_BUF_LEN: usize = 16 * 1024;

/// Outcome of one receive attempt on a live source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// `n` bytes of netlink messages landed in the buffer.
    Data(usize),
    /// Nothing available right now (non-blocking receive).
    WouldBlock,
    /// The kernel reported message loss (ENOBUFS).
    Dropped,
}

/// A live byte source feeding the session's drain loop.
///
/// The production implementation is the bound NFLOG socket; tests inject
/// scripted sources to exercise the backpressure and retry paths.
pub trait RecvSource {
    /// Receive one buffer of netlink messages. Blocks only when `blocking`.
    fn recv(&mut self, buf: &mut [u8], blocking: bool) -> Result<RecvOutcome>;

    /// Underlying file descriptor, for callers integrating with poll loops.
    fn fd(&self) -> Option<RawFd> {
        None
    }

    /// Bound NFLOG group, when the source is a live socket.
    fn group(&self) -> Option<u16> {
        None
    }
}

/// One batch of replayable captures from a replay iterator.
pub type ReplayBatch = Vec<RawCapture>;

/// What a session drains from: a live socket or a scripted replay.
pub(crate) enum Source {
    Live(Box<dyn RecvSource>),
    Replay(Box<dyn Iterator<Item = ReplayBatch>>),
}
