//! Ingest sessions: the drain/retry/backpressure state machine.

pub mod source;

use std::os::fd::RawFd;

use tracing::{debug, warn};

use crate::device::{DeviceNameCache, NameResolver};
use crate::error::{Error, Result};
use crate::netlink::parse::parse_and_dispatch;
use crate::options::EnobufsPolicy;
#[cfg(target_os = "linux")]
use crate::options::SessionConfig;
use crate::queue::MessageQueue;
use crate::record::{LogRecord, RawCapture};

use source::{RecvOutcome, RecvSource, ReplayBatch, Source, RECV_BUF_LEN};

/// Ceiling on drain attempts within one `next` call. Tripping it means the
/// source keeps reporting progress without ever yielding a record.
pub const RECV_RETRY_LIMIT: usize = 64;

/// Resolver for replay sessions, which never touch live interfaces.
struct NoResolver;

impl NameResolver for NoResolver {
    fn index_to_name(&self, _index: u32) -> Option<String> {
        None
    }
}

/// One NFLOG ingestion session: a receive source, a decode path and a FIFO
/// of records awaiting consumption.
///
/// Sessions are single-threaded by design; all blocking happens inside the
/// receive primitive, gated by the `wait` flag on each operation.
pub struct IngestSession {
    /// `None` once closed; closing is terminal.
    source: Option<Source>,
    fifo: MessageQueue,
    devices: DeviceNameCache,
    enobufs: EnobufsPolicy,
    drops: u32,
    raw: bool,
    recv_buf: Vec<u8>,
}

impl IngestSession {
    fn new(source: Source, enobufs: EnobufsPolicy, devices: DeviceNameCache) -> Self {
        IngestSession {
            source: Some(source),
            fifo: MessageQueue::new(),
            devices,
            enobufs,
            drops: 0,
            raw: false,
            recv_buf: vec![0u8; RECV_BUF_LEN],
        }
    }

    /// Open a live session bound to the configured NFLOG group.
    ///
    /// Validation happens before any socket call; a bad option never leaves
    /// a half-configured socket behind.
    #[cfg(target_os = "linux")]
    pub fn open(config: &SessionConfig) -> Result<Self> {
        let validated = config.validate()?;
        let sock = crate::netlink::nflog::NflogSocket::open(&validated)?;
        Ok(Self::new(
            Source::Live(Box::new(sock)),
            validated.enobufs,
            DeviceNameCache::new(),
        ))
    }

    /// Session over an arbitrary live byte source.
    #[cfg(target_os = "linux")]
    pub fn from_source(source: impl RecvSource + 'static, enobufs: EnobufsPolicy) -> Self {
        Self::new(
            Source::Live(Box::new(source)),
            enobufs,
            DeviceNameCache::new(),
        )
    }

    /// Session over a live byte source with an injected name cache.
    pub fn from_source_with_cache(
        source: impl RecvSource + 'static,
        enobufs: EnobufsPolicy,
        devices: DeviceNameCache,
    ) -> Self {
        Self::new(Source::Live(Box::new(source)), enobufs, devices)
    }

    /// Session replaying previously captured batches. Device names come from
    /// the captures themselves; no live lookups happen.
    pub fn from_replay(iter: impl Iterator<Item = ReplayBatch> + 'static) -> Self {
        Self::new(
            Source::Replay(Box::new(iter)),
            EnobufsPolicy::Raise,
            DeviceNameCache::with_resolver(NoResolver),
        )
    }

    /// Pull newly available data from the source into the FIFO.
    ///
    /// Blocks only when `wait` is set and the FIFO is empty. Returns how many
    /// records this call enqueued; zero is normal for an idle source.
    pub fn queue(&mut self, wait: bool) -> Result<usize> {
        if self.source.is_none() {
            return Err(Error::Closed);
        }
        self.queue_inner(wait)
    }

    fn queue_inner(&mut self, wait: bool) -> Result<usize> {
        let before = self.fifo.len();
        match &self.source {
            None => return Ok(0),
            Some(Source::Live(_)) => self.drain_live(wait)?,
            Some(Source::Replay(_)) => self.drain_replay()?,
        }
        Ok(self.fifo.len() - before)
    }

    fn drain_live(&mut self, wait: bool) -> Result<()> {
        let blocking = wait && self.fifo.is_empty();
        let Some(Source::Live(src)) = &mut self.source else {
            return Ok(());
        };

        match src.recv(&mut self.recv_buf, blocking)? {
            RecvOutcome::Data(n) => {
                debug!(bytes = n, "received netlink data");
                let raw = self.raw;
                let fifo = &mut self.fifo;
                let devices = &mut self.devices;
                // The parser invokes this re-entrantly, once per message,
                // before the receive call returns.
                parse_and_dispatch(&self.recv_buf[..n], |attrs| {
                    match LogRecord::from_capture(attrs, None, devices, raw) {
                        Ok(record) => fifo.push(Some(record)),
                        Err(e) => warn!(error = %e, "skipping undecodable packet message"),
                    }
                });
            }
            RecvOutcome::WouldBlock => {}
            RecvOutcome::Dropped => match self.enobufs {
                EnobufsPolicy::Raise => return Err(Error::Dropped),
                EnobufsPolicy::Handle => {
                    self.drops += 1;
                    debug!(drops = self.drops, "kernel reported message loss");
                }
                // the socket was told to suppress these; a stray one is noise
                EnobufsPolicy::Disable => {
                    debug!("ignoring loss notification on a no-enobufs socket");
                }
            },
        }
        Ok(())
    }

    fn drain_replay(&mut self) -> Result<()> {
        let Some(Source::Replay(iter)) = &mut self.source else {
            return Ok(());
        };
        match iter.next() {
            Some(batch) => {
                for capture in batch {
                    match LogRecord::from_capture(
                        capture.attrs,
                        Some(&capture.devices),
                        &mut self.devices,
                        self.raw,
                    ) {
                        Ok(record) => self.fifo.push(Some(record)),
                        Err(e) => warn!(error = %e, "skipping undecodable replay capture"),
                    }
                }
            }
            None => {
                // Exhaustion is terminal but not an error; records already
                // queued stay poppable within the observing call.
                debug!("replay source exhausted");
                self.source = None;
            }
        }
        Ok(())
    }

    /// Return exactly one record, or `None` when nothing is available.
    ///
    /// Drains in a bounded retry loop; `wait = false` never blocks and
    /// returns `None` on an idle source. Exceeding the retry ceiling without
    /// yielding a record fails with [`Error::RetryExhausted`].
    pub fn next(&mut self, wait: bool) -> Result<Option<LogRecord>> {
        if self.source.is_none() {
            return Err(Error::Closed);
        }

        for _ in 0..RECV_RETRY_LIMIT {
            self.queue_inner(wait)?;

            if let Some(record) = self.fifo.pop() {
                return Ok(Some(record));
            }
            if !wait {
                return Ok(None);
            }
            if self.source.is_none() {
                // replay exhausted during this call
                return Ok(None);
            }
        }

        Err(Error::RetryExhausted(RECV_RETRY_LIMIT))
    }

    /// Feed records to `callback` until it has run `count` times, the
    /// session ends, or an error propagates. Negative `count` is unbounded.
    /// Returns how many records were consumed.
    pub fn loop_consume<F>(&mut self, mut callback: F, count: i64) -> Result<u64>
    where
        F: FnMut(LogRecord) -> Result<()>,
    {
        let mut consumed: u64 = 0;
        while count < 0 || consumed < count as u64 {
            match self.next(true)? {
                Some(record) => {
                    callback(record)?;
                    consumed += 1;
                }
                None => break,
            }
        }
        Ok(consumed)
    }

    /// Release the receive source and discard queued records. Idempotent;
    /// receive-dependent operations afterwards fail with [`Error::Closed`].
    pub fn close(&mut self) {
        self.source = None;
        let discarded = self.fifo.drain_all();
        if discarded > 0 {
            debug!(discarded, "discarded queued records on close");
        }
    }

    /// Query or set raw-capture mode.
    ///
    /// `None` queries without changing. Enabling clears the FIFO: records
    /// decoded without capture cannot grow one retroactively.
    pub fn raw_mode(&mut self, enabled: Option<bool>) -> bool {
        if let Some(v) = enabled {
            if v && !self.raw {
                self.fifo.drain_all();
            }
            self.raw = v;
        }
        self.raw
    }

    /// Enable raw mode, perform one blocking drain and return the captures
    /// of everything that arrived. The replayable counterpart of `queue`.
    pub fn drain_raw(&mut self) -> Result<Vec<RawCapture>> {
        if self.source.is_none() {
            return Err(Error::Closed);
        }
        self.fifo.drain_all();
        self.raw = true;

        self.queue_inner(true)?;

        let mut captures = Vec::with_capacity(self.fifo.len());
        while let Some(record) = self.fifo.pop() {
            if let Some(capture) = record.raw_capture(Some(true))? {
                captures.push(capture);
            }
        }
        Ok(captures)
    }

    /// Messages lost to kernel buffer exhaustion under the `Handle` policy.
    pub fn drops(&self) -> u32 {
        self.drops
    }

    /// Reset the loss counter to zero.
    pub fn reset_drops(&mut self) {
        self.drops = 0;
    }

    /// True if at least one record awaits consumption.
    pub fn queued(&self) -> bool {
        !self.fifo.is_empty()
    }

    /// Number of records awaiting consumption.
    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    /// File descriptor of the live socket, for external poll loops.
    pub fn fd(&self) -> Option<RawFd> {
        match &self.source {
            Some(Source::Live(src)) => src.fd(),
            _ => None,
        }
    }

    /// NFLOG group of the live socket.
    pub fn group(&self) -> Option<u16> {
        match &self.source {
            Some(Source::Live(src)) => src.group(),
            _ => None,
        }
    }
}

impl Iterator for IngestSession {
    type Item = Result<LogRecord>;

    /// Blocking iteration; a closed session ends the sequence.
    fn next(&mut self) -> Option<Self::Item> {
        match IngestSession::next(self, true) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(Error::Closed) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
