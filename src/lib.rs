//! nflog-ingest - Ingest kernel NFLOG packet-logging events over netlink.
//!
//! This library binds an NFLOG group, drains the netlink socket under
//! backpressure, and decodes each logged packet into a structured
//! [`record::LogRecord`]. Sessions can also replay previously captured
//! attribute dumps, byte for byte, without touching the kernel.
//!
//! # Example
//!
//! ```no_run
//! use nflog_ingest::{IngestSession, SessionConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut session = IngestSession::open(&SessionConfig {
//!         group: 32,
//!         ..SessionConfig::default()
//!     })?;
//!     while let Some(record) = session.next(true)? {
//!         println!("{record}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod attr;
pub mod device;
pub mod error;
pub mod netlink;
pub mod options;
pub mod queue;
pub mod record;
pub mod session;

pub use attr::AttributeTuple;
pub use device::{DeviceNameCache, DeviceNameTable, NameResolver};
pub use error::{DecodeError, Error, Result};
pub use options::{CopyMode, EnobufsPolicy, SessionConfig};
pub use record::{LogRecord, RawCapture};
pub use session::source::{RecvOutcome, RecvSource, ReplayBatch};
pub use session::{IngestSession, RECV_RETRY_LIMIT};
