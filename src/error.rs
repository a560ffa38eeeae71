//! Error types for nflog-ingest.

use std::io;

use thiserror::Error;

/// Main error type for session and transport operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value failed range or enum validation
    #[error("invalid {field}: {reason}")]
    InvalidArgument {
        field: &'static str,
        reason: String,
    },

    /// A privileged operation (socket bind, forced buffer resize) was refused
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A transport operation failed with an OS error
    #[error("{context}: {source}")]
    Os {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The kernel reported message loss (ENOBUFS) under the `Raise` policy
    #[error("messages were dropped by the kernel (ENOBUFS)")]
    Dropped,

    /// The receive loop made no progress within the retry ceiling
    #[error("receive loop made no progress after {0} attempts")]
    RetryExhausted(usize),

    /// A receive-dependent operation was attempted on a closed session
    #[error("operation on a closed session")]
    Closed,

    /// Error while encoding or decoding attribute data
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl Error {
    /// OS error with context, capturing the current errno.
    pub(crate) fn os(context: impl Into<String>) -> Self {
        Error::Os {
            context: context.into(),
            source: io::Error::last_os_error(),
        }
    }
}

/// Errors related to the attribute codec and record interpretation.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Attribute value exceeds the 16-bit length field
    #[error("attribute {slot} too large: {len} bytes (max 65535)")]
    AttributeTooLarge { slot: usize, len: usize },

    /// Buffer ended before the structure it claims to hold
    #[error("capture buffer truncated at offset {offset}: need {needed} bytes, have {have}")]
    Truncated {
        offset: usize,
        needed: usize,
        have: usize,
    },

    /// Offset table entry points at an attribute with the wrong type tag
    #[error("attribute slot {slot} has type tag {found}, expected {expected}")]
    TypeMismatch {
        slot: usize,
        found: u16,
        expected: u16,
    },

    /// Offset table entry points outside the buffer or into the table itself
    #[error("attribute slot {slot} has invalid offset {offset}")]
    BadOffset { slot: usize, offset: usize },

    /// The packet message carried no timestamp attribute
    #[error("packet message carries no timestamp attribute")]
    MissingTimestamp,

    /// Timestamp seconds do not fit the microsecond representation
    #[error("timestamp out of range: {0} seconds")]
    TimestampOutOfRange(u64),

    /// Hardware address does not fit the fixed wire structure
    #[error("hardware address too large: {0} bytes (max 8)")]
    HwAddrTooLarge(usize),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
