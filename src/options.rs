//! Session configuration and pure range validation.
//!
//! Validation never touches the kernel: `SessionConfig::validate` produces a
//! [`ValidatedConfig`] with the exact wire-width types, and opening a socket
//! only ever consumes a validated config. A bad value fails fast with
//! [`Error::InvalidArgument`] before any socket exists.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// What to do when the kernel signals message loss with ENOBUFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnobufsPolicy {
    /// Surface the loss: the drain call that observes it fails with
    /// [`Error::Dropped`].
    #[default]
    Raise,
    /// Count the loss in `drops()` and keep receiving.
    Handle,
    /// Ask the kernel not to signal loss at all (NETLINK_NO_ENOBUFS).
    Disable,
}

impl FromStr for EnobufsPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "raise" => Ok(Self::Raise),
            "handle" => Ok(Self::Handle),
            "disable" => Ok(Self::Disable),
            _ => Err(format!("unknown enobufs policy `{s}` (raise, handle, disable)")),
        }
    }
}

impl fmt::Display for EnobufsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raise => "raise",
            Self::Handle => "handle",
            Self::Disable => "disable",
        })
    }
}

/// How much of each packet the kernel copies to userspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyMode {
    None,
    Meta,
    #[default]
    Packet,
}

impl CopyMode {
    /// Kernel `NFULNL_COPY_*` value.
    pub(crate) fn wire(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Meta => 1,
            Self::Packet => 2,
        }
    }
}

impl FromStr for CopyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "meta" => Ok(Self::Meta),
            "packet" => Ok(Self::Packet),
            _ => Err(format!("unknown copy mode `{s}` (none, meta, packet)")),
        }
    }
}

impl fmt::Display for CopyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Meta => "meta",
            Self::Packet => "packet",
        })
    }
}

/// Upper bound on the flush timeout in seconds (`u32::MAX` centiseconds).
pub const TIMEOUT_MAX_SECONDS: f64 = 42_949_672.95;

/// Upper bound on the requested receive buffer (the kernel doubles it).
pub const RCVBUF_MAX: u64 = 1_073_741_823;

/// User-facing session configuration, wide types for ergonomic construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// NFLOG group to bind, `0..=65535`.
    pub group: u32,
    /// Kernel-side flush timeout in seconds, 0.01 s granularity, 0 = kernel
    /// default.
    pub timeout: f64,
    /// Kernel queue threshold in messages, 0 = kernel default.
    pub qthresh: u64,
    /// Socket receive buffer in bytes, 0 = leave as is.
    pub rcvbuf: u64,
    /// Kernel-side netlink buffer size in bytes, 0 = kernel default.
    pub nlbuf: u64,
    pub enobufs: EnobufsPolicy,
    pub copy_mode: CopyMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            group: 0,
            timeout: 0.0,
            qthresh: 0,
            rcvbuf: 0,
            nlbuf: 0,
            enobufs: EnobufsPolicy::Raise,
            copy_mode: CopyMode::Packet,
        }
    }
}

/// Range-checked configuration in wire-width types.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedConfig {
    pub group: u16,
    pub timeout_cs: u32,
    pub qthresh: u32,
    pub rcvbuf: u32,
    pub nlbuf: u32,
    pub enobufs: EnobufsPolicy,
    pub copy_mode: CopyMode,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidArgument {
        field,
        reason: reason.into(),
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<ValidatedConfig> {
        let group = u16::try_from(self.group)
            .map_err(|_| invalid("group", format!("{} not in 0..=65535", self.group)))?;

        if !self.timeout.is_finite() || self.timeout < 0.0 || self.timeout > TIMEOUT_MAX_SECONDS
        {
            return Err(invalid(
                "timeout",
                format!("{} not in 0..={TIMEOUT_MAX_SECONDS}", self.timeout),
            ));
        }
        // stored in centiseconds
        let timeout_cs = (self.timeout * 100.0).round() as u32;

        let qthresh = u32::try_from(self.qthresh)
            .map_err(|_| invalid("qthresh", format!("{} not in 0..=4294967295", self.qthresh)))?;
        let nlbuf = u32::try_from(self.nlbuf)
            .map_err(|_| invalid("nlbuf", format!("{} not in 0..=4294967295", self.nlbuf)))?;

        if self.rcvbuf > RCVBUF_MAX {
            return Err(invalid(
                "rcvbuf",
                format!("{} not in 0..={RCVBUF_MAX}", self.rcvbuf),
            ));
        }
        let rcvbuf = self.rcvbuf as u32;

        Ok(ValidatedConfig {
            group,
            timeout_cs,
            qthresh,
            rcvbuf,
            nlbuf,
            enobufs: self.enobufs,
            copy_mode: self.copy_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let v = SessionConfig::default().validate().unwrap();
        assert_eq!(v.group, 0);
        assert_eq!(v.timeout_cs, 0);
        assert_eq!(v.qthresh, 0);
        assert_eq!(v.rcvbuf, 0);
        assert_eq!(v.nlbuf, 0);
        assert_eq!(v.enobufs, EnobufsPolicy::Raise);
        assert_eq!(v.copy_mode, CopyMode::Packet);
    }

    #[test]
    fn test_group_range() {
        let mut c = SessionConfig::default();
        c.group = 65535;
        assert_eq!(c.validate().unwrap().group, 65535);
        c.group = 65536;
        assert!(matches!(
            c.validate(),
            Err(Error::InvalidArgument { field: "group", .. })
        ));
    }

    #[test]
    fn test_timeout_converted_to_centiseconds() {
        let mut c = SessionConfig::default();
        c.timeout = 1.5;
        assert_eq!(c.validate().unwrap().timeout_cs, 150);
        c.timeout = 0.01;
        assert_eq!(c.validate().unwrap().timeout_cs, 1);
        c.timeout = TIMEOUT_MAX_SECONDS;
        assert_eq!(c.validate().unwrap().timeout_cs, u32::MAX);
    }

    #[test]
    fn test_timeout_rejects_out_of_range() {
        let mut c = SessionConfig::default();
        for bad in [-0.01, TIMEOUT_MAX_SECONDS + 0.01, f64::NAN, f64::INFINITY] {
            c.timeout = bad;
            assert!(
                matches!(
                    c.validate(),
                    Err(Error::InvalidArgument {
                        field: "timeout",
                        ..
                    })
                ),
                "timeout {bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_qthresh_and_nlbuf_range() {
        let mut c = SessionConfig::default();
        c.qthresh = u64::from(u32::MAX);
        c.nlbuf = u64::from(u32::MAX);
        let v = c.validate().unwrap();
        assert_eq!(v.qthresh, u32::MAX);
        assert_eq!(v.nlbuf, u32::MAX);

        c.qthresh = u64::from(u32::MAX) + 1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_rcvbuf_range() {
        let mut c = SessionConfig::default();
        c.rcvbuf = RCVBUF_MAX;
        assert_eq!(c.validate().unwrap().rcvbuf, RCVBUF_MAX as u32);
        c.rcvbuf = RCVBUF_MAX + 1;
        assert!(matches!(
            c.validate(),
            Err(Error::InvalidArgument {
                field: "rcvbuf",
                ..
            })
        ));
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("handle".parse::<EnobufsPolicy>().unwrap(), EnobufsPolicy::Handle);
        assert!("keep".parse::<EnobufsPolicy>().is_err());
        assert_eq!("meta".parse::<CopyMode>().unwrap(), CopyMode::Meta);
        assert!("full".parse::<CopyMode>().is_err());
    }

    #[test]
    fn test_copy_mode_wire_values() {
        assert_eq!(CopyMode::None.wire(), 0);
        assert_eq!(CopyMode::Meta.wire(), 1);
        assert_eq!(CopyMode::Packet.wire(), 2);
    }
}
