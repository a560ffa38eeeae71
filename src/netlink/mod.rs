//! Netlink transport for the netfilter log subsystem.
//!
//! [`parse`] is pure byte-walking and builds everywhere; the socket layers
//! are Linux-only.

#[cfg(target_os = "linux")]
pub mod nflog;
pub mod parse;
#[cfg(target_os = "linux")]
pub mod socket;

/// Netfilter subsystem id for the userspace logging facility.
pub const NFNL_SUBSYS_ULOG: u16 = 4;

/// Packet delivery message: `(NFNL_SUBSYS_ULOG << 8) | NFULNL_MSG_PACKET`.
pub const NFULNL_MSG_PACKET: u16 = NFNL_SUBSYS_ULOG << 8;
/// Group configuration message.
pub const NFULNL_MSG_CONFIG: u16 = (NFNL_SUBSYS_ULOG << 8) | 1;

/// `struct nlmsghdr` size.
pub const NLMSG_HDRLEN: usize = 16;
/// `struct nfgenmsg` size (family, version, resource id).
pub const NFGENMSG_LEN: usize = 4;

/// Ack/error message type.
pub const NLMSG_ERROR: u16 = 2;

pub const NLM_F_REQUEST: u16 = 1;
pub const NLM_F_ACK: u16 = 4;

// Config message attributes.
pub const NFULA_CFG_CMD: u16 = 1;
pub const NFULA_CFG_MODE: u16 = 2;
pub const NFULA_CFG_NLBUFSIZ: u16 = 3;
pub const NFULA_CFG_TIMEOUT: u16 = 4;
pub const NFULA_CFG_QTHRESH: u16 = 5;

// Config commands.
pub const NFULNL_CFG_CMD_BIND: u8 = 1;
pub const NFULNL_CFG_CMD_PF_BIND: u8 = 3;

/// Mask clearing the nested/byte-order flag bits of an attribute type.
pub const NLA_TYPE_MASK: u16 = 0x3fff;

/// `SOL_NETLINK` socket option level.
#[cfg(target_os = "linux")]
pub const SOL_NETLINK: libc::c_int = 270;
/// `NETLINK_NO_ENOBUFS` option: suppress loss notifications.
#[cfg(target_os = "linux")]
pub const NETLINK_NO_ENOBUFS: libc::c_int = 5;
