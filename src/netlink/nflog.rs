//! NFLOG group configuration and the live receive source.

use std::io;
use std::os::fd::RawFd;

use tracing::debug;

use crate::attr::align4;
use crate::error::{Error, Result};
use crate::options::{EnobufsPolicy, ValidatedConfig};
use crate::session::source::{RecvOutcome, RecvSource, RECV_BUF_LEN};

use super::socket::NetlinkSocket;
use super::{
    NFGENMSG_LEN, NFULA_CFG_CMD, NFULA_CFG_MODE, NFULA_CFG_NLBUFSIZ, NFULA_CFG_QTHRESH,
    NFULA_CFG_TIMEOUT, NFULNL_CFG_CMD_BIND, NFULNL_CFG_CMD_PF_BIND, NFULNL_MSG_CONFIG,
    NLMSG_ERROR, NLMSG_HDRLEN, NLM_F_ACK, NLM_F_REQUEST,
};

const ACK_ATTEMPT_LIMIT: usize = 64;

/// A netlink socket bound to one NFLOG group and configured for delivery.
pub struct NflogSocket {
    sock: NetlinkSocket,
    seq: u32,
    group: u16,
}

impl NflogSocket {
    /// Open a socket and bind it to `config.group` with the configured
    /// delivery options. Every configuration message is acked by the kernel
    /// before the next is sent, so a failure points at the exact option.
    pub fn open(config: &ValidatedConfig) -> Result<Self> {
        let mut this = NflogSocket {
            sock: NetlinkSocket::open()?,
            seq: 0,
            group: config.group,
        };

        // Route AF_INET logging through this subsystem, then join the group.
        this.send_config(
            libc::AF_INET as u8,
            0,
            &[(NFULA_CFG_CMD, &[NFULNL_CFG_CMD_PF_BIND])],
        )?;
        this.send_config(
            libc::AF_UNSPEC as u8,
            config.group,
            &[(NFULA_CFG_CMD, &[NFULNL_CFG_CMD_BIND])],
        )?;

        // struct nfulnl_msg_config_mode: be32 copy_range, u8 mode, u8 pad.
        let mut mode = [0u8; 6];
        mode[0..4].copy_from_slice(&0xffffu32.to_be_bytes());
        mode[4] = config.copy_mode.wire();
        this.send_config(libc::AF_UNSPEC as u8, config.group, &[(NFULA_CFG_MODE, &mode)])?;

        if config.timeout_cs > 0 {
            this.send_config(
                libc::AF_UNSPEC as u8,
                config.group,
                &[(NFULA_CFG_TIMEOUT, &config.timeout_cs.to_be_bytes())],
            )?;
        }
        if config.qthresh > 0 {
            this.send_config(
                libc::AF_UNSPEC as u8,
                config.group,
                &[(NFULA_CFG_QTHRESH, &config.qthresh.to_be_bytes())],
            )?;
        }
        if config.nlbuf > 0 {
            this.send_config(
                libc::AF_UNSPEC as u8,
                config.group,
                &[(NFULA_CFG_NLBUFSIZ, &config.nlbuf.to_be_bytes())],
            )?;
        }

        if config.enobufs == EnobufsPolicy::Disable {
            this.sock.set_no_enobufs()?;
        }
        if config.rcvbuf > 0 {
            this.sock.set_rcvbuf(config.rcvbuf)?;
        }

        debug!(group = config.group, fd = this.sock.fd(), "NFLOG group bound");
        Ok(this)
    }

    /// Requested receive buffer size, as set (the kernel stores double).
    pub fn rcvbuf(&self) -> Result<u32> {
        self.sock.rcvbuf()
    }

    /// Send one NFULNL_MSG_CONFIG message and wait for its ack.
    fn send_config(&mut self, family: u8, res_id: u16, attrs: &[(u16, &[u8])]) -> Result<()> {
        self.seq = self.seq.wrapping_add(1);

        let attrs_len: usize = attrs
            .iter()
            .map(|(_, v)| align4(4 + v.len()))
            .sum();
        let nl_len = NLMSG_HDRLEN + NFGENMSG_LEN + attrs_len;

        let mut msg = Vec::with_capacity(nl_len);
        msg.extend_from_slice(&(nl_len as u32).to_ne_bytes());
        msg.extend_from_slice(&NFULNL_MSG_CONFIG.to_ne_bytes());
        msg.extend_from_slice(&(NLM_F_REQUEST | NLM_F_ACK).to_ne_bytes());
        msg.extend_from_slice(&self.seq.to_ne_bytes());
        msg.extend_from_slice(&0u32.to_ne_bytes()); // pid
        msg.push(family);
        msg.push(0); // NFNETLINK_V0
        msg.extend_from_slice(&res_id.to_be_bytes());
        for (ty, value) in attrs {
            msg.extend_from_slice(&((4 + value.len()) as u16).to_ne_bytes());
            msg.extend_from_slice(&ty.to_ne_bytes());
            msg.extend_from_slice(value);
            msg.resize(align4(msg.len()), 0);
        }

        self.sock.send(&msg)?;
        self.await_ack()
    }

    /// Read until the kernel acks the last config message.
    ///
    /// Packet messages may already be arriving for the group; they are
    /// discarded here since delivery options are not yet settled.
    fn await_ack(&mut self) -> Result<()> {
        let mut buf = vec![0u8; RECV_BUF_LEN];
        for _ in 0..ACK_ATTEMPT_LIMIT {
            let n = match self.sock.recv(&mut buf, true)? {
                RecvOutcome::Data(n) => n,
                RecvOutcome::WouldBlock | RecvOutcome::Dropped => continue,
            };

            let mut off = 0;
            while n.saturating_sub(off) >= NLMSG_HDRLEN {
                let nl_len =
                    u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
                let nl_type =
                    u16::from_ne_bytes(buf[off + 4..off + 6].try_into().unwrap());
                if nl_len < NLMSG_HDRLEN || off + nl_len > n {
                    break;
                }

                if nl_type == NLMSG_ERROR {
                    if nl_len < NLMSG_HDRLEN + 4 {
                        break;
                    }
                    let errno = i32::from_ne_bytes(
                        buf[off + NLMSG_HDRLEN..off + NLMSG_HDRLEN + 4]
                            .try_into()
                            .unwrap(),
                    );
                    return match -errno {
                        0 => Ok(()),
                        e if e == libc::EPERM => Err(Error::PermissionDenied(
                            "NFLOG configuration requires CAP_NET_ADMIN".to_string(),
                        )),
                        e => Err(Error::Os {
                            context: "NFLOG configuration rejected".to_string(),
                            source: io::Error::from_raw_os_error(e),
                        }),
                    };
                }

                off += align4(nl_len);
            }
        }
        Err(Error::RetryExhausted(ACK_ATTEMPT_LIMIT))
    }
}

impl RecvSource for NflogSocket {
    fn recv(&mut self, buf: &mut [u8], blocking: bool) -> Result<RecvOutcome> {
        self.sock.recv(buf, blocking)
    }

    fn fd(&self) -> Option<RawFd> {
        Some(self.sock.fd())
    }

    fn group(&self) -> Option<u16> {
        Some(self.group)
    }
}
