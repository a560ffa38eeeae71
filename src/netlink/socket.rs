//! Raw netfilter netlink socket.

use std::io;
use std::mem;
use std::os::fd::RawFd;

use tracing::debug;

use crate::error::{Error, Result};
use crate::session::source::RecvOutcome;

use super::{NETLINK_NO_ENOBUFS, SOL_NETLINK};

/// A bound `AF_NETLINK`/`NETLINK_NETFILTER` socket.
pub struct NetlinkSocket {
    fd: RawFd,
}

impl NetlinkSocket {
    /// Open and bind a netfilter netlink socket.
    pub fn open() -> Result<Self> {
        // SAFETY: plain socket(2) call, no pointers involved.
        let fd = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                libc::NETLINK_NETFILTER,
            )
        };
        if fd < 0 {
            return Err(Error::os("socket(AF_NETLINK, NETLINK_NETFILTER)"));
        }
        let sock = NetlinkSocket { fd };

        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        // SAFETY: addr is a fully initialized sockaddr_nl.
        let rc = unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(Error::os("bind netlink socket"));
        }

        debug!(fd, "opened netfilter netlink socket");
        Ok(sock)
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Send one complete netlink message.
    pub fn send(&self, buf: &[u8]) -> Result<()> {
        // SAFETY: buf is a valid slice for the given length.
        let rc = unsafe { libc::send(self.fd, buf.as_ptr() as *const libc::c_void, buf.len(), 0) };
        if rc < 0 {
            return Err(Error::os(format!("send() on fd {}", self.fd)));
        }
        if rc as usize != buf.len() {
            return Err(Error::Os {
                context: format!("short send on fd {}", self.fd),
                source: io::Error::from(io::ErrorKind::WriteZero),
            });
        }
        Ok(())
    }

    /// Receive into `buf`, classifying the non-fatal errnos.
    pub fn recv(&self, buf: &mut [u8], blocking: bool) -> Result<RecvOutcome> {
        let flags = if blocking { 0 } else { libc::MSG_DONTWAIT };
        // SAFETY: buf is a valid writable slice for the given length.
        let rc =
            unsafe { libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), flags) };
        if rc >= 0 {
            return Ok(RecvOutcome::Data(rc as usize));
        }
        match io::Error::last_os_error().raw_os_error() {
            Some(libc::EAGAIN) => Ok(RecvOutcome::WouldBlock),
            Some(libc::ENOBUFS) => Ok(RecvOutcome::Dropped),
            _ => Err(Error::os(format!("recv() on fd {}", self.fd))),
        }
    }

    /// Ask the kernel to stop signalling message loss on this socket.
    pub fn set_no_enobufs(&self) -> Result<()> {
        let on: libc::c_int = 1;
        // SAFETY: option value is a live c_int.
        let rc = unsafe {
            libc::setsockopt(
                self.fd,
                SOL_NETLINK,
                NETLINK_NO_ENOBUFS,
                &on as *const libc::c_int as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(Error::os("setsockopt(NETLINK_NO_ENOBUFS)"));
        }
        Ok(())
    }

    /// Set the receive buffer size, preferring the privileged force-set.
    ///
    /// Without CAP_NET_ADMIN the forced set fails with EPERM; fall back to
    /// the plain option and verify the kernel honored the request. The kernel
    /// stores double the requested value, so the read-back must be at least
    /// `2 * requested`.
    pub fn set_rcvbuf(&self, requested: u32) -> Result<()> {
        if self.setsockopt_int(libc::SO_RCVBUFFORCE, requested as libc::c_int) == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EPERM) {
            return Err(Error::Os {
                context: "setsockopt(SO_RCVBUFFORCE)".to_string(),
                source: err,
            });
        }

        debug!(requested, "SO_RCVBUFFORCE denied, trying SO_RCVBUF");
        if self.setsockopt_int(libc::SO_RCVBUF, requested as libc::c_int) != 0 {
            return Err(Error::os("setsockopt(SO_RCVBUF)"));
        }
        let actual = self.getsockopt_int(libc::SO_RCVBUF)?;
        if (actual as i64) < i64::from(requested) * 2 {
            return Err(Error::PermissionDenied(format!(
                "rcvbuf capped at {} bytes, {requested} requested",
                actual / 2
            )));
        }
        Ok(())
    }

    /// Current receive buffer size as originally requested.
    ///
    /// The kernel reports double the set value.
    pub fn rcvbuf(&self) -> Result<u32> {
        Ok((self.getsockopt_int(libc::SO_RCVBUF)? / 2) as u32)
    }

    fn setsockopt_int(&self, opt: libc::c_int, value: libc::c_int) -> libc::c_int {
        // SAFETY: option value is a live c_int.
        unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                opt,
                &value as *const libc::c_int as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        }
    }

    fn getsockopt_int(&self, opt: libc::c_int) -> Result<libc::c_int> {
        let mut value: libc::c_int = 0;
        let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
        // SAFETY: value and len are live and correctly sized.
        let rc = unsafe {
            libc::getsockopt(
                self.fd,
                libc::SOL_SOCKET,
                opt,
                &mut value as *mut libc::c_int as *mut libc::c_void,
                &mut len,
            )
        };
        if rc != 0 {
            return Err(Error::os("getsockopt(SOL_SOCKET)"));
        }
        Ok(value)
    }
}

impl Drop for NetlinkSocket {
    fn drop(&mut self) {
        // SAFETY: fd is owned by this socket and closed exactly once.
        unsafe { libc::close(self.fd) };
    }
}
