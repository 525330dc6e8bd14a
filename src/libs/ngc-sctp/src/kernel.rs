//! Linux Kernel SCTP Implementation
//!
//! Native one-to-one (`SOCK_STREAM`) SCTP sockets. Payload protocol
//! identifier and stream number travel in `SCTP_SNDRCV` ancillary data, so
//! no libsctp is linked.

use std::io;
use std::mem;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use libc::{
    self, c_int, c_void, sockaddr, sockaddr_in, sockaddr_in6, socklen_t, AF_INET, AF_INET6,
    IPPROTO_SCTP, SOCK_CLOEXEC, SOCK_NONBLOCK, SOCK_STREAM, SOL_SOCKET, SO_REUSEADDR,
};

use super::{SctpConfig, SctpError, SctpResult};

// ============================================================================
// SCTP Constants
// ============================================================================

/// SCTP socket option level
pub const SOL_SCTP: c_int = 132;

/// SCTP socket options
pub const SCTP_INITMSG: c_int = 2;
pub const SCTP_NODELAY: c_int = 3;
pub const SCTP_EVENTS: c_int = 11;

/// Ancillary data type carrying `SctpSndRcvInfo`
pub const SCTP_SNDRCV: c_int = 1;

/// Set in `msg_flags` when the read returned a notification
pub const MSG_NOTIFICATION: c_int = 0x8000;

/// SCTP notification types (`SCTP_SN_TYPE_BASE` + n)
pub const SCTP_ASSOC_CHANGE: u16 = 0x8001;
pub const SCTP_PEER_ADDR_CHANGE: u16 = 0x8002;
pub const SCTP_SEND_FAILED: u16 = 0x8003;
pub const SCTP_REMOTE_ERROR: u16 = 0x8004;
pub const SCTP_SHUTDOWN_EVENT: u16 = 0x8005;

/// SCTP association change states
pub const SCTP_COMM_UP: u16 = 0;
pub const SCTP_COMM_LOST: u16 = 1;
pub const SCTP_RESTART: u16 = 2;
pub const SCTP_SHUTDOWN_COMP: u16 = 3;
pub const SCTP_CANT_STR_ASSOC: u16 = 4;

// ============================================================================
// SCTP Structures (matching kernel ABI)
// ============================================================================

/// SCTP initialization message
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct SctpInitmsg {
    pub sinit_num_ostreams: u16,
    pub sinit_max_instreams: u16,
    pub sinit_max_attempts: u16,
    pub sinit_max_init_timeo: u16,
}

/// SCTP event subscription
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct SctpEventSubscribe {
    pub sctp_data_io_event: u8,
    pub sctp_association_event: u8,
    pub sctp_address_event: u8,
    pub sctp_send_failure_event: u8,
    pub sctp_peer_error_event: u8,
    pub sctp_shutdown_event: u8,
    pub sctp_partial_delivery_event: u8,
    pub sctp_adaptation_layer_event: u8,
    pub sctp_authentication_event: u8,
    pub sctp_sender_dry_event: u8,
}

/// SCTP send/receive info
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SctpSndRcvInfo {
    pub sinfo_stream: u16,
    pub sinfo_ssn: u16,
    pub sinfo_flags: u16,
    pub sinfo_ppid: u32,
    pub sinfo_context: u32,
    pub sinfo_timetolive: u32,
    pub sinfo_tsn: u32,
    pub sinfo_cumtsn: u32,
    pub sinfo_assoc_id: i32,
}

/// Association state change notification body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssocChange {
    pub state: u16,
    pub outbound_streams: u16,
    pub inbound_streams: u16,
}

/// Decoded SCTP notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    AssocChange(AssocChange),
    Shutdown,
    Other(u16),
}

/// Result of one `recvmsg` call
#[derive(Debug, Clone, Copy)]
pub struct RecvInfo {
    pub len: usize,
    pub notification: bool,
    pub stream: u16,
    pub ppid: u32,
}

// 8-byte aligned room for one cmsghdr plus SctpSndRcvInfo
type ControlBuf = [u64; 8];

// ============================================================================
// Kernel SCTP Socket
// ============================================================================

/// Kernel SCTP socket wrapper
#[derive(Debug)]
pub struct KernelSctpSocket {
    fd: OwnedFd,
    local_addr: SocketAddr,
    remote_addr: Option<SocketAddr>,
}

impl KernelSctpSocket {
    fn new(addr: &SocketAddr) -> SctpResult<Self> {
        let family = match addr {
            SocketAddr::V4(_) => AF_INET,
            SocketAddr::V6(_) => AF_INET6,
        };

        let fd = unsafe { libc::socket(family, SOCK_STREAM | SOCK_NONBLOCK | SOCK_CLOEXEC, IPPROTO_SCTP) };
        if fd < 0 {
            return Err(SctpError::SocketCreation(io::Error::last_os_error()));
        }

        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            local_addr: *addr,
            remote_addr: None,
        })
    }

    /// Create a non-blocking listening socket
    pub fn server(addr: SocketAddr, config: &SctpConfig) -> SctpResult<Self> {
        let mut sock = Self::new(&addr)?;

        sock.set_reuse_addr(true)?;
        sock.set_sctp_events()?;
        sock.set_sctp_initmsg(config)?;
        sock.bind(&addr)?;
        sock.listen(128)?;

        log::info!("Kernel SCTP server listening on {}", sock.local_addr);
        Ok(sock)
    }

    /// Accept one pending association; the new socket is non-blocking and
    /// inherits the listener's options.
    pub fn accept(&self) -> io::Result<(Self, SocketAddr)> {
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as socklen_t;

        let fd = unsafe {
            libc::accept4(
                self.fd.as_raw_fd(),
                &mut storage as *mut _ as *mut sockaddr,
                &mut len,
                SOCK_NONBLOCK | SOCK_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        let peer = sockaddr_to_socketaddr(&storage, len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "unsupported peer address family"))?;

        Ok((
            Self { fd: owned, local_addr: self.local_addr, remote_addr: Some(peer) },
            peer,
        ))
    }

    /// Send one message with PPID and stream number
    pub fn send(&self, data: &[u8], ppid: u32, stream_no: u16) -> io::Result<usize> {
        let mut iov = libc::iovec { iov_base: data.as_ptr() as *mut c_void, iov_len: data.len() };
        let mut control: ControlBuf = [0; 8];
        let space = unsafe { libc::CMSG_SPACE(mem::size_of::<SctpSndRcvInfo>() as u32) } as usize;

        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr() as *mut c_void;
        msg.msg_controllen = space as _;

        let info = SctpSndRcvInfo {
            sinfo_stream: stream_no,
            sinfo_ppid: ppid.to_be(),
            ..Default::default()
        };

        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            if cmsg.is_null() {
                return Err(io::Error::new(io::ErrorKind::Other, "no room for SCTP_SNDRCV"));
            }
            (*cmsg).cmsg_level = IPPROTO_SCTP;
            (*cmsg).cmsg_type = SCTP_SNDRCV;
            (*cmsg).cmsg_len = libc::CMSG_LEN(mem::size_of::<SctpSndRcvInfo>() as u32) as _;
            std::ptr::write_unaligned(libc::CMSG_DATA(cmsg) as *mut SctpSndRcvInfo, info);
        }

        let sent = unsafe { libc::sendmsg(self.fd.as_raw_fd(), &msg, libc::MSG_NOSIGNAL) };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(sent as usize)
    }

    /// Receive one message or notification into `buf`
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<RecvInfo> {
        let mut iov = libc::iovec { iov_base: buf.as_mut_ptr() as *mut c_void, iov_len: buf.len() };
        let mut control: ControlBuf = [0; 8];

        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr() as *mut c_void;
        msg.msg_controllen = mem::size_of::<ControlBuf>() as _;

        let received = unsafe { libc::recvmsg(self.fd.as_raw_fd(), &mut msg, 0) };
        if received < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut info = RecvInfo {
            len: received as usize,
            notification: msg.msg_flags & MSG_NOTIFICATION != 0,
            stream: 0,
            ppid: 0,
        };

        unsafe {
            let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
            while !cmsg.is_null() {
                if (*cmsg).cmsg_level == IPPROTO_SCTP && (*cmsg).cmsg_type == SCTP_SNDRCV {
                    let sndrcv = std::ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const SctpSndRcvInfo);
                    info.stream = sndrcv.sinfo_stream;
                    info.ppid = u32::from_be(sndrcv.sinfo_ppid);
                }
                cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
            }
        }

        Ok(info)
    }

    /// Graceful shutdown of both directions
    pub fn shutdown(&self) {
        unsafe {
            libc::shutdown(self.fd.as_raw_fd(), libc::SHUT_RDWR);
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    // ========================================================================
    // Internal methods
    // ========================================================================

    fn bind(&mut self, addr: &SocketAddr) -> SctpResult<()> {
        let (storage, len) = socketaddr_to_storage(addr);
        let result = unsafe {
            libc::bind(self.fd.as_raw_fd(), &storage as *const _ as *const sockaddr, len)
        };
        if result < 0 {
            return Err(SctpError::BindFailed(io::Error::last_os_error()));
        }

        self.local_addr = self.get_local_addr()?;
        Ok(())
    }

    fn listen(&self, backlog: c_int) -> SctpResult<()> {
        let result = unsafe { libc::listen(self.fd.as_raw_fd(), backlog) };
        if result < 0 {
            return Err(SctpError::ListenFailed(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn get_local_addr(&self) -> SctpResult<SocketAddr> {
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as socklen_t;

        let result = unsafe {
            libc::getsockname(self.fd.as_raw_fd(), &mut storage as *mut _ as *mut sockaddr, &mut len)
        };
        if result < 0 {
            return Err(SctpError::SockoptFailed(io::Error::last_os_error()));
        }

        sockaddr_to_socketaddr(&storage, len)
    }

    fn setsockopt<T>(&self, level: c_int, name: c_int, value: &T) -> io::Result<()> {
        let result = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                level,
                name,
                value as *const T as *const c_void,
                mem::size_of::<T>() as socklen_t,
            )
        };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn set_reuse_addr(&self, enable: bool) -> SctpResult<()> {
        let optval: c_int = if enable { 1 } else { 0 };
        self.setsockopt(SOL_SOCKET, SO_REUSEADDR, &optval)
            .map_err(SctpError::SockoptFailed)
    }

    fn set_sctp_events(&self) -> SctpResult<()> {
        let events = SctpEventSubscribe {
            sctp_data_io_event: 1,
            sctp_association_event: 1,
            sctp_shutdown_event: 1,
            ..Default::default()
        };
        // data_io and association events drive close detection; refuse to
        // run without them
        self.setsockopt(SOL_SCTP, SCTP_EVENTS, &events)
            .map_err(SctpError::SockoptFailed)
    }

    fn set_sctp_initmsg(&self, config: &SctpConfig) -> SctpResult<()> {
        let initmsg = SctpInitmsg {
            sinit_num_ostreams: config.max_outbound_streams,
            sinit_max_instreams: config.max_inbound_streams,
            sinit_max_attempts: config.max_attempts,
            sinit_max_init_timeo: config.max_init_timeout_ms,
        };

        if let Err(e) = self.setsockopt(SOL_SCTP, SCTP_INITMSG, &initmsg) {
            log::warn!("Failed to set SCTP initmsg: {}", e);
        }
        Ok(())
    }
}

impl AsRawFd for KernelSctpSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Decode an `sctp_notification` buffer (`sn_type`, `sn_flags`, `sn_length`
/// followed by the type-specific body)
pub fn parse_notification(buf: &[u8]) -> Option<Notification> {
    if buf.len() < 8 {
        return None;
    }
    let sn_type = u16::from_ne_bytes([buf[0], buf[1]]);
    match sn_type {
        SCTP_ASSOC_CHANGE => {
            // sac_state, sac_error, sac_outbound_streams, sac_inbound_streams
            if buf.len() < 16 {
                return None;
            }
            Some(Notification::AssocChange(AssocChange {
                state: u16::from_ne_bytes([buf[8], buf[9]]),
                outbound_streams: u16::from_ne_bytes([buf[12], buf[13]]),
                inbound_streams: u16::from_ne_bytes([buf[14], buf[15]]),
            }))
        }
        SCTP_SHUTDOWN_EVENT => Some(Notification::Shutdown),
        other => Some(Notification::Other(other)),
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn socketaddr_to_storage(addr: &SocketAddr) -> (libc::sockaddr_storage, socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    match addr {
        SocketAddr::V4(v4) => {
            let sin = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
            sin.sin_family = AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            (storage, mem::size_of::<sockaddr_in>() as socklen_t)
        }
        SocketAddr::V6(v6) => {
            let sin6 = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
            sin6.sin6_family = AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.sin6_addr.s6_addr = v6.ip().octets();
            sin6.sin6_scope_id = v6.scope_id();
            (storage, mem::size_of::<sockaddr_in6>() as socklen_t)
        }
    }
}

fn sockaddr_to_socketaddr(storage: &libc::sockaddr_storage, len: socklen_t) -> SctpResult<SocketAddr> {
    let family = storage.ss_family as c_int;

    if family == AF_INET && len >= mem::size_of::<sockaddr_in>() as socklen_t {
        let sin = unsafe { &*(storage as *const _ as *const sockaddr_in) };
        let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
        Ok(SocketAddr::new(IpAddr::V4(ip), u16::from_be(sin.sin_port)))
    } else if family == AF_INET6 && len >= mem::size_of::<sockaddr_in6>() as socklen_t {
        let sin6 = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
        let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
        Ok(SocketAddr::new(IpAddr::V6(ip), u16::from_be(sin6.sin6_port)))
    } else {
        Err(SctpError::NoValidAddress)
    }
}

// ============================================================================
// Tests
// ============================================================================
