//! Async SCTP listener and association on tokio's reactor

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::unix::AsyncFd;

use crate::kernel::{parse_notification, KernelSctpSocket, Notification, SCTP_COMM_UP, SCTP_RESTART};
use crate::{ReceivedMessage, SctpConfig, SctpError, SctpEvent, SctpResult, MAX_SDU_LEN};

/// Listening SCTP endpoint
pub struct SctpListener {
    inner: AsyncFd<KernelSctpSocket>,
    config: SctpConfig,
}

impl SctpListener {
    /// Bind and listen on `addr`; must be called within a tokio runtime
    pub fn bind(addr: SocketAddr, config: SctpConfig) -> SctpResult<Self> {
        let socket = KernelSctpSocket::server(addr, &config)?;
        let inner = AsyncFd::new(socket).map_err(SctpError::SocketCreation)?;
        Ok(Self { inner, config })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.get_ref().local_addr()
    }

    /// Wait for the next association
    pub async fn accept(&self) -> SctpResult<(SctpAssociation, SocketAddr)> {
        loop {
            let mut guard = self.inner.readable().await.map_err(SctpError::AcceptFailed)?;
            match guard.try_io(|inner| inner.get_ref().accept()) {
                Ok(Ok((socket, peer))) => {
                    let fd = AsyncFd::new(socket).map_err(SctpError::AcceptFailed)?;
                    log::debug!("Accepted SCTP association from {}", peer);
                    let association = SctpAssociation {
                        inner: Arc::new(fd),
                        peer,
                        outbound_streams: self.config.max_outbound_streams,
                    };
                    return Ok((association, peer));
                }
                Ok(Err(e)) => return Err(SctpError::AcceptFailed(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

/// One established association. Clones share the socket, so one task can
/// read while others send.
#[derive(Clone)]
pub struct SctpAssociation {
    inner: Arc<AsyncFd<KernelSctpSocket>>,
    peer: SocketAddr,
    outbound_streams: u16,
}

impl SctpAssociation {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Outbound stream count offered at setup; refreshed from `COMM_UP`
    pub fn outbound_streams(&self) -> u16 {
        self.outbound_streams
    }

    /// Send one NGAP PDU on `stream`
    pub async fn send(&self, data: &[u8], ppid: u32, stream: u16) -> SctpResult<()> {
        loop {
            let mut guard = self.inner.writable().await.map_err(SctpError::SendFailed)?;
            match guard.try_io(|inner| inner.get_ref().send(data, ppid, stream)) {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) if is_closed(&e) => return Err(SctpError::AssociationClosed),
                Ok(Err(e)) => return Err(SctpError::SendFailed(e)),
                Err(_would_block) => continue,
            }
        }
    }

    /// Read the next event. Notifications other than association up/down
    /// are swallowed.
    pub async fn recv(&mut self) -> SctpResult<SctpEvent> {
        let mut buf = vec![0u8; MAX_SDU_LEN];
        loop {
            let mut guard = self.inner.readable().await.map_err(SctpError::ReceiveFailed)?;
            let info = match guard.try_io(|inner| inner.get_ref().recv(&mut buf)) {
                Ok(Ok(info)) => info,
                Ok(Err(e)) if is_closed(&e) => return Ok(SctpEvent::Disconnected),
                Ok(Err(e)) => return Err(SctpError::ReceiveFailed(e)),
                Err(_would_block) => continue,
            };

            if info.len == 0 {
                return Ok(SctpEvent::Disconnected);
            }

            if info.notification {
                match parse_notification(&buf[..info.len]) {
                    Some(Notification::AssocChange(change))
                        if change.state == SCTP_COMM_UP || change.state == SCTP_RESTART =>
                    {
                        self.outbound_streams = change.outbound_streams;
                        return Ok(SctpEvent::Connected {
                            inbound_streams: change.inbound_streams,
                            outbound_streams: change.outbound_streams,
                        });
                    }
                    Some(Notification::AssocChange(change)) => {
                        log::debug!("[{}] SCTP association change state {}", self.peer, change.state);
                        return Ok(SctpEvent::Disconnected);
                    }
                    Some(Notification::Shutdown) => return Ok(SctpEvent::Disconnected),
                    Some(Notification::Other(kind)) => {
                        log::trace!("[{}] SCTP notification 0x{:04x} ignored", self.peer, kind);
                        continue;
                    }
                    None => continue,
                }
            }

            return Ok(SctpEvent::DataReceived(ReceivedMessage {
                stream_id: info.stream,
                ppid: info.ppid,
                data: Bytes::copy_from_slice(&buf[..info.len]),
            }));
        }
    }

    /// Shut the association down; pending reads observe `Disconnected`
    pub fn close(&self) {
        self.inner.get_ref().shutdown();
    }
}

fn is_closed(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::NotConnected
    ) || e.raw_os_error() == Some(libc::EPIPE)
}
