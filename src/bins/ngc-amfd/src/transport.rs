//! NGAP transport plumbing
//!
//! A gNB association is owned by two tasks: a reader that feeds frames to
//! the NGAP layer and a writer that drains an outbound queue. Everything
//! else addresses the association through its [`ConnectionHandle`] via the
//! [`ConnectionTable`], so no component holds the socket itself.
//!
//! [`Transport`] is implemented by kernel SCTP associations and by
//! [`MemoryTransport`], an in-process channel pair used by tests and tools.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use ngc_sctp::{SctpAssociation, SctpError, SctpEvent, NGAP_PPID};
use tokio::sync::{mpsc, Mutex, Notify};

use crate::error::{AmfError, AmfResult};
use crate::{read_lock, write_lock};

/// Opaque identifier of one RAN association, unique for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Encoded NGAP PDU queued for an association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub stream: u16,
    pub data: Vec<u8>,
}

/// What the reader side of an association observed
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected { outbound_streams: u16 },
    Frame { stream: u16, ppid: u32, data: Bytes },
    Disconnected,
}

/// One RAN association. Clones address the same association so the reader
/// and writer tasks can each own one.
pub trait Transport: Clone + Send + Sync + 'static {
    fn peer_addr(&self) -> SocketAddr;

    fn recv(&mut self) -> impl Future<Output = AmfResult<TransportEvent>> + Send;

    fn send(&self, stream: u16, data: Vec<u8>) -> impl Future<Output = AmfResult<()>> + Send;

    fn close(&self);
}

impl Transport for SctpAssociation {
    fn peer_addr(&self) -> SocketAddr {
        SctpAssociation::peer_addr(self)
    }

    async fn recv(&mut self) -> AmfResult<TransportEvent> {
        let event = match SctpAssociation::recv(self).await? {
            SctpEvent::Connected { outbound_streams, .. } => TransportEvent::Connected { outbound_streams },
            SctpEvent::DataReceived(msg) => TransportEvent::Frame { stream: msg.stream_id, ppid: msg.ppid, data: msg.data },
            SctpEvent::Disconnected => TransportEvent::Disconnected,
        };
        Ok(event)
    }

    async fn send(&self, stream: u16, data: Vec<u8>) -> AmfResult<()> {
        SctpAssociation::send(self, &data, NGAP_PPID, stream).await?;
        Ok(())
    }

    fn close(&self) {
        SctpAssociation::close(self)
    }
}

// ============================================================================
// In-memory transport
// ============================================================================

/// AMF side of an in-process association
#[derive(Clone)]
pub struct MemoryTransport {
    peer: SocketAddr,
    outbound_streams: u16,
    announced: bool,
    inbound: Arc<Mutex<mpsc::Receiver<(u16, Bytes)>>>,
    outbound: mpsc::Sender<(u16, Bytes)>,
    closed: Arc<AtomicBool>,
    close_signal: Arc<Notify>,
}

/// RAN side of an in-process association
pub struct MemoryPeer {
    tx: mpsc::Sender<(u16, Bytes)>,
    rx: mpsc::Receiver<(u16, Bytes)>,
}

/// Build a connected pair; the AMF side reports `outbound_streams` on setup
pub fn memory_pair(peer: SocketAddr, outbound_streams: u16) -> (MemoryTransport, MemoryPeer) {
    let (to_amf, from_peer) = mpsc::channel(256);
    let (to_peer, from_amf) = mpsc::channel(256);
    let transport = MemoryTransport {
        peer,
        outbound_streams,
        announced: false,
        inbound: Arc::new(Mutex::new(from_peer)),
        outbound: to_peer,
        closed: Arc::new(AtomicBool::new(false)),
        close_signal: Arc::new(Notify::new()),
    };
    (transport, MemoryPeer { tx: to_amf, rx: from_amf })
}

impl Transport for MemoryTransport {
    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    async fn recv(&mut self) -> AmfResult<TransportEvent> {
        if !self.announced {
            self.announced = true;
            return Ok(TransportEvent::Connected { outbound_streams: self.outbound_streams });
        }
        if self.closed.load(Ordering::SeqCst) {
            return Ok(TransportEvent::Disconnected);
        }
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            frame = inbound.recv() => Ok(match frame {
                Some((stream, data)) => TransportEvent::Frame { stream, ppid: NGAP_PPID, data },
                None => TransportEvent::Disconnected,
            }),
            _ = self.close_signal.notified() => Ok(TransportEvent::Disconnected),
        }
    }

    async fn send(&self, stream: u16, data: Vec<u8>) -> AmfResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SctpError::AssociationClosed.into());
        }
        self.outbound
            .send((stream, Bytes::from(data)))
            .await
            .map_err(|_| AmfError::Sctp(SctpError::AssociationClosed))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_signal.notify_one();
    }
}

impl MemoryPeer {
    /// Deliver one NGAP PDU to the AMF
    pub async fn send(&self, stream: u16, data: Vec<u8>) -> AmfResult<()> {
        self.tx
            .send((stream, Bytes::from(data)))
            .await
            .map_err(|_| AmfError::Sctp(SctpError::AssociationClosed))
    }

    /// Next PDU from the AMF; `None` once the AMF side has gone away
    pub async fn recv(&mut self) -> Option<(u16, Bytes)> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<(u16, Bytes)> {
        self.rx.try_recv().ok()
    }
}

// ============================================================================
// Connection table
// ============================================================================

struct ConnectionEntry {
    peer: SocketAddr,
    outbound_streams: u16,
    tx: mpsc::Sender<OutboundFrame>,
}

/// Outbound routing for every live association
pub struct ConnectionTable {
    next_id: AtomicU64,
    queue_depth: usize,
    entries: RwLock<HashMap<ConnectionHandle, ConnectionEntry>>,
}

impl ConnectionTable {
    pub fn new(queue_depth: usize) -> Self {
        Self { next_id: AtomicU64::new(1), queue_depth: queue_depth.max(1), entries: RwLock::new(HashMap::new()) }
    }

    /// Allocate a handle; the receiver feeds the association's writer task
    pub fn register(&self, peer: SocketAddr, outbound_streams: u16) -> (ConnectionHandle, mpsc::Receiver<OutboundFrame>) {
        let handle = ConnectionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.queue_depth);
        write_lock(&self.entries).insert(handle, ConnectionEntry { peer, outbound_streams, tx });
        (handle, rx)
    }

    pub fn set_outbound_streams(&self, handle: ConnectionHandle, outbound_streams: u16) {
        if let Some(entry) = write_lock(&self.entries).get_mut(&handle) {
            entry.outbound_streams = outbound_streams;
        }
    }

    pub fn outbound_streams(&self, handle: ConnectionHandle) -> Option<u16> {
        read_lock(&self.entries).get(&handle).map(|e| e.outbound_streams)
    }

    pub fn peer_addr(&self, handle: ConnectionHandle) -> Option<SocketAddr> {
        read_lock(&self.entries).get(&handle).map(|e| e.peer)
    }

    /// Queue a PDU without waiting; a full queue is back-pressure, not loss
    pub fn send(&self, handle: ConnectionHandle, stream: u16, data: Vec<u8>) -> AmfResult<()> {
        let entries = read_lock(&self.entries);
        let entry = entries.get(&handle).ok_or(AmfError::ConnectionClosed(handle))?;
        entry.tx.try_send(OutboundFrame { stream, data }).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                AmfError::ResourceExhausted(format!("outbound queue of {} is full", handle))
            }
            mpsc::error::TrySendError::Closed(_) => AmfError::ConnectionClosed(handle),
        })
    }

    /// Forget the association; its writer task drains and exits.
    /// Returns false when it was already gone.
    pub fn close(&self, handle: ConnectionHandle) -> bool {
        write_lock(&self.entries).remove(&handle).is_some()
    }

    pub fn handles(&self) -> Vec<ConnectionHandle> {
        let mut handles: Vec<_> = read_lock(&self.entries).keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn len(&self) -> usize {
        read_lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
