//! Multi-client TCP transport.
//!
//! The transport operates as a non-blocking TCP server:
//!
//! 1. `new()` switches a bound listener to non-blocking mode.
//! 2. `try_accept()` polls for an incoming connection and assigns it a
//!    fresh [`ClientId`].
//! 3. Reads are non-blocking: `read_client()` returns `Ok(0)` when no
//!    data is available rather than blocking the caller.
//! 4. Writes are queued per client and drained by `flush_client()`; a
//!    client whose queue grows past the cap is reported as overflowing.
//! 5. `disconnect()` drops the socket together with anything queued.

use core::fmt;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use log::{debug, info, warn};

use super::auth::ClientId;

// ───────────────────────────────────────────────────────────────
// Error type
// ───────────────────────────────────────────────────────────────

/// Errors originating from the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No such client.
    NotConnected,
    /// The peer closed the connection.
    Closed,
    /// Socket I/O failure.
    Io,
    /// The client's outbound queue exceeded its cap.
    Overflow,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "no such client"),
            Self::Closed => write!(f, "connection closed by peer"),
            Self::Io => write!(f, "TCP/socket I/O error"),
            Self::Overflow => write!(f, "outbound queue full"),
        }
    }
}

impl std::error::Error for TransportError {}

// ───────────────────────────────────────────────────────────────
// TcpTransport
// ───────────────────────────────────────────────────────────────

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    outbound: Vec<u8>,
}

/// Non-blocking TCP server holding every connected client.
pub struct TcpTransport {
    listener: TcpListener,
    clients: HashMap<ClientId, Connection>,
    next_id: ClientId,
    max_outbound: usize,
}

impl TcpTransport {
    /// Take ownership of a bound listener.
    pub fn new(listener: TcpListener, max_outbound: usize) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        info!("TCP: listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            clients: HashMap::new(),
            next_id: 1,
            max_outbound,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Connected client ids, in no particular order.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    /// Poll for an incoming client connection (non-blocking).
    pub fn try_accept(&mut self) -> Option<ClientId> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                if stream.set_nonblocking(true).is_err() {
                    warn!("TCP: failed to set non-blocking on client socket");
                    return None;
                }
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP: set_nodelay failed for {}: {}", peer, e);
                }
                let id = self.next_id;
                self.next_id = self.next_id.wrapping_add(1);
                self.clients.insert(
                    id,
                    Connection {
                        stream,
                        peer,
                        outbound: Vec::new(),
                    },
                );
                info!("TCP: client {} connected from {}", id, peer);
                Some(id)
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                warn!("TCP: accept error: {}", e);
                None
            }
        }
    }

    /// Read whatever is available.  `Ok(0)` means nothing right now.
    pub fn read_client(
        &mut self,
        client_id: ClientId,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        let conn = self
            .clients
            .get_mut(&client_id)
            .ok_or(TransportError::NotConnected)?;
        match conn.stream.read(buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(0)
            }
            Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => {
                Err(TransportError::Closed)
            }
            Err(_) => Err(TransportError::Io),
        }
    }

    /// Append `data` to the client's outbound queue.
    pub fn queue(&mut self, client_id: ClientId, data: &[u8]) -> Result<(), TransportError> {
        let conn = self
            .clients
            .get_mut(&client_id)
            .ok_or(TransportError::NotConnected)?;
        if conn.outbound.len() + data.len() > self.max_outbound {
            return Err(TransportError::Overflow);
        }
        conn.outbound.extend_from_slice(data);
        Ok(())
    }

    /// Write as much of the outbound queue as the socket accepts.
    /// Returns `true` once the queue is empty.
    pub fn flush_client(&mut self, client_id: ClientId) -> Result<bool, TransportError> {
        let conn = self
            .clients
            .get_mut(&client_id)
            .ok_or(TransportError::NotConnected)?;
        while !conn.outbound.is_empty() {
            match conn.stream.write(&conn.outbound) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => {
                    conn.outbound.drain(..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => return Err(TransportError::Io),
            }
        }
        Ok(true)
    }

    /// Some client still has queued bytes.
    pub fn has_pending(&self) -> bool {
        self.clients.values().any(|c| !c.outbound.is_empty())
    }

    /// Drop the client's socket and anything still queued for it.
    pub fn disconnect(&mut self, client_id: ClientId) {
        if let Some(conn) = self.clients.remove(&client_id) {
            info!("TCP: client {} ({}) disconnected", client_id, conn.peer);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
