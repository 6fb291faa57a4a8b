//! Blocking control client.
//!
//! Sends one signed packet per operation and reads the snapshots the
//! server streams back, one JSON document per line.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

use crate::adapters::time::epoch_millis;
use crate::error::{ClientError, ProtocolError};
use crate::fsm::{CurrentState, DoorSnapshot, TargetState};

use super::auth::seal;
use super::codec::{MAX_FRAME_SIZE, encode_line};
use super::messages::ControlPacket;

/// Longest line accepted from the server, terminator included.
const LINE_LIMIT: u64 = (MAX_FRAME_SIZE + 2) as u64;

/// What a client wants done, before it is stamped and signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Sync,
    Set(TargetState),
}

/// How a `SET` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The door rests at the requested target.
    Reached,
    /// The server gave up (stall or interrupt).
    Stopped,
    /// The door came to rest on a different target than requested,
    /// e.g. after a stopped-door recovery reversed direction.
    Redirected,
}

impl SetOutcome {
    /// Classify `snapshot` for a request toward `requested`; `None` while
    /// the outcome is still open.
    pub fn from_snapshot(requested: TargetState, snapshot: &DoorSnapshot) -> Option<Self> {
        if snapshot.current == requested.resting() {
            Some(Self::Reached)
        } else if snapshot.current == CurrentState::Stopped {
            Some(Self::Stopped)
        } else if snapshot.current.is_resting() && snapshot.target != requested {
            Some(Self::Redirected)
        } else {
            None
        }
    }
}

/// A connection to the control server.
pub struct ControlClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    secret: Vec<u8>,
    line: String,
}

impl ControlClient {
    pub fn connect(addr: impl ToSocketAddrs, secret: &[u8]) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            secret: secret.to_vec(),
            line: String::new(),
        })
    }

    /// Bound how long [`next_snapshot`](Self::next_snapshot) may block.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), ClientError> {
        self.writer.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Stamp `request` with the current time, sign it and send it.
    pub fn send(&mut self, request: ControlRequest) -> Result<(), ClientError> {
        let timestamp = epoch_millis().max(1);
        let packet = match request {
            ControlRequest::Sync => ControlPacket::Sync { timestamp },
            ControlRequest::Set(target) => ControlPacket::Set { target, timestamp },
        };
        let envelope = seal(packet, &self.secret)?;
        let line = encode_line(&envelope)?;
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        debug!("sent {:?}", packet);
        Ok(())
    }

    /// Block for the next snapshot line.
    pub fn next_snapshot(&mut self) -> Result<DoorSnapshot, ClientError> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .by_ref()
                .take(LINE_LIMIT)
                .read_line(&mut self.line)?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            if n as u64 == LINE_LIMIT && !self.line.ends_with('\n') {
                return Err(ProtocolError::Framing.into());
            }
            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }
            return serde_json::from_str(text).map_err(|_| ProtocolError::Schema.into());
        }
    }

    /// Send `SET target` and follow the broadcasts until the outcome is
    /// known.  Every snapshot seen is passed to `on_snapshot` first.
    pub fn set_target(
        &mut self,
        target: TargetState,
        mut on_snapshot: impl FnMut(&DoorSnapshot),
    ) -> Result<SetOutcome, ClientError> {
        self.send(ControlRequest::Set(target))?;
        loop {
            let snapshot = self.next_snapshot()?;
            on_snapshot(&snapshot);
            if let Some(outcome) = SetOutcome::from_snapshot(target, &snapshot) {
                return Ok(outcome);
            }
        }
    }
}
