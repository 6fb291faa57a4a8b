//! Snapshot broadcast channels.
//!
//! Every connection subscribes to the [`SessionHub`] for its lifetime and
//! receives each published snapshot on its own bounded `embassy-sync`
//! channel, in publish order.  The write task drains those channels.
//!
//! ```text
//! ┌─────────────┐ DoorEvent ┌───────────────┐ DoorSnapshot ┌────────────┐
//! │ DoorService │──────────▶│ BroadcastSink │─────────────▶│ SessionHub │──▶ per-client channel
//! └─────────────┘           └───────────────┘              └────────────┘
//! ```
//!
//! A [`Subscription`] removes itself from the hub when dropped, on every
//! exit path of the connection.  The hub shares each channel with exactly
//! one live subscription, so an entry whose channel has no other owner is
//! dead and is pruned before the next delivery even if the eager removal
//! found the hub borrowed.

use core::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use log::{debug, warn};

use crate::adapters::log_sink::LogEventSink;
use crate::app::events::DoorEvent;
use crate::app::ports::EventSink;
use crate::fsm::DoorSnapshot;

use super::auth::ClientId;

/// Per-client channel depth.
pub const SNAPSHOT_DEPTH: usize = 16;

pub type SnapshotChannel = Channel<NoopRawMutex, DoorSnapshot, SNAPSHOT_DEPTH>;

/// Wakes the write task when any channel gained a message.
pub type WriteSignal = Signal<NoopRawMutex, ()>;

pub type SharedHub = Rc<RefCell<SessionHub>>;

/// Fan-out point for snapshots.
pub struct SessionHub {
    subscribers: HashMap<ClientId, Rc<SnapshotChannel>>,
    overflowed: Vec<ClientId>,
    wake: Rc<WriteSignal>,
}

impl SessionHub {
    pub fn new(wake: Rc<WriteSignal>) -> Self {
        Self {
            subscribers: HashMap::new(),
            overflowed: Vec::new(),
            wake,
        }
    }

    /// Register `client_id`; the returned guard unsubscribes on drop.
    pub fn subscribe(hub: &SharedHub, client_id: ClientId) -> Subscription {
        let channel = Rc::new(SnapshotChannel::new());
        let mut guard = hub.borrow_mut();
        guard.prune();
        guard.subscribers.insert(client_id, channel.clone());
        drop(guard);
        debug!("HUB: client {} subscribed", client_id);
        Subscription {
            client_id,
            channel,
            hub: Rc::downgrade(hub),
        }
    }

    fn unsubscribe(&mut self, client_id: ClientId) {
        if self.subscribers.remove(&client_id).is_some() {
            debug!("HUB: client {} unsubscribed", client_id);
        }
    }

    /// Drop entries whose subscription is gone.
    fn prune(&mut self) {
        self.subscribers.retain(|client_id, channel| {
            let live = is_live(channel);
            if !live {
                debug!("HUB: pruned client {}", client_id);
            }
            live
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.values().filter(|c| is_live(c)).count()
    }

    /// Deliver `snapshot` to every subscriber.
    pub fn publish(&mut self, snapshot: DoorSnapshot) {
        self.prune();
        for (&client_id, channel) in &self.subscribers {
            if channel.try_send(snapshot).is_err() {
                warn!("HUB: client {} channel full, dropping client", client_id);
                self.overflowed.push(client_id);
            }
        }
        self.wake.signal(());
    }

    /// Deliver `snapshot` to one subscriber only.
    pub fn reply(&mut self, client_id: ClientId, snapshot: DoorSnapshot) {
        self.prune();
        if let Some(channel) = self.subscribers.get(&client_id) {
            if channel.try_send(snapshot).is_err() {
                warn!("HUB: client {} channel full, dropping client", client_id);
                self.overflowed.push(client_id);
            }
            self.wake.signal(());
        }
    }

    /// Clients that could not keep up since the last call.
    pub fn take_overflowed(&mut self) -> Vec<ClientId> {
        core::mem::take(&mut self.overflowed)
    }
}

fn is_live(channel: &Rc<SnapshotChannel>) -> bool {
    Rc::strong_count(channel) > 1
}

/// A connection's live registration with the hub.
pub struct Subscription {
    client_id: ClientId,
    channel: Rc<SnapshotChannel>,
    hub: Weak<RefCell<SessionHub>>,
}

impl Subscription {
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Next queued snapshot, if any.
    pub fn try_next(&self) -> Option<DoorSnapshot> {
        self.channel.try_receive().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        match hub.try_borrow_mut() {
            Ok(mut hub) => hub.unsubscribe(self.client_id),
            Err(_) => debug!("HUB: busy, client {} pruned on next delivery", self.client_id),
        }
    }
}

// ── Event sink ───────────────────────────────────────────────

/// [`EventSink`] that logs every event and publishes snapshot-bearing
/// ones to all subscribers.
pub struct BroadcastSink {
    log: LogEventSink,
    hub: SharedHub,
}

impl BroadcastSink {
    pub fn new(hub: SharedHub) -> Self {
        Self {
            log: LogEventSink::new(),
            hub,
        }
    }
}

impl EventSink for BroadcastSink {
    fn emit(&mut self, event: &DoorEvent) {
        self.log.emit(event);
        if let Some(snapshot) = event.broadcast_snapshot() {
            self.hub.borrow_mut().publish(snapshot);
        }
    }
}
