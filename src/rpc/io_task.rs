//! Cooperative server runtime: one thread, many connections.
//!
//! Uses `edge-executor` for cooperative multi-task scheduling and
//! `embassy-time` timers (backed by the std time driver).  Every task
//! borrows shared state only between awaits, so each request, poll and
//! timer runs to completion before the next one starts.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │  futures_lite::block_on                                      │
//!  │  ┌────────────────────────────────────────────────────────┐  │
//!  │  │  edge_executor::LocalExecutor                          │  │
//!  │  │                                                        │  │
//!  │  │  ┌────────┐ ┌──────────┐ ┌─────────────┐ ┌──────────┐  │  │
//!  │  │  │ Accept │ │ Read All │ │ Write       │ │ Poll     │  │  │
//!  │  │  │ 50ms ⏱ │ │ 5ms ⏱    │ │ wake-on-pub │ │ config ⏱ │  │  │
//!  │  │  └────────┘ └──────────┘ └─────────────┘ └──────────┘  │  │
//!  │  │  ┌─────────────────────────────────────────────────┐   │  │
//!  │  │  │ Stall / SimResolve / RelayRelease one-shot tasks│   │  │
//!  │  │  └─────────────────────────────────────────────────┘   │  │
//!  │  └────────────────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────────────────┘
//! ```

use core::cell::RefCell;
use core::time::Duration;
use std::collections::HashMap;
use std::net::TcpListener;
use std::rc::{Rc, Weak};

use anyhow::Context as _;
use edge_executor::{LocalExecutor, Task};
use log::{debug, info, warn};

use crate::adapters::time::epoch_millis;
use crate::app::commands::DoorCommand;
use crate::app::ports::{DoorPort, DoorTimer, TimerKind, TimerPort};
use crate::app::service::DoorService;
use crate::config::DoorConfig;
use crate::error::ProtocolError;
use crate::fsm::DoorSnapshot;

use super::auth::ClientId;
use super::channels::{BroadcastSink, SessionHub, SharedHub, Subscription, WriteSignal};
use super::codec::{Frame, LineDecoder, encode_line};
use super::engine::RpcEngine;
use super::transport::{TcpTransport, TransportError};

const READ_BUF_SIZE: usize = 1024;
const ACCEPT_INTERVAL: Duration = Duration::from_millis(50);
const READ_INTERVAL: Duration = Duration::from_millis(5);
const WRITE_RETRY: Duration = Duration::from_millis(10);

type Exec = LocalExecutor<'static, 32>;

fn sleep(after: Duration) -> embassy_time::Timer {
    embassy_time::Timer::after(embassy_time::Duration::from_micros(
        after.as_micros() as u64,
    ))
}

// ── Door runtime ─────────────────────────────────────────────

/// The door service together with the adapters it is driven through.
struct DoorRuntime<H: DoorPort + 'static> {
    service: DoorService,
    hw: H,
    timers: TaskTimers<H>,
    sink: BroadcastSink,
    engine: RpcEngine,
}

impl<H: DoorPort + 'static> DoorRuntime<H> {
    fn handle(&mut self, command: DoorCommand) -> Option<DoorSnapshot> {
        self.service
            .handle_command(command, &mut self.hw, &mut self.timers, &mut self.sink)
    }

    fn poll(&mut self) {
        self.service
            .poll(&mut self.hw, &mut self.timers, &mut self.sink);
    }

    fn fire(&mut self, timer: DoorTimer) {
        self.timers.release(timer);
        self.service
            .on_timer(timer, &mut self.hw, &mut self.timers, &mut self.sink);
    }
}

// ── Timers as executor tasks ─────────────────────────────────

/// [`TimerPort`] backed by one-shot executor tasks.  Dropping a task
/// handle cancels the task, so a cancelled timer never runs.
struct TaskTimers<H: DoorPort + 'static> {
    executor: Rc<Exec>,
    runtime: Weak<RefCell<DoorRuntime<H>>>,
    pending: HashMap<TimerKind, (u64, Task<()>)>,
}

impl<H: DoorPort + 'static> TaskTimers<H> {
    fn new(executor: Rc<Exec>, runtime: Weak<RefCell<DoorRuntime<H>>>) -> Self {
        Self {
            executor,
            runtime,
            pending: HashMap::new(),
        }
    }

    /// Forget the handle of a timer that is firing right now.
    fn release(&mut self, timer: DoorTimer) {
        if matches!(self.pending.get(&timer.kind), Some((epoch, _)) if *epoch == timer.epoch) {
            if let Some((_, task)) = self.pending.remove(&timer.kind) {
                task.detach();
            }
        }
    }
}

impl<H: DoorPort + 'static> TimerPort for TaskTimers<H> {
    fn arm(&mut self, timer: DoorTimer, after: Duration) {
        let runtime = self.runtime.clone();
        let task = self.executor.spawn(async move {
            sleep(after).await;
            let Some(runtime) = runtime.upgrade() else {
                return;
            };
            match runtime.try_borrow_mut() {
                Ok(mut rt) => rt.fire(timer),
                Err(_) => warn!("Timer {:?} fired while runtime busy", timer.kind),
            }
        });
        debug!(
            "Armed {:?} timer for epoch {} ({}ms)",
            timer.kind,
            timer.epoch,
            after.as_millis()
        );
        self.pending.insert(timer.kind, (timer.epoch, task));
    }

    fn cancel(&mut self, kind: TimerKind) {
        if self.pending.remove(&kind).is_some() {
            debug!("Cancelled {:?} timer", kind);
        }
    }
}

// ── Per-client state ─────────────────────────────────────────

struct IoSlot {
    decoder: LineDecoder,
    subscription: Subscription,
}

impl IoSlot {
    fn new(subscription: Subscription) -> Self {
        Self {
            decoder: LineDecoder::new(),
            subscription,
        }
    }
}

/// State shared by the I/O tasks.
struct Server<H: DoorPort + 'static> {
    transport: RefCell<TcpTransport>,
    slots: RefCell<HashMap<ClientId, IoSlot>>,
    runtime: Rc<RefCell<DoorRuntime<H>>>,
    hub: SharedHub,
    wake: Rc<WriteSignal>,
}

impl<H: DoorPort + 'static> Server<H> {
    fn open_client(&self, client_id: ClientId) {
        let subscription = SessionHub::subscribe(&self.hub, client_id);
        self.runtime.borrow_mut().engine.open(client_id);
        self.slots
            .borrow_mut()
            .insert(client_id, IoSlot::new(subscription));
    }

    /// Tear down a connection on every exit path: socket, queued output,
    /// subscription and session all go together.
    fn drop_client(&self, client_id: ClientId) {
        self.transport.borrow_mut().disconnect(client_id);
        let slot = self.slots.borrow_mut().remove(&client_id);
        drop(slot);
        self.runtime.borrow_mut().engine.close(client_id);
    }

    /// Decode, authenticate and execute everything in `data`.
    fn ingest(
        &self,
        client_id: ClientId,
        data: &[u8],
        frames: &mut Vec<Frame>,
    ) -> Result<(), ProtocolError> {
        frames.clear();
        {
            let mut slots = self.slots.borrow_mut();
            let Some(slot) = slots.get_mut(&client_id) else {
                return Ok(());
            };
            slot.decoder.feed(data, frames)?;
        }

        for frame in frames.iter() {
            let reply = {
                let mut rt = self.runtime.borrow_mut();
                let command = rt.engine.authenticate(client_id, frame, epoch_millis())?;
                rt.handle(command)
            };
            if let Some(snapshot) = reply {
                self.hub.borrow_mut().reply(client_id, snapshot);
            }
        }
        Ok(())
    }

    /// Move queued snapshots into socket buffers and write what we can.
    fn drain_outbound(&self, evicted: &mut Vec<ClientId>) {
        let slots = self.slots.borrow();
        let mut transport = self.transport.borrow_mut();

        for (&client_id, slot) in slots.iter() {
            while let Some(snapshot) = slot.subscription.try_next() {
                let line = match encode_line(&snapshot) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("IO: cannot encode snapshot: {}", e);
                        continue;
                    }
                };
                if let Err(e) = transport.queue(client_id, &line) {
                    warn!("IO: client {} not reading ({}), dropping", client_id, e);
                    evicted.push(client_id);
                    break;
                }
            }
            if let Err(e) = transport.flush_client(client_id) {
                info!("IO: write to client {} failed: {}", client_id, e);
                evicted.push(client_id);
            }
        }
    }
}

// ── Async tasks ──────────────────────────────────────────────

/// Accept task: checks for new connections at 50ms intervals.
async fn accept_loop<H: DoorPort + 'static>(server: Rc<Server<H>>) {
    loop {
        loop {
            let accepted = server.transport.borrow_mut().try_accept();
            let Some(client_id) = accepted else {
                break;
            };
            server.open_client(client_id);
        }
        sleep(ACCEPT_INTERVAL).await;
    }
}

/// Read task: polls every connected client.  Any protocol error drops
/// the connection without writing a byte back.
async fn read_loop<H: DoorPort + 'static>(server: Rc<Server<H>>) {
    let mut read_buf = [0u8; READ_BUF_SIZE];
    let mut frames: Vec<Frame> = Vec::new();
    loop {
        let client_ids = server.transport.borrow().client_ids();
        for client_id in client_ids {
            let read = server
                .transport
                .borrow_mut()
                .read_client(client_id, &mut read_buf);
            match read {
                Ok(0) | Err(TransportError::NotConnected) => {}
                Ok(n) => {
                    if let Err(e) = server.ingest(client_id, &read_buf[..n], &mut frames) {
                        warn!("IO: client {} rejected: {}", client_id, e);
                        server.drop_client(client_id);
                    }
                }
                Err(TransportError::Closed) => {
                    info!("IO: client {} closed the connection", client_id);
                    server.drop_client(client_id);
                }
                Err(e) => {
                    warn!("IO: client {} read error: {}", client_id, e);
                    server.drop_client(client_id);
                }
            }
        }
        sleep(READ_INTERVAL).await;
    }
}

/// Write task: wakes when the hub publishes, and keeps retrying while
/// any client still has unwritten bytes.
async fn write_loop<H: DoorPort + 'static>(server: Rc<Server<H>>) {
    loop {
        server.wake.wait().await;
        loop {
            let mut evicted = server.hub.borrow_mut().take_overflowed();
            server.drain_outbound(&mut evicted);
            for client_id in evicted {
                server.drop_client(client_id);
            }
            if !server.transport.borrow().has_pending() {
                break;
            }
            sleep(WRITE_RETRY).await;
        }
    }
}

/// Poll task: refreshes `current` from the sensors at the configured
/// interval.  A no-op for a simulated door.
async fn poll_loop<H: DoorPort + 'static>(runtime: Rc<RefCell<DoorRuntime<H>>>, interval: Duration) {
    loop {
        sleep(interval).await;
        runtime.borrow_mut().poll();
    }
}

// ── Entry point ──────────────────────────────────────────────

/// Serve the door on `listener` until the process exits.
///
/// Only setup failures are returned; everything after that is handled
/// per connection.
pub fn serve<H: DoorPort + 'static>(
    listener: TcpListener,
    secret: &[u8],
    config: &DoorConfig,
    hw: H,
) -> anyhow::Result<()> {
    let transport = TcpTransport::new(listener, config.max_outbound_bytes)
        .context("configuring TCP listener")?;

    let executor: Rc<Exec> = Rc::new(LocalExecutor::new());
    let wake = Rc::new(WriteSignal::new());
    let hub: SharedHub = Rc::new(RefCell::new(SessionHub::new(wake.clone())));

    let runtime = Rc::new_cyclic(|weak: &Weak<RefCell<DoorRuntime<H>>>| {
        RefCell::new(DoorRuntime {
            service: DoorService::new(config),
            hw,
            timers: TaskTimers::new(executor.clone(), weak.clone()),
            sink: BroadcastSink::new(hub.clone()),
            engine: RpcEngine::new(secret, config.timestamp_skew_warn_ms),
        })
    });

    runtime.borrow_mut().poll();
    info!("Door ready: {}", runtime.borrow().service.snapshot());

    let server = Rc::new(Server {
        transport: RefCell::new(transport),
        slots: RefCell::new(HashMap::new()),
        runtime: runtime.clone(),
        hub,
        wake,
    });

    executor.spawn(accept_loop(server.clone())).detach();
    executor.spawn(read_loop(server.clone())).detach();
    executor.spawn(write_loop(server)).detach();
    executor
        .spawn(poll_loop(runtime, config.poll_interval()))
        .detach();

    info!("Control server running");

    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
    Ok(())
}
