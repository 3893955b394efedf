//! # Connection State
//!
//! One TCP connection to a server, driven by a single actor task.
//!
//! ```text
//! Unconnected -> Connecting -> Connected -> Disposing -> Disposed
//! ```
//!
//! [`NetState`] is the handle the application holds. It never touches the
//! socket or the queues itself: sends are posted to the actor's inbox, and the
//! actor serializes them with receive completions and send completions coming
//! back from its reader and writer tasks. The byte queue, send queue and
//! message pump are owned by the actor alone, so none of them needs a lock.
//!
//! A packet's completion callback runs once its bytes have been written to
//! the socket. Packets still queued or mid-write when the connection goes
//! away report [`SendOutcome::Dropped`] instead.
//!
//! Disposal happens exactly once. It can be requested by the handle, by the
//! liveness probe, or by the actor on any socket or framing failure. Afterwards
//! every send is a no-op that still reports [`SendOutcome::Dropped`].

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::{ClientConfig, NetworkConfig, TransportConfig};
use crate::context::NetContext;
use crate::core::byte_queue::ByteQueue;
use crate::core::packet::{Packet, SendOutcome};
use crate::error::{ProtocolError, Result};
use crate::protocol::pump::MessagePump;
use crate::transport::send_queue::{Rejected, SendQueue};
use crate::utils::buffer_pool::{BufferPool, PooledBuffer};
use crate::utils::compression::encode_envelope;

/// How long disposal waits for the writer to flush and shut the socket down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Unconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disposing = 3,
    Disposed = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Unconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disposing,
            _ => ConnectionState::Disposed,
        }
    }

    /// Connecting or connected
    pub fn is_running(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

/// Why a connection was disposed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// [`NetState::dispose`] was called, or the handle was dropped
    Requested,
    /// No receive within the inactivity window
    Inactive,
    /// The server closed its side (zero-byte receive)
    RemoteClosed,
    ConnectFailed(String),
    Socket(String),
    /// Malformed inbound frame
    Protocol(String),
    /// A packet compiled to nothing, or could not be framed
    InvalidPacket(String),
    SendCapacityExceeded(String),
}

impl DisconnectReason {
    /// Whether the disposal was caused by a failure rather than a request
    pub fn is_error(&self) -> bool {
        !matches!(self, DisconnectReason::Requested)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Requested => write!(f, "disposed on request"),
            DisconnectReason::Inactive => write!(f, "{}", ProtocolError::ConnectionTimeout),
            DisconnectReason::RemoteClosed => write!(f, "{}", ProtocolError::ConnectionClosed),
            DisconnectReason::ConnectFailed(e) => write!(f, "connect failed: {e}"),
            DisconnectReason::Socket(e) => write!(f, "socket error: {e}"),
            DisconnectReason::Protocol(e) => write!(f, "protocol error: {e}"),
            DisconnectReason::InvalidPacket(e) => write!(f, "invalid packet: {e}"),
            DisconnectReason::SendCapacityExceeded(e) => write!(f, "{e}"),
        }
    }
}

/// Notifications delivered on the receiver returned by [`NetState::new`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    Connected { peer: SocketAddr },
    Disconnected { reason: DisconnectReason },
}

pub type EventReceiver = mpsc::UnboundedReceiver<NetEvent>;

type Outbox = mpsc::UnboundedSender<Box<dyn Packet>>;
type Inbox = mpsc::UnboundedReceiver<Box<dyn Packet>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State visible to both the handle and the actor
struct Shared {
    state: AtomicU8,
    disposing: AtomicBool,
    compression: AtomicBool,
    reason: Mutex<Option<DisconnectReason>>,
    connected_at: Mutex<Option<Instant>>,
    last_receive: Mutex<Instant>,
    peer: Mutex<Option<SocketAddr>>,
    dispose_signal: Notify,
    events: mpsc::UnboundedSender<NetEvent>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_disposing(&self) -> bool {
        self.disposing.load(Ordering::Acquire)
    }

    fn touch(&self) {
        *lock(&self.last_receive) = Instant::now();
    }

    fn emit(&self, event: NetEvent) {
        // receiver may be gone; events are advisory
        let _ = self.events.send(event);
    }

    /// Start disposal. Returns false if it had already started.
    fn begin_dispose(&self, reason: DisconnectReason) -> bool {
        if self.disposing.swap(true, Ordering::AcqRel) {
            return false;
        }
        *lock(&self.reason) = Some(reason.clone());

        if self.transition(ConnectionState::Unconnected, ConnectionState::Disposed) {
            // no actor was ever spawned
            debug!(%reason, "Disposed before connecting");
            self.emit(NetEvent::Disconnected { reason });
            return true;
        }

        self.set_state(ConnectionState::Disposing);
        self.dispose_signal.notify_one();
        true
    }

    fn check_alive(&self, inactivity_timeout: Duration) -> bool {
        if self.is_disposing() {
            return false;
        }
        match self.state() {
            ConnectionState::Connecting => return true,
            ConnectionState::Connected => {}
            _ => return false,
        }

        let idle = lock(&self.last_receive).elapsed();
        if idle >= inactivity_timeout {
            warn!(
                idle_ms = idle.as_millis() as u64,
                timeout_ms = inactivity_timeout.as_millis() as u64,
                "No activity within the inactivity window, disposing"
            );
            self.begin_dispose(DisconnectReason::Inactive);
            return false;
        }
        true
    }
}

/// Handle to one connection
pub struct NetState {
    shared: Arc<Shared>,
    outbox: Outbox,
    inbox: Mutex<Option<Inbox>>,
    ctx: NetContext,
    client: ClientConfig,
    transport: TransportConfig,
}

impl NetState {
    /// Create an unconnected state and the receiver for its events.
    pub fn new(ctx: NetContext, config: &NetworkConfig) -> (Self, EventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbox, inbox) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            state: AtomicU8::new(ConnectionState::Unconnected as u8),
            disposing: AtomicBool::new(false),
            compression: AtomicBool::new(config.transport.compression_enabled),
            reason: Mutex::new(None),
            connected_at: Mutex::new(None),
            last_receive: Mutex::new(Instant::now()),
            peer: Mutex::new(None),
            dispose_signal: Notify::new(),
            events: events_tx,
        });

        let state = Self {
            shared,
            outbox,
            inbox: Mutex::new(Some(inbox)),
            ctx,
            client: config.client.clone(),
            transport: config.transport.clone(),
        };
        (state, events_rx)
    }

    /// Start connecting to `ip:port`.
    ///
    /// Returns as soon as the connection task is spawned; success or failure
    /// of the connect itself arrives as a [`NetEvent`].
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidAddress`] unless `ip` is a numeric IPv4/IPv6
    ///   address and `port` is non-zero. Host names are never resolved.
    /// - [`ProtocolError::ConfigError`] when the client or transport
    ///   configuration does not validate.
    /// - [`ProtocolError::InvalidState`] unless the state is `Unconnected`.
    /// - [`ProtocolError::NoRuntime`] outside a tokio runtime.
    #[instrument(skip(self))]
    pub fn connect(&self, ip: &str, port: u16) -> Result<()> {
        let addr = parse_address(ip, port)?;

        let problems: Vec<String> = self
            .client
            .validate()
            .into_iter()
            .chain(self.transport.validate())
            .collect();
        if !problems.is_empty() {
            return Err(ProtocolError::ConfigError(problems.join("; ")));
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ProtocolError::NoRuntime)?;

        if self.shared.is_disposing()
            || !self
                .shared
                .transition(ConnectionState::Unconnected, ConnectionState::Connecting)
        {
            return Err(ProtocolError::InvalidState(self.shared.state()));
        }

        let Some(inbox) = lock(&self.inbox).take() else {
            return Err(ProtocolError::InvalidState(self.shared.state()));
        };
        *lock(&self.shared.peer) = Some(addr);

        let pump = MessagePump::new(Arc::clone(&self.ctx.handlers), self.ctx.buffers.clone())
            .with_metrics(Arc::clone(&self.ctx.metrics));

        let connection = Connection {
            shared: Arc::clone(&self.shared),
            ctx: self.ctx.clone(),
            client: self.client.clone(),
            transport: self.transport.clone(),
            byte_queue: ByteQueue::with_capacity(self.transport.receive_buffer_size * 4),
            send_queue: SendQueue::new(
                self.transport.send_queue_capacity,
                self.transport.coalesce_limit,
            ),
            pump,
            writer: None,
            in_flight: Vec::new(),
            was_connected: false,
        };

        debug!(peer = %addr, "Spawning connection task");
        runtime.spawn(connection.run(addr, inbox));
        Ok(())
    }

    /// Queue `packet` for sending.
    ///
    /// Never fails and never blocks. If the connection is not running the
    /// packet's completion callback runs immediately with
    /// [`SendOutcome::Dropped`]. Packets sent while connecting go out once
    /// the connection is established.
    pub fn send<P>(&self, packet: P)
    where
        P: Packet + 'static,
    {
        let mut packet: Box<dyn Packet> = Box::new(packet);

        if self.shared.is_disposing() || !self.shared.state().is_running() {
            trace!(
                id = format_args!("{:#04x}", packet.id()),
                "Send on a connection that is not running"
            );
            self.ctx.metrics.packet_dropped();
            packet.on_sent(SendOutcome::Dropped);
            return;
        }

        if let Err(mpsc::error::SendError(mut packet)) = self.outbox.send(packet) {
            self.ctx.metrics.packet_dropped();
            packet.on_sent(SendOutcome::Dropped);
        }
    }

    /// Dispose the connection. Safe to call any number of times.
    pub fn dispose(&self) {
        if self.shared.begin_dispose(DisconnectReason::Requested) {
            debug!("Dispose requested");
        }
    }

    /// Liveness probe: disposes the connection as inactive when nothing was
    /// received within `inactivity_timeout`. Returns whether it is still alive.
    pub fn check_alive(&self) -> bool {
        self.shared.check_alive(self.client.inactivity_timeout)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state() == ConnectionState::Connected && !self.shared.is_disposing()
    }

    /// Time since the connection was established, zero when not connected
    pub fn connected_duration(&self) -> Duration {
        lock(&self.shared.connected_at)
            .map(|since| since.elapsed())
            .unwrap_or_default()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        *lock(&self.shared.peer)
    }

    /// Reason recorded when disposal started
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        lock(&self.shared.reason).clone()
    }

    pub fn set_compression(&self, enabled: bool) {
        self.shared.compression.store(enabled, Ordering::Release);
    }

    pub fn is_compression_enabled(&self) -> bool {
        self.shared.compression.load(Ordering::Acquire)
    }

    pub fn context(&self) -> &NetContext {
        &self.ctx
    }
}

impl Drop for NetState {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for NetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetState")
            .field("state", &self.state())
            .field("peer", &self.peer())
            .field("compression", &self.is_compression_enabled())
            .finish()
    }
}

/// Parse a numeric address; host names are rejected, not resolved
fn parse_address(ip: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = ip
        .trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidAddress(ip.to_string()))?;
    if port == 0 {
        return Err(ProtocolError::InvalidAddress(format!("{ip}:0")));
    }
    Ok(SocketAddr::new(ip, port))
}

/// Results posted back to the actor by its reader and writer tasks
enum Completion {
    Received(PooledBuffer, usize),
    ReceiveFailed(io::Error),
    Sent(io::Result<usize>),
}

struct Writer {
    grams: mpsc::UnboundedSender<Bytes>,
    task: JoinHandle<()>,
}

/// The actor. Owns the queues and the socket halves for its whole life.
struct Connection {
    shared: Arc<Shared>,
    ctx: NetContext,
    client: ClientConfig,
    transport: TransportConfig,
    byte_queue: ByteQueue,
    send_queue: SendQueue<Box<dyn Packet>>,
    pump: MessagePump,
    writer: Option<Writer>,
    /// Packets whose bytes the writer task currently holds
    in_flight: Vec<Box<dyn Packet>>,
    was_connected: bool,
}

impl Connection {
    #[instrument(name = "connection", skip_all, fields(peer = %addr))]
    async fn run(mut self, addr: SocketAddr, mut inbox: Inbox) {
        let shared = Arc::clone(&self.shared);

        let connected = tokio::select! {
            biased;
            _ = shared.dispose_signal.notified() => None,
            result = tokio::time::timeout(self.client.connect_timeout, TcpStream::connect(addr)) => {
                match result {
                    Ok(Ok(stream)) => Some(stream),
                    Ok(Err(e)) => {
                        error!(error = %e, "Connect failed");
                        self.ctx.metrics.connect_failed();
                        shared.begin_dispose(DisconnectReason::ConnectFailed(e.to_string()));
                        None
                    }
                    Err(_) => {
                        error!(
                            timeout_ms = self.client.connect_timeout.as_millis() as u64,
                            "Connect timed out"
                        );
                        self.ctx.metrics.connect_failed();
                        shared.begin_dispose(DisconnectReason::ConnectFailed(
                            ProtocolError::ConnectTimeout.to_string(),
                        ));
                        None
                    }
                }
            }
        };

        let Some(stream) = connected else {
            self.finish(&mut inbox, None, None).await;
            return;
        };

        if self.client.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let (read_half, write_half) = stream.into_split();
        let (completions_tx, mut completions) = mpsc::unbounded_channel();

        // receiving starts only once connected
        let reader = tokio::spawn(receive_loop(
            read_half,
            self.ctx.buffers.clone(),
            completions_tx.clone(),
        ));
        let (grams_tx, grams_rx) = mpsc::unbounded_channel();
        self.writer = Some(Writer {
            grams: grams_tx,
            task: tokio::spawn(send_loop(write_half, grams_rx, completions_tx)),
        });

        if shared.transition(ConnectionState::Connecting, ConnectionState::Connected) {
            *lock(&shared.connected_at) = Some(Instant::now());
            shared.touch();
            self.was_connected = true;
            self.ctx.metrics.connection_established();
            info!("Connected");
            shared.emit(NetEvent::Connected { peer: addr });
        }

        let probe_enabled = !self.client.liveness_check_interval.is_zero();
        let mut probe = tokio::time::interval(
            self.client
                .liveness_check_interval
                .max(Duration::from_millis(1)),
        );
        probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        probe.tick().await;

        loop {
            let step = tokio::select! {
                biased;
                _ = shared.dispose_signal.notified() => break,
                Some(completion) = completions.recv() => self.on_completion(completion),
                Some(packet) = inbox.recv() => self.on_send(packet),
                _ = probe.tick(), if probe_enabled => {
                    shared.check_alive(self.client.inactivity_timeout);
                    Ok(())
                }
                else => Err(DisconnectReason::Socket("connection tasks stopped".to_string())),
            };

            if let Err(reason) = step {
                shared.begin_dispose(reason);
                break;
            }
        }

        self.finish(&mut inbox, Some(reader), Some(completions)).await;
    }

    fn on_completion(&mut self, completion: Completion) -> std::result::Result<(), DisconnectReason> {
        match completion {
            Completion::Received(_, 0) => {
                info!("Remote closed the connection");
                Err(DisconnectReason::RemoteClosed)
            }
            Completion::Received(lease, n) => {
                self.ctx.metrics.received(n as u64);
                self.byte_queue.enqueue(&lease[..n]);
                drop(lease);
                self.shared.touch();
                trace!(bytes = n, buffered = self.byte_queue.len(), "Received");
                self.pump_received()
            }
            Completion::ReceiveFailed(e) => {
                error!(error = %e, "Receive failed");
                self.ctx.metrics.connection_error();
                Err(DisconnectReason::Socket(e.to_string()))
            }
            Completion::Sent(Ok(bytes)) => {
                self.written(bytes);
                self.flush()
            }
            Completion::Sent(Err(e)) => {
                error!(error = %e, "Send failed");
                self.ctx.metrics.connection_error();
                Err(DisconnectReason::Socket(e.to_string()))
            }
        }
    }

    fn pump_received(&mut self) -> std::result::Result<(), DisconnectReason> {
        let shared = &self.shared;
        match self
            .pump
            .pump_while(&mut self.byte_queue, || !shared.is_disposing())
        {
            Ok(_) => Ok(()),
            Err(e @ ProtocolError::UnknownPacket(_)) if !self.client.disconnect_on_unknown_packet => {
                warn!(error = %e, "Skipped unknown packet, buffered bytes discarded");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Malformed inbound frame");
                self.ctx.metrics.protocol_error();
                Err(DisconnectReason::Protocol(e.to_string()))
            }
        }
    }

    fn on_send(&mut self, mut packet: Box<dyn Packet>) -> std::result::Result<(), DisconnectReason> {
        if self.shared.is_disposing() {
            self.ctx.metrics.packet_dropped();
            packet.on_sent(SendOutcome::Dropped);
            return Ok(());
        }

        let gram = match self.compile(packet.as_ref()) {
            Ok(gram) => gram,
            Err(e) => {
                error!(id = format_args!("{:#04x}", packet.id()), error = %e, "Packet compile failed");
                self.ctx.metrics.packet_dropped();
                packet.on_sent(SendOutcome::Dropped);
                return Err(DisconnectReason::InvalidPacket(e.to_string()));
            }
        };

        let id = packet.id();
        let bytes = gram.len();
        if let Err(Rejected { error, mut token }) = self.send_queue.enqueue(gram, packet) {
            error!(error = %error, "Send backlog too large, remote cannot keep up");
            self.ctx.metrics.packet_dropped();
            token.on_sent(SendOutcome::Dropped);
            return Err(DisconnectReason::SendCapacityExceeded(error.to_string()));
        }

        trace!(id = format_args!("{:#04x}", id), bytes, "Queued");
        self.flush()
    }

    /// The writer finished the in-flight transmission
    fn written(&mut self, bytes: usize) {
        let packets = std::mem::take(&mut self.in_flight);
        self.ctx.metrics.transmitted(bytes as u64, packets.len());
        for mut packet in packets {
            self.ctx.metrics.packet_sent();
            packet.on_sent(SendOutcome::Sent);
        }
        self.send_queue.complete();
    }

    fn drop_packets(&self, packets: Vec<Box<dyn Packet>>) {
        for mut packet in packets {
            self.ctx.metrics.packet_dropped();
            packet.on_sent(SendOutcome::Dropped);
        }
    }

    /// Frame the packet and wrap it in a compression envelope if enabled
    fn compile(&self, packet: &dyn Packet) -> Result<Bytes> {
        let mut writer = self.ctx.writers.acquire(packet.size_hint());
        let compiled = packet.compile(&mut writer);
        let bytes = writer.take_bytes();
        self.ctx.writers.release(writer);
        compiled?;

        if bytes.is_empty() {
            return Err(ProtocolError::EmptyPacket(packet.id()));
        }

        if !self.shared.compression.load(Ordering::Acquire) {
            return Ok(bytes);
        }

        let (envelope, compressed) = encode_envelope(
            &bytes,
            &self.transport.compression_kind,
            self.transport.compression_threshold_bytes,
        )?;
        if compressed {
            self.ctx.metrics.gram_compressed();
        }
        Ok(Bytes::from(envelope))
    }

    /// Hand the next (possibly merged) transmission to the writer task
    fn flush(&mut self) -> std::result::Result<(), DisconnectReason> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };
        if !self.send_queue.check_flush_ready() {
            return Ok(());
        }
        let Some(transmission) = self.send_queue.dequeue() else {
            return Ok(());
        };

        self.in_flight = transmission.tokens;
        writer
            .grams
            .send(transmission.bytes)
            .map_err(|_| DisconnectReason::Socket("send loop stopped".to_string()))
    }

    async fn finish(
        mut self,
        inbox: &mut Inbox,
        reader: Option<JoinHandle<()>>,
        completions: Option<mpsc::UnboundedReceiver<Completion>>,
    ) {
        let shared = Arc::clone(&self.shared);
        shared.begin_dispose(DisconnectReason::Requested);
        let reason = lock(&shared.reason)
            .clone()
            .unwrap_or(DisconnectReason::Requested);

        inbox.close();
        while let Ok(mut packet) = inbox.try_recv() {
            self.ctx.metrics.packet_dropped();
            packet.on_sent(SendOutcome::Dropped);
        }

        if let Some(reader) = reader {
            reader.abort();
        }

        if let Some(Writer { grams, mut task }) = self.writer.take() {
            drop(grams);
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("Socket shutdown timed out, aborting writer");
                task.abort();
                // no completion may land after the drain below
                let _ = task.await;
            }
        }

        // a write that finished before the writer stopped still counts
        if let Some(mut completions) = completions {
            completions.close();
            while let Ok(completion) = completions.try_recv() {
                if let Completion::Sent(Ok(bytes)) = completion {
                    if !self.in_flight.is_empty() {
                        self.written(bytes);
                    }
                }
            }
        }

        let unsent = std::mem::take(&mut self.in_flight)
            .into_iter()
            .chain(self.send_queue.clear())
            .collect::<Vec<_>>();
        if !unsent.is_empty() {
            debug!(packets = unsent.len(), "Dropping unsent packets");
        }
        self.drop_packets(unsent);
        self.byte_queue.clear();

        if self.was_connected {
            self.ctx.metrics.connection_closed();
        }
        *lock(&shared.connected_at) = None;
        shared.set_state(ConnectionState::Disposed);

        if reason.is_error() {
            info!(%reason, "Connection disposed");
        } else {
            debug!(%reason, "Connection disposed");
        }
        self.ctx.metrics.log_metrics();
        shared.emit(NetEvent::Disconnected { reason });
    }
}

async fn receive_loop(
    mut socket: OwnedReadHalf,
    buffers: BufferPool,
    completions: mpsc::UnboundedSender<Completion>,
) {
    loop {
        let mut lease = buffers.acquire();
        let (completion, stop) = match socket.read(&mut lease[..]).await {
            Ok(n) => (Completion::Received(lease, n), n == 0),
            Err(e) => (Completion::ReceiveFailed(e), true),
        };
        if completions.send(completion).is_err() || stop {
            break;
        }
    }
}

async fn send_loop(
    mut socket: OwnedWriteHalf,
    mut grams: mpsc::UnboundedReceiver<Bytes>,
    completions: mpsc::UnboundedSender<Completion>,
) {
    while let Some(gram) = grams.recv().await {
        let result = socket.write_all(&gram).await.map(|_| gram.len());
        let failed = result.is_err();
        if completions.send(Completion::Sent(result)).is_err() || failed {
            break;
        }
    }

    if let Err(e) = socket.shutdown().await {
        debug!(error = %e, "Socket shutdown failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::FramedPacket;
    use crate::protocol::handlers::PacketHandlers;
    use std::sync::atomic::AtomicUsize;

    fn new_state() -> (NetState, EventReceiver) {
        let config = NetworkConfig::default();
        let ctx = NetContext::new(PacketHandlers::new(), &config.transport);
        NetState::new(ctx, &config)
    }

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            ConnectionState::Unconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disposing,
            ConnectionState::Disposed,
        ] {
            assert_eq!(ConnectionState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn host_names_are_rejected() {
        assert!(matches!(
            parse_address("localhost", 2593),
            Err(ProtocolError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_address("127.0.0.1", 0),
            Err(ProtocolError::InvalidAddress(_))
        ));
        assert_eq!(
            parse_address(" ::1 ", 2593).unwrap(),
            "[::1]:2593".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn connect_outside_runtime_fails() {
        let (state, _events) = new_state();
        assert!(matches!(
            state.connect("127.0.0.1", 2593),
            Err(ProtocolError::NoRuntime)
        ));
        assert_eq!(state.state(), ConnectionState::Unconnected);
    }

    #[test]
    fn connect_rejects_invalid_config() {
        let config = NetworkConfig::default_with_overrides(|c| {
            c.transport.receive_buffer_size = 0;
        });
        let ctx = NetContext::new(PacketHandlers::new(), &config.transport);
        let (state, mut events) = NetState::new(ctx, &config);

        match state.connect("127.0.0.1", 2593) {
            Err(ProtocolError::ConfigError(message)) => {
                assert!(message.contains("Receive buffer size"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(state.state(), ConnectionState::Unconnected);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn dispose_before_connect_is_terminal_and_idempotent() {
        let (state, mut events) = new_state();
        state.dispose();
        state.dispose();

        assert_eq!(state.state(), ConnectionState::Disposed);
        assert_eq!(
            events.try_recv().unwrap(),
            NetEvent::Disconnected {
                reason: DisconnectReason::Requested
            }
        );
        assert!(events.try_recv().is_err());
        assert!(!state.check_alive());
    }

    #[test]
    fn send_when_not_running_reports_dropped() {
        let (state, _events) = new_state();
        let outcomes = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&outcomes);
        state.send(FramedPacket::fixed(0x01, 3, vec![1, 2]).with_callback(move |outcome| {
            assert_eq!(outcome, SendOutcome::Dropped);
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(outcomes.load(Ordering::SeqCst), 1);
        assert_eq!(state.context().metrics.snapshot().packets_dropped, 1);
    }

    #[test]
    fn disconnect_reason_display() {
        assert_eq!(
            DisconnectReason::RemoteClosed.to_string(),
            "Connection closed by remote"
        );
        assert!(!DisconnectReason::Requested.is_error());
        assert!(DisconnectReason::Inactive.is_error());
    }
}
