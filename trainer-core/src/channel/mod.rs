//! Duplex text command channel shared by dispatch and sequencer waits.
//!
//! There is exactly one remote peer: whoever sent the most recent datagram.
//! The dispatch loop pulls unsolicited commands with [`CommandChannel::poll`],
//! while the sequencer blocks mid-stage in [`CommandChannel::wait_for`] and
//! friends. While a wait is pending the channel holds an explicit waiter slot
//! and offers every inbound message to it first; [`UnmatchedPolicy`] decides
//! what happens to the rest.

use core::fmt;
use core::net::{IpAddr, SocketAddr};
use core::time::Duration;

use heapless::{Deque, Vec};

use crate::telemetry::{Diagnostic, DiagnosticSink};
use crate::wire::{self, InboundCommand, MAX_MESSAGE_LEN, Message, Notification};

/// Pause between polls while a wait is pending.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Top-level commands parked while a wait is pending.
pub const DEFERRED_DEPTH: usize = 4;

/// Tokens a single wait may accept.
pub const MAX_WAIT_TARGETS: usize = 4;

const RECEIVE_BUFFER_LEN: usize = MAX_MESSAGE_LEN + 1;

/// Address and port of the most recent sender.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct RemoteEndpoint {
    address: IpAddr,
    port: u16,
}

impl RemoteEndpoint {
    #[must_use]
    pub const fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    #[must_use]
    pub const fn address(&self) -> IpAddr {
        self.address
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl From<SocketAddr> for RemoteEndpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl From<RemoteEndpoint> for SocketAddr {
    fn from(endpoint: RemoteEndpoint) -> Self {
        SocketAddr::new(endpoint.address, endpoint.port)
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        SocketAddr::from(*self).fmt(f)
    }
}

/// Non-blocking datagram transport.
pub trait DatagramTransport {
    type Error: fmt::Debug;

    /// Reads one pending datagram into `buffer`, returning its length and
    /// sender. Returns `Ok(None)` when nothing is waiting. Datagrams longer
    /// than `buffer` may be truncated.
    ///
    /// # Errors
    ///
    /// Returns the transport's error when the receive itself fails. The
    /// channel records it and treats the poll as empty.
    fn try_recv(
        &mut self,
        buffer: &mut [u8],
    ) -> Result<Option<(usize, RemoteEndpoint)>, Self::Error>;

    /// Sends one datagram without waiting for delivery.
    ///
    /// # Errors
    ///
    /// Returns the transport's error when the datagram could not be handed
    /// off. The channel records it and does not retry.
    fn send_to(&mut self, endpoint: RemoteEndpoint, payload: &[u8]) -> Result<(), Self::Error>;
}

/// Suspends the caller between polls of a pending wait.
pub trait Pause {
    fn pause(&mut self, interval: Duration);
}

impl<P> Pause for &mut P
where
    P: Pause + ?Sized,
{
    fn pause(&mut self, interval: Duration) {
        (**self).pause(interval);
    }
}

/// Which inbound messages receive the verbatim echo and `ACK:` reply.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ReceiptAck {
    /// Every datagram is echoed and acknowledged exactly once.
    #[default]
    Always,
    /// Only messages that reach the dispatch loop are echoed and acknowledged;
    /// messages consumed by a wait get no reply.
    DispatchOnly,
}

/// Fate of messages that arrive during a wait but do not match it.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum UnmatchedPolicy {
    /// Drop them.
    #[default]
    Discard,
    /// Park `Start`, `Stop` and `Winding` until the wait ends and drop the rest.
    DeferTopLevel,
}

/// Channel tuning.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChannelConfig {
    pub poll_interval: Duration,
    pub receipt_ack: ReceiptAck,
    pub unmatched: UnmatchedPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            receipt_ack: ReceiptAck::default(),
            unmatched: UnmatchedPolicy::default(),
        }
    }
}

/// Upper bound on how long a wait may block.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum WaitLimit {
    #[default]
    Unbounded,
    Within(Duration),
}

impl WaitLimit {
    /// Number of condition checks allowed at the given poll interval, or
    /// `None` for no limit. Always at least one.
    #[must_use]
    pub fn poll_budget(self, interval: Duration) -> Option<u128> {
        match self {
            WaitLimit::Unbounded => None,
            WaitLimit::Within(timeout) => {
                let step = interval.as_nanos().max(1);
                Some(timeout.as_nanos().div_ceil(step).max(1))
            }
        }
    }
}

/// Reasons a wait returns without a match.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WaitError {
    /// The wait limit elapsed.
    TimedOut,
    /// More targets than [`MAX_WAIT_TARGETS`] were requested.
    TooManyTargets,
    /// The target list was empty, so the wait could never finish.
    NoTargets,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::TimedOut => f.write_str("wait timed out"),
            WaitError::TooManyTargets => {
                write!(f, "a wait accepts at most {MAX_WAIT_TARGETS} targets")
            }
            WaitError::NoTargets => f.write_str("wait requires at least one target"),
        }
    }
}

impl core::error::Error for WaitError {}

#[derive(Debug)]
struct WaiterSlot {
    targets: Vec<&'static str, MAX_WAIT_TARGETS>,
    matched: Option<&'static str>,
}

impl WaiterSlot {
    fn new(targets: &[&'static str]) -> Result<Self, WaitError> {
        if targets.is_empty() {
            return Err(WaitError::NoTargets);
        }
        let targets = Vec::from_slice(targets).map_err(|_| WaitError::TooManyTargets)?;
        Ok(Self {
            targets,
            matched: None,
        })
    }

    fn accept(&self, text: &str) -> Option<&'static str> {
        self.targets.iter().copied().find(|target| *target == text)
    }
}

/// The device's single command channel.
pub struct CommandChannel<T, P, S> {
    transport: T,
    pause: P,
    sink: S,
    config: ChannelConfig,
    last: Option<RemoteEndpoint>,
    waiter: Option<WaiterSlot>,
    deferred: Deque<(Message, RemoteEndpoint), DEFERRED_DEPTH>,
    buffer: [u8; RECEIVE_BUFFER_LEN],
}

impl<T, P, S> CommandChannel<T, P, S>
where
    T: DatagramTransport,
    P: Pause,
    S: DiagnosticSink,
{
    pub fn new(transport: T, pause: P, sink: S, config: ChannelConfig) -> Self {
        Self {
            transport,
            pause,
            sink,
            config,
            last: None,
            waiter: None,
            deferred: Deque::new(),
            buffer: [0; RECEIVE_BUFFER_LEN],
        }
    }

    /// Returns at most one message for the dispatch loop without blocking.
    ///
    /// See [`CommandChannel::poll_from`].
    pub fn poll(&mut self) -> Option<Message> {
        self.poll_from().map(|(message, _)| message)
    }

    /// Returns at most one message and its sender without blocking.
    ///
    /// Commands deferred during a wait are returned before the transport is
    /// read. The message is echoed verbatim to the peer that sent it, which
    /// for a deferred command may no longer be the most recent sender; the
    /// caller is responsible for the `ACK:` reply once it has acted on it.
    pub fn poll_from(&mut self) -> Option<(Message, RemoteEndpoint)> {
        let (message, from) = match self.deferred.pop_front() {
            Some(parked) => parked,
            None => self.receive()?,
        };
        self.send(from, &message);
        Some((message, from))
    }

    /// Sends `text` to `endpoint`. Failures are logged and otherwise ignored.
    pub fn send(&mut self, endpoint: RemoteEndpoint, text: &str) {
        match self.transport.send_to(endpoint, text.as_bytes()) {
            Ok(()) => self.sink.record(Diagnostic::Sent { to: endpoint, text }),
            Err(_) => self.sink.record(Diagnostic::SendFailed { to: endpoint, text }),
        }
    }

    /// Sends `text` to the most recent sender, or logs and drops it when no
    /// datagram has been received yet.
    pub fn send_to_last(&mut self, text: &str) {
        match self.last {
            Some(endpoint) => self.send(endpoint, text),
            None => self.sink.record(Diagnostic::SendSkipped { text }),
        }
    }

    /// Pushes an event notification to the peer.
    pub fn notify(&mut self, notification: Notification) {
        self.send_to_last(notification.as_str());
    }

    /// Echoes `text` back verbatim.
    pub fn echo(&mut self, text: &str) {
        self.send_to_last(text);
    }

    /// Sends `ACK: <text>`.
    pub fn acknowledge(&mut self, text: &str) {
        self.send_to_last(&wire::acknowledgment(text));
    }

    /// Sends `ACK: <text>` to `endpoint`.
    pub fn acknowledge_to(&mut self, endpoint: RemoteEndpoint, text: &str) {
        self.send(endpoint, &wire::acknowledgment(text));
    }

    /// Blocks until a message exactly equal to `target` arrives.
    ///
    /// # Errors
    ///
    /// [`WaitError::TimedOut`] once `limit` runs out.
    pub fn wait_for(&mut self, target: &'static str, limit: WaitLimit) -> Result<(), WaitError> {
        self.wait_for_any(&[target], limit).map(|_| ())
    }

    /// Blocks until a message exactly equal to one of `targets` arrives and
    /// returns the one that matched.
    ///
    /// # Errors
    ///
    /// [`WaitError::NoTargets`] or [`WaitError::TooManyTargets`] before
    /// anything is read, and [`WaitError::TimedOut`] once `limit` runs out.
    pub fn wait_for_any(
        &mut self,
        targets: &[&'static str],
        limit: WaitLimit,
    ) -> Result<&'static str, WaitError> {
        let slot = WaiterSlot::new(targets)?;
        self.sink.record(Diagnostic::WaitStarted { targets });
        self.waiter = Some(slot);

        let outcome = self.wait_until(limit, Self::offer_to_waiter);
        let matched = self.waiter.take().and_then(|slot| slot.matched);

        outcome?;
        matched.ok_or(WaitError::TimedOut)
    }

    /// Re-evaluates `condition` every poll interval until it holds or the
    /// limit runs out. The condition is checked once before the first pause.
    ///
    /// # Errors
    ///
    /// [`WaitError::TimedOut`] once `limit` runs out.
    pub fn wait_until<F>(&mut self, limit: WaitLimit, mut condition: F) -> Result<(), WaitError>
    where
        F: FnMut(&mut Self) -> bool,
    {
        let interval = self.config.poll_interval;
        let budget = limit.poll_budget(interval);
        let mut checks: u128 = 0;

        loop {
            if condition(self) {
                return Ok(());
            }
            checks += 1;
            if budget.is_some_and(|budget| checks >= budget) {
                self.sink.record(Diagnostic::WaitTimedOut);
                return Err(WaitError::TimedOut);
            }
            self.pause.pause(interval);
        }
    }

    /// Most recent sender, if any datagram has arrived.
    #[must_use]
    pub const fn last_endpoint(&self) -> Option<RemoteEndpoint> {
        self.last
    }

    /// Returns `true` while a wait holds the waiter slot.
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        self.waiter.is_some()
    }

    /// Number of commands parked for the dispatch loop.
    #[must_use]
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    #[must_use]
    pub const fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Forwards a diagnostic to the channel's sink.
    pub fn record(&mut self, diagnostic: Diagnostic<'_>) {
        self.sink.record(diagnostic);
    }

    #[must_use]
    pub const fn diagnostics(&self) -> &S {
        &self.sink
    }

    pub fn diagnostics_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn receive(&mut self) -> Option<(Message, RemoteEndpoint)> {
        match self.transport.try_recv(&mut self.buffer) {
            Ok(Some((len, from))) => {
                self.last = Some(from);
                let message = wire::decode_datagram(&self.buffer[..len.min(RECEIVE_BUFFER_LEN)]);
                self.sink.record(Diagnostic::Received {
                    from,
                    text: &message,
                });
                Some((message, from))
            }
            Ok(None) => None,
            Err(_) => {
                self.sink.record(Diagnostic::ReceiveFailed);
                None
            }
        }
    }

    fn reply_at_receipt(&mut self, text: &str) {
        if self.config.receipt_ack == ReceiptAck::Always {
            self.echo(text);
            self.acknowledge(text);
        }
    }

    fn offer_to_waiter(&mut self) -> bool {
        let Some((message, from)) = self.receive() else {
            return false;
        };

        let accepted = self
            .waiter
            .as_ref()
            .and_then(|slot| slot.accept(&message));
        if let Some(target) = accepted {
            if let Some(slot) = self.waiter.as_mut() {
                slot.matched = Some(target);
            }
            self.sink.record(Diagnostic::WaitMatched { text: &message });
            self.reply_at_receipt(&message);
            return true;
        }

        let top_level = InboundCommand::classify(&message).top_level().is_some();
        if self.config.unmatched == UnmatchedPolicy::DeferTopLevel && top_level {
            // Deferred commands are echoed by `poll` and acknowledged by dispatch.
            match self.deferred.push_back((message, from)) {
                Ok(()) => {
                    if let Some((parked, _)) = self.deferred.back() {
                        self.sink.record(Diagnostic::WaitDeferred { text: parked });
                    }
                }
                Err((message, _)) => {
                    self.sink
                        .record(Diagnostic::DeferredOverflow { text: &message });
                    self.reply_at_receipt(&message);
                }
            }
            return false;
        }

        self.sink.record(Diagnostic::WaitDiscarded { text: &message });
        self.reply_at_receipt(&message);
        false
    }
}
