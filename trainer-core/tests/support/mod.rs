#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::rc::Rc;
use std::time::Duration;

use trainer_core::actuator::{ActuatorDriver, BrakeState};
use trainer_core::channel::{
    ChannelConfig, CommandChannel, DatagramTransport, Pause, RemoteEndpoint,
};
use trainer_core::distance::DistanceSource;
use trainer_core::telemetry::TelemetryLog;

pub type TestChannel = CommandChannel<ScriptedTransport, CountingPause, TelemetryLog<256>>;

pub fn peer() -> RemoteEndpoint {
    RemoteEndpoint::new(IpAddr::V4(Ipv4Addr::new(192, 168, 4, 2)), 50_000)
}

pub fn other_peer() -> RemoteEndpoint {
    RemoteEndpoint::new(IpAddr::V4(Ipv4Addr::new(192, 168, 4, 3)), 50_001)
}

#[derive(Debug)]
pub struct TransportFault;

enum Inbound {
    Datagram { from: RemoteEndpoint, payload: Vec<u8> },
    Quiet,
    Fault,
}

struct ReplyRule {
    trigger: String,
    from: RemoteEndpoint,
    reply: String,
}

/// In-memory transport fed from a script, with canned replies to outbound text.
#[derive(Default)]
pub struct ScriptedTransport {
    inbound: VecDeque<Inbound>,
    rules: Vec<ReplyRule>,
    sent: Vec<(RemoteEndpoint, String)>,
    receive_calls: usize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a datagram from `from`.
    pub fn push(&mut self, from: RemoteEndpoint, text: &str) -> &mut Self {
        self.push_bytes(from, text.as_bytes())
    }

    pub fn push_bytes(&mut self, from: RemoteEndpoint, payload: &[u8]) -> &mut Self {
        self.inbound.push_back(Inbound::Datagram {
            from,
            payload: payload.to_vec(),
        });
        self
    }

    /// Queues `polls` empty receive attempts.
    pub fn push_quiet(&mut self, polls: usize) -> &mut Self {
        for _ in 0..polls {
            self.inbound.push_back(Inbound::Quiet);
        }
        self
    }

    /// Queues a receive error.
    pub fn push_fault(&mut self) -> &mut Self {
        self.inbound.push_back(Inbound::Fault);
        self
    }

    /// When `trigger` is next sent, `reply` arrives from `from`. Each rule fires once.
    pub fn reply_to(&mut self, trigger: &str, from: RemoteEndpoint, reply: &str) -> &mut Self {
        self.rules.push(ReplyRule {
            trigger: trigger.to_string(),
            from,
            reply: reply.to_string(),
        });
        self
    }

    pub fn sent(&self) -> &[(RemoteEndpoint, String)] {
        &self.sent
    }

    pub fn sent_texts(&self) -> Vec<&str> {
        self.sent.iter().map(|(_, text)| text.as_str()).collect()
    }

    pub fn count_sent(&self, text: &str) -> usize {
        self.sent.iter().filter(|(_, sent)| sent == text).count()
    }

    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    pub fn receive_calls(&self) -> usize {
        self.receive_calls
    }
}

impl DatagramTransport for ScriptedTransport {
    type Error = TransportFault;

    fn try_recv(
        &mut self,
        buffer: &mut [u8],
    ) -> Result<Option<(usize, RemoteEndpoint)>, Self::Error> {
        self.receive_calls += 1;
        match self.inbound.pop_front() {
            None | Some(Inbound::Quiet) => Ok(None),
            Some(Inbound::Fault) => Err(TransportFault),
            Some(Inbound::Datagram { from, payload }) => {
                let len = payload.len().min(buffer.len());
                buffer[..len].copy_from_slice(&payload[..len]);
                Ok(Some((len, from)))
            }
        }
    }

    fn send_to(&mut self, endpoint: RemoteEndpoint, payload: &[u8]) -> Result<(), Self::Error> {
        let text = String::from_utf8_lossy(payload).into_owned();
        if let Some(position) = self.rules.iter().position(|rule| rule.trigger == text) {
            let rule = self.rules.remove(position);
            self.inbound.push_back(Inbound::Datagram {
                from: rule.from,
                payload: rule.reply.into_bytes(),
            });
        }
        self.sent.push((endpoint, text));
        Ok(())
    }
}

/// Pause that returns immediately and counts how often it was asked to sleep.
#[derive(Clone, Default)]
pub struct CountingPause {
    pauses: Rc<Cell<usize>>,
}

impl CountingPause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.pauses.get()
    }
}

impl Pause for CountingPause {
    fn pause(&mut self, _: Duration) {
        self.pauses.set(self.pauses.get() + 1);
    }
}

/// Distance source that replays readings and then holds the last one.
#[derive(Clone, Default)]
pub struct ScriptedDistance {
    readings: Rc<RefCell<VecDeque<f32>>>,
    last: Rc<Cell<f32>>,
    resets: Rc<Cell<usize>>,
}

impl ScriptedDistance {
    pub fn new(readings: &[f32]) -> Self {
        let source = Self::default();
        source.extend(readings);
        source
    }

    pub fn extend(&self, readings: &[f32]) {
        self.readings.borrow_mut().extend(readings.iter().copied());
    }

    pub fn resets(&self) -> usize {
        self.resets.get()
    }
}

impl DistanceSource for ScriptedDistance {
    fn read(&mut self) -> f32 {
        if let Some(next) = self.readings.borrow_mut().pop_front() {
            self.last.set(next);
        }
        self.last.get()
    }

    fn reset(&mut self) {
        self.resets.set(self.resets.get() + 1);
        self.readings.borrow_mut().clear();
        self.last.set(0.0);
    }
}

/// Actuator driver that records every request.
#[derive(Default)]
pub struct RecordingDriver {
    pub brake: Vec<BrakeState>,
    pub rewinds: usize,
}

impl ActuatorDriver for RecordingDriver {
    fn drive_brake(&mut self, state: BrakeState) {
        self.brake.push(state);
    }

    fn rewind(&mut self) {
        self.rewinds += 1;
    }
}

pub fn channel(transport: ScriptedTransport, config: ChannelConfig) -> (TestChannel, CountingPause) {
    let pause = CountingPause::new();
    let channel = CommandChannel::new(transport, pause.clone(), TelemetryLog::new(), config);
    (channel, pause)
}
