//! The emulated trainer: core dispatcher wired to host peripherals.

use std::io;
use std::net::SocketAddr;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};
use trainer_core::actuator::Actuator;
use trainer_core::channel::CommandChannel;
use trainer_core::dispatch::{Dispatcher, TickReport};
use trainer_core::distance::MonotonicDistance;
use trainer_core::sequencer::{Sequencer, TickOutcome};

use crate::config::EmulatorConfig;
use crate::console::ConsoleRequest;
use crate::diagnostics::TracingSink;
use crate::error::EmulatorError;
use crate::hardware::{HostPause, SimulatedBrake, SimulatedCord, SimulatedEncoder};
use crate::net::UdpTransport;

type Device = Dispatcher<
    UdpTransport,
    HostPause,
    TracingSink,
    SimulatedBrake,
    MonotonicDistance<SimulatedEncoder>,
    StdRng,
>;

pub struct Emulator {
    device: Device,
    cord: SimulatedCord,
    tick_interval: Duration,
}

impl Emulator {
    /// Generates the profile bank, binds the socket and powers up released.
    pub fn build(config: &EmulatorConfig) -> Result<Self, EmulatorError> {
        let sequencer_config = config.sequencer_config()?;
        if !sequencer_config.ranges.is_disjoint() {
            warn!("profile ranges overlap, generated thresholds may be out of order");
        }

        let mut rng = match config.simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let bank = config.profile_bank(&mut rng)?;
        for (index, profile) in bank.iter().enumerate() {
            debug!(index, %profile, ordered = profile.is_ordered(), "profile");
        }

        let transport = UdpTransport::bind(config.network.bind)?;
        let channel =
            CommandChannel::new(transport, HostPause, TracingSink, config.channel_config());

        let cord = SimulatedCord::new();
        let encoder = SimulatedEncoder::new(cord.clone(), config.simulation.pull_rate_cm_per_s);
        let device = Dispatcher::new(
            channel,
            Sequencer::new(bank, sequencer_config),
            Actuator::new(SimulatedBrake::new(cord.clone())),
            MonotonicDistance::new(encoder),
            rng,
        );

        Ok(Self {
            device,
            cord,
            tick_interval: config.tick_interval(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.device.channel().transport().local_addr()
    }

    /// Shared cord handle for the console.
    #[must_use]
    pub fn cord(&self) -> SimulatedCord {
        self.cord.clone()
    }

    /// Runs one dispatch tick and logs what happened.
    pub fn step(&mut self) -> TickReport {
        let report = self.device.tick();
        if let Some(handled) = report.handled {
            info!(%handled, "command handled");
        }
        match report.outcome {
            TickOutcome::Progressed { last } => {
                debug!(%last, distance = report.distance, "sequence progressed");
            }
            TickOutcome::Completed => info!(distance = report.distance, "sequence complete"),
            TickOutcome::Interrupted { stage, error } => {
                warn!(%stage, %error, "stage interrupted, retrying next tick");
            }
            TickOutcome::Inactive | TickOutcome::Quiet => {}
        }
        report
    }

    /// Ticks until the console asks to quit.
    pub fn serve(&mut self, requests: &Receiver<ConsoleRequest>) {
        loop {
            self.step();
            loop {
                match requests.try_recv() {
                    Ok(ConsoleRequest::Inject(text)) => {
                        self.device.channel_mut().send_to_last(&text);
                    }
                    Ok(ConsoleRequest::Status) => self.log_status(),
                    Ok(ConsoleRequest::Quit) => {
                        info!("console requested shutdown");
                        return;
                    }
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
                }
            }
            thread::sleep(self.tick_interval);
        }
    }

    fn log_status(&self) {
        let peer = self
            .device
            .channel()
            .last_endpoint()
            .map(|endpoint| endpoint.to_string());
        info!(
            status = %self.device.status(),
            brake = %self.device.actuator().state(),
            position = self.cord.position(),
            rewinds = self.device.actuator().rewind_count(),
            peer = peer.as_deref().unwrap_or("none"),
            "status"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;

    use trainer_core::profile::Stage;

    use super::*;

    fn loopback_config() -> EmulatorConfig {
        let rows = vec!["[10.0, 20.0, 30.0, 40.0]"; 10].join(", ");
        EmulatorConfig::parse(&format!(
            r#"
            [network]
            bind = "127.0.0.1:0"

            [sequencer]
            wait_timeout_ms = 2000

            [profiles]
            fixed = [{rows}]

            [simulation]
            seed = 3
            "#
        ))
        .unwrap()
    }

    #[test]
    fn operator_sees_echo_ack_and_notifications_in_order() {
        let mut emulator = Emulator::build(&loopback_config()).unwrap();
        let device = emulator.local_addr().unwrap();
        emulator.cord().set_position(32.0);

        let operator = thread::spawn(move || {
            let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
            socket
                .set_read_timeout(Some(Duration::from_secs(2)))
                .unwrap();
            socket.send_to(b"Start", device).unwrap();

            let mut seen = Vec::new();
            let mut buffer = [0_u8; 300];
            while let Ok((len, _)) = socket.recv_from(&mut buffer) {
                let text = String::from_utf8_lossy(&buffer[..len]).into_owned();
                if text == "HighDamp" {
                    socket.send_to(b"OK", device).unwrap();
                }
                let done = text == "ACK: OK";
                seen.push(text);
                if done {
                    break;
                }
            }
            seen
        });

        let mut progressed = false;
        for _ in 0..400 {
            let report = emulator.step();
            if report.outcome == (TickOutcome::Progressed { last: Stage::HighDamp }) {
                progressed = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        let seen = operator.join().unwrap();
        assert!(progressed);
        assert_eq!(
            seen,
            [
                "Start",
                "ACK: Start",
                "Pain1",
                "Pain2",
                "HighDamp",
                "OK",
                "ACK: OK"
            ]
        );
    }
}
