//! Scripted operator console for end-to-end checks.
//!
//! Sends one command (default `Start`) and answers the trainer's prompts:
//! `HighDamp` with `OK`, `LowDamp` with `OK1` or `Continue`, and `Keep` with
//! `OK2`. Exits once the device has been quiet for `--timeout` seconds and
//! reports whether a complete flow was observed.

use std::net::{SocketAddr, UdpSocket};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LowDampPath {
    /// Ask the trainee to keep pulling.
    Continue,
    /// Release the brake straight away.
    Ok1,
}

impl LowDampPath {
    const fn reply(self) -> &'static str {
        match self {
            LowDampPath::Continue => "Continue",
            LowDampPath::Ok1 => "OK1",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "testflow")]
#[command(version)]
#[command(about = "End-to-end operator script for the cord-withdrawal trainer")]
struct Args {
    /// Trainer address.
    #[arg(long, default_value = "192.168.4.1")]
    host: String,

    /// Trainer UDP port.
    #[arg(long, default_value_t = 4210)]
    port: u16,

    /// Seconds of silence before giving up.
    #[arg(long, default_value_t = 3.0)]
    timeout: f64,

    /// Reply to `LowDamp`.
    #[arg(long, value_enum, default_value_t = LowDampPath::Continue)]
    lowdamp_path: LowDampPath,

    /// First command to send.
    #[arg(long, default_value = "Start")]
    command: String,
}

#[derive(Debug, Default)]
struct FlowProgress {
    high_damp: bool,
    low_damp: bool,
    keep: bool,
}

impl FlowProgress {
    fn complete(&self, path: LowDampPath) -> bool {
        let tail = match path {
            LowDampPath::Continue => self.keep,
            LowDampPath::Ok1 => true,
        };
        self.high_damp && self.low_damp && tail
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(progress) if progress.complete(args.lowdamp_path) => {
            info!("flow finished");
            ExitCode::SUCCESS
        }
        Ok(progress) => {
            warn!(?progress, "flow incomplete");
            ExitCode::FAILURE
        }
        Err(error) => {
            error!(%error, "testflow failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> std::io::Result<FlowProgress> {
    let trainer: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|error| std::io::Error::new(std::io::ErrorKind::InvalidInput, error))?;
    let socket = UdpSocket::bind(if trainer.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    })?;
    socket.set_read_timeout(Some(Duration::from_secs_f64(args.timeout.max(0.001))))?;

    let send = |text: &str| -> std::io::Result<()> {
        socket.send_to(text.as_bytes(), trainer)?;
        info!(text, "=>");
        Ok(())
    };

    send(&args.command)?;

    let mut progress = FlowProgress::default();
    let mut buffer = [0_u8; 1024];
    loop {
        let (len, from) = match socket.recv_from(&mut buffer) {
            Ok(received) => received,
            Err(error)
                if matches!(
                    error.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                info!("no data before timeout, exiting");
                break;
            }
            Err(error) => return Err(error),
        };

        let text = String::from_utf8_lossy(&buffer[..len]);
        let text = text.trim();
        info!(text, %from, "<=");

        match text {
            "HighDamp" => {
                progress.high_damp = true;
                send("OK")?;
            }
            "LowDamp" => {
                progress.low_damp = true;
                send(args.lowdamp_path.reply())?;
            }
            "Keep" => {
                progress.keep = true;
                send("OK2")?;
            }
            // Pain cues, echoes and ACKs are only logged.
            _ => {}
        }
    }

    Ok(progress)
}
