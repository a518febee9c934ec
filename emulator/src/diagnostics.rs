//! Bridges core diagnostics onto `tracing`.

use tracing::{debug, info, warn};
use trainer_core::telemetry::{Diagnostic, DiagnosticSink};

/// Forwards every diagnostic to the installed `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&mut self, diagnostic: Diagnostic<'_>) {
        match diagnostic {
            Diagnostic::Received { from, text } => debug!(%from, text, "received"),
            Diagnostic::Sent { to, text } => debug!(%to, text, "sent"),
            Diagnostic::SendSkipped { text } => warn!(text, "no peer yet, message dropped"),
            Diagnostic::SendFailed { to, text } => warn!(%to, text, "send failed"),
            Diagnostic::ReceiveFailed => warn!("receive failed, treated as idle"),
            Diagnostic::WaitStarted { targets } => info!(?targets, "waiting for operator"),
            Diagnostic::WaitMatched { text } => info!(text, "operator replied"),
            Diagnostic::WaitDiscarded { text } => debug!(text, "discarded during wait"),
            Diagnostic::WaitDeferred { text } => info!(text, "deferred until wait ends"),
            Diagnostic::DeferredOverflow { text } => {
                warn!(text, "deferred queue full, command dropped");
            }
            Diagnostic::WaitTimedOut => warn!("wait timed out"),
            Diagnostic::RunStarted { index, profile } => {
                info!(index, %profile, "run started");
            }
            Diagnostic::RunStopped => info!("run stopped"),
            Diagnostic::RunCompleted => info!("run completed"),
            Diagnostic::StageFired { stage, distance } => info!(%stage, distance, "stage fired"),
            Diagnostic::BrakeChanged { state } => info!(%state, "brake"),
            Diagnostic::Rewound => info!("cord rewound"),
        }
    }
}
