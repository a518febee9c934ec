mod support;

use core::time::Duration;

use support::{ScriptedTransport, channel, other_peer, peer};
use trainer_core::channel::{ChannelConfig, ReceiptAck, UnmatchedPolicy, WaitError, WaitLimit};
use trainer_core::telemetry::TelemetryEvent;
use trainer_core::wire::{InboundCommand, MAX_MESSAGE_LEN};

const GENEROUS: WaitLimit = WaitLimit::Within(Duration::from_secs(1));

#[test]
fn poll_echoes_and_records_sender() {
    let mut transport = ScriptedTransport::new();
    transport.push(peer(), "Hello");
    let (mut channel, _) = channel(transport, ChannelConfig::default());

    let message = channel.poll().expect("message");
    assert_eq!(message.as_str(), "Hello");
    assert_eq!(channel.last_endpoint(), Some(peer()));
    assert_eq!(channel.transport().sent(), &[(peer(), "Hello".to_string())]);
    assert!(channel.poll().is_none());
}

#[test]
fn endpoint_follows_most_recent_sender_even_for_unknown_text() {
    let mut transport = ScriptedTransport::new();
    transport
        .push(peer(), "Start")
        .push(other_peer(), "what is this");
    let (mut channel, _) = channel(transport, ChannelConfig::default());

    channel.poll();
    channel.poll();
    assert_eq!(channel.last_endpoint(), Some(other_peer()));

    channel.send_to_last("Pain1");
    let (to, text) = channel.transport().sent().last().expect("sent");
    assert_eq!((*to, text.as_str()), (other_peer(), "Pain1"));
}

#[test]
fn sends_before_any_peer_are_skipped() {
    let (mut channel, _) = channel(ScriptedTransport::new(), ChannelConfig::default());

    channel.send_to_last("Pain1");
    channel.acknowledge("Start");

    assert!(channel.transport().sent().is_empty());
    assert!(matches!(
        channel.diagnostics().latest(),
        Some(TelemetryEvent::SendSkipped { text }) if text.as_str() == "ACK: Start"
    ));
}

#[test]
fn poll_trims_and_truncates_payloads() {
    let mut transport = ScriptedTransport::new();
    transport
        .push(peer(), "  Start \r\n")
        .push_bytes(peer(), &[b'z'; MAX_MESSAGE_LEN + 100]);
    let (mut channel, _) = channel(transport, ChannelConfig::default());

    assert_eq!(channel.poll().expect("trimmed").as_str(), "Start");
    assert_eq!(channel.poll().expect("truncated").len(), MAX_MESSAGE_LEN);
}

#[test]
fn receive_faults_count_as_nothing_received() {
    let mut transport = ScriptedTransport::new();
    transport.push_fault().push(peer(), "Stop");
    let (mut channel, _) = channel(transport, ChannelConfig::default());

    assert!(channel.poll().is_none());
    assert_eq!(
        channel.diagnostics().latest(),
        Some(&TelemetryEvent::ReceiveFailed)
    );
    assert_eq!(channel.poll().expect("next datagram").as_str(), "Stop");
}

#[test]
fn wait_for_ignores_decoys_and_matches_only_exact_text() {
    let decoys = ["ok", "OK1", "OKAY", "Start"];
    let mut transport = ScriptedTransport::new();
    for decoy in decoys {
        transport.push(peer(), decoy);
    }
    transport.push(peer(), "OK").push(peer(), "after");
    let (mut channel, _) = channel(transport, ChannelConfig::default());

    assert_eq!(channel.wait_for("OK", WaitLimit::Unbounded), Ok(()));
    assert!(!channel.is_waiting());

    // The decoys were consumed; the next dispatch poll sees what followed.
    assert_eq!(channel.poll().expect("trailing message").as_str(), "after");
}

#[test]
fn every_datagram_is_echoed_and_acknowledged_once_during_a_wait() {
    let mut transport = ScriptedTransport::new();
    transport.push(peer(), "noise").push(peer(), "OK");
    let (mut channel, _) = channel(transport, ChannelConfig::default());

    channel.wait_for("OK", GENEROUS).expect("match");

    assert_eq!(
        channel.transport().sent_texts(),
        ["noise", "ACK: noise", "OK", "ACK: OK"]
    );
}

#[test]
fn dispatch_only_receipts_stay_silent_during_a_wait() {
    let mut transport = ScriptedTransport::new();
    transport.push(peer(), "noise").push(peer(), "OK");
    let config = ChannelConfig {
        receipt_ack: ReceiptAck::DispatchOnly,
        ..ChannelConfig::default()
    };
    let (mut channel, _) = channel(transport, config);

    channel.wait_for("OK", GENEROUS).expect("match");
    assert!(channel.transport().sent().is_empty());
    assert_eq!(channel.last_endpoint(), Some(peer()));
}

#[test]
fn wait_for_any_reports_the_matching_target() {
    let mut transport = ScriptedTransport::new();
    transport.push(peer(), "OK2").push(peer(), "Continue");
    let (mut channel, _) = channel(transport, ChannelConfig::default());

    let matched = channel.wait_for_any(&["OK1", "Continue"], GENEROUS);
    assert_eq!(matched, Ok("Continue"));
}

#[test]
fn wait_for_any_rejects_bad_target_lists() {
    let (mut channel, pause) = channel(ScriptedTransport::new(), ChannelConfig::default());

    assert_eq!(
        channel.wait_for_any(&[], GENEROUS),
        Err(WaitError::NoTargets)
    );
    assert_eq!(
        channel.wait_for_any(&["a", "b", "c", "d", "e"], GENEROUS),
        Err(WaitError::TooManyTargets)
    );
    assert_eq!(channel.transport().receive_calls(), 0);
    assert_eq!(pause.count(), 0);
}

#[test]
fn bounded_wait_times_out_after_its_poll_budget() {
    let (mut channel, pause) = channel(ScriptedTransport::new(), ChannelConfig::default());

    let result = channel.wait_for("OK", WaitLimit::Within(Duration::from_millis(50)));

    assert_eq!(result, Err(WaitError::TimedOut));
    assert_eq!(channel.transport().receive_calls(), 5);
    assert_eq!(pause.count(), 4);
    assert!(!channel.is_waiting());
    assert_eq!(
        channel.diagnostics().latest(),
        Some(&TelemetryEvent::WaitTimedOut)
    );
}

#[test]
fn wait_until_checks_before_pausing() {
    let (mut channel, pause) = channel(ScriptedTransport::new(), ChannelConfig::default());

    let mut checks = 0;
    let result = channel.wait_until(WaitLimit::Unbounded, |_| {
        checks += 1;
        checks == 3
    });

    assert_eq!(result, Ok(()));
    assert_eq!(checks, 3);
    assert_eq!(pause.count(), 2);
}

#[test]
fn matching_reply_from_new_sender_moves_the_endpoint() {
    let mut transport = ScriptedTransport::new();
    transport.push(peer(), "Start");
    transport.reply_to("HighDamp", other_peer(), "OK");
    let (mut channel, _) = channel(transport, ChannelConfig::default());

    channel.poll();
    channel.send_to_last("HighDamp");
    channel.wait_for("OK", GENEROUS).expect("match");

    assert_eq!(channel.last_endpoint(), Some(other_peer()));
    let (to, text) = channel.transport().sent().last().expect("ack");
    assert_eq!((*to, text.as_str()), (other_peer(), "ACK: OK"));
}

#[test]
fn deferred_top_level_commands_reach_dispatch_after_the_wait() {
    let mut transport = ScriptedTransport::new();
    transport
        .push(peer(), "Stop")
        .push(peer(), "noise")
        .push(peer(), "OK");
    let config = ChannelConfig {
        unmatched: UnmatchedPolicy::DeferTopLevel,
        ..ChannelConfig::default()
    };
    let (mut channel, _) = channel(transport, config);

    channel.wait_for("OK", GENEROUS).expect("match");
    assert_eq!(channel.deferred_len(), 1);
    assert_eq!(channel.transport().count_sent("Stop"), 0);
    assert_eq!(channel.transport().count_sent("ACK: noise"), 1);

    assert_eq!(channel.poll().expect("deferred").as_str(), "Stop");
    assert_eq!(channel.transport().count_sent("Stop"), 1);
    assert_eq!(channel.transport().count_sent("ACK: Stop"), 0);
    assert_eq!(channel.deferred_len(), 0);
}

#[test]
fn deferred_queue_overflow_falls_back_to_discard() {
    let mut transport = ScriptedTransport::new();
    for _ in 0..5 {
        transport.push(peer(), "Start");
    }
    transport.push(peer(), "OK");
    let config = ChannelConfig {
        unmatched: UnmatchedPolicy::DeferTopLevel,
        ..ChannelConfig::default()
    };
    let (mut channel, _) = channel(transport, config);

    channel.wait_for("OK", GENEROUS).expect("match");

    assert_eq!(channel.deferred_len(), 4);
    assert_eq!(channel.transport().count_sent("ACK: Start"), 1);
    let overflowed = channel
        .diagnostics()
        .oldest_first()
        .filter(|event| matches!(event, TelemetryEvent::DeferredOverflow { .. }))
        .count();
    assert_eq!(overflowed, 1);
}

#[test]
fn corrupted_reply_never_satisfies_a_wait() {
    let mut transport = ScriptedTransport::new();
    transport.push_bytes(peer(), b"OK\xFFgarbage");
    let (mut channel, _) = channel(transport, ChannelConfig::default());

    let result = channel.wait_for("OK", WaitLimit::Within(Duration::from_millis(30)));

    assert_eq!(result, Err(WaitError::TimedOut));
    assert_eq!(
        channel.transport().sent_texts(),
        ["OK\u{FFFD}garbage", "ACK: OK\u{FFFD}garbage"]
    );
}

#[test]
fn corrupted_command_is_not_mistaken_for_a_token() {
    let mut transport = ScriptedTransport::new();
    transport.push_bytes(peer(), b"Start\xC0\xAFxyz");
    let (mut channel, _) = channel(transport, ChannelConfig::default());

    let message = channel.poll().expect("message");
    assert_eq!(message.as_str(), "Start\u{FFFD}\u{FFFD}xyz");
    assert_eq!(InboundCommand::classify(&message).top_level(), None);
}

#[test]
fn deferred_command_is_echoed_to_its_own_sender() {
    let mut transport = ScriptedTransport::new();
    transport
        .push(peer(), "Stop")
        .push(other_peer(), "noise")
        .push(other_peer(), "OK");
    let config = ChannelConfig {
        unmatched: UnmatchedPolicy::DeferTopLevel,
        ..ChannelConfig::default()
    };
    let (mut channel, _) = channel(transport, config);

    channel.wait_for("OK", GENEROUS).expect("match");
    assert_eq!(channel.last_endpoint(), Some(other_peer()));

    let (message, from) = channel.poll_from().expect("deferred");
    assert_eq!((message.as_str(), from), ("Stop", peer()));
    channel.acknowledge_to(from, &message);

    let sent = channel.transport().sent();
    assert_eq!(sent[sent.len() - 2], (peer(), "Stop".to_string()));
    assert_eq!(sent[sent.len() - 1], (peer(), "ACK: Stop".to_string()));
    // Fresh sends still follow the most recent sender.
    assert_eq!(channel.last_endpoint(), Some(other_peer()));
}
