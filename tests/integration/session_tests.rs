//! Session Controller behavior against the scripted fake platform.
//!
//! Covers init failure mapping, teardown of partially initialized sessions,
//! handler failures, benign interruption, signal termination, and the
//! reboot command.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use intercore_comms::config::DEFAULT_PEER_ID;
use intercore_comms::sender::PeriodicSender;
use intercore_comms::session::run_session;
use intercore_comms::{ExitCondition, SessionConfig};

use super::test_helpers::{FakePlatform, InitStep, SendBehavior, SessionScript, Step};

async fn run_script(script: SessionScript) -> (ExitCondition, FakePlatform) {
    let shutdown = CancellationToken::new();
    let mut platform = FakePlatform::new(vec![script], shutdown.clone());
    let mut sender = PeriodicSender::new();
    let condition = run_session(
        &mut platform,
        &SessionConfig::default(),
        &mut sender,
        &shutdown,
    )
    .await;
    (condition, platform)
}

// ── Initialization ──────────────────────────────────────────────────────────

#[tokio::test]
async fn init_failures_map_to_distinct_conditions() {
    let cases = [
        (InitStep::EventLoop, ExitCondition::EventLoopInitFailed),
        (InitStep::Timer, ExitCondition::TimerInitFailed),
        (InitStep::Connect, ExitCondition::ConnectFailed),
        (InitStep::SocketOption, ExitCondition::SocketOptionFailed),
        (InitStep::RegisterIo, ExitCondition::RegisterIoFailed),
    ];

    for (step, expected) in cases {
        let (condition, platform) = run_script(SessionScript::failing_at(step)).await;
        assert_eq!(condition, expected, "init step {step:?}");
        let journal = platform.journal();
        let journal = journal.borrow();
        assert!(
            journal.fully_released(),
            "step {step:?} leaked resources: {journal:?}"
        );
    }
}

#[tokio::test]
async fn connect_failure_never_fires_timer() {
    let script = SessionScript {
        fail_at: Some(InitStep::Connect),
        steps: vec![Step::Tick, Step::Tick],
        send: SendBehavior::Full,
    };
    let (condition, platform) = run_script(script).await;

    assert_eq!(condition, ExitCondition::ConnectFailed);
    assert_eq!(condition.code(), 7);
    let journal = platform.journal();
    let journal = journal.borrow();
    assert_eq!(journal.timer_events, 0);
    assert!(journal.sent.is_empty());
    // The timer was registered before the connect and must still be released.
    assert_eq!(journal.timers_registered.len(), 1);
    assert_eq!(journal.timers_unregistered, journal.timers_registered);
    assert_eq!(journal.loops_closed, 1);
}

#[tokio::test]
async fn socket_option_failure_closes_the_channel() {
    let (condition, platform) = run_script(SessionScript::failing_at(InitStep::SocketOption)).await;
    assert_eq!(condition, ExitCondition::SocketOptionFailed);
    let journal = platform.journal();
    let journal = journal.borrow();
    assert_eq!(journal.channels_opened.len(), 1);
    assert_eq!(journal.channels_closed, journal.channels_opened);
    assert!(journal.ios_registered.is_empty());
}

#[tokio::test]
async fn successful_init_connects_to_fixed_peer_with_timeout() {
    let (_, platform) = run_script(SessionScript::steps(vec![Step::Signal])).await;
    let journal = platform.journal();
    let journal = journal.borrow();
    assert_eq!(journal.connects.len(), 1);
    assert_eq!(journal.connects[0].to_string(), DEFAULT_PEER_ID);
    assert_eq!(journal.recv_timeouts, vec![Duration::from_secs(5)]);
}

// ── Signals and interruption ────────────────────────────────────────────────

#[tokio::test]
async fn signal_before_any_io_terminates_with_full_teardown() {
    let (condition, platform) = run_script(SessionScript::steps(vec![Step::Signal])).await;

    assert_eq!(condition, ExitCondition::TerminatedBySignal);
    assert_eq!(condition.code(), 1);
    let journal = platform.journal();
    let journal = journal.borrow();
    assert!(journal.sent.is_empty());
    assert_eq!(journal.timers_unregistered.len(), 1);
    assert_eq!(journal.ios_unregistered.len(), 1);
    assert!(journal.fully_released(), "leaked: {journal:?}");
}

#[tokio::test]
async fn interrupted_waits_are_benign() {
    let script = SessionScript::steps(vec![
        Step::Interrupted,
        Step::Fail(std::io::ErrorKind::Interrupted),
        Step::Tick,
        Step::Signal,
    ]);
    let (condition, platform) = run_script(script).await;

    assert_eq!(condition, ExitCondition::TerminatedBySignal);
    assert_eq!(platform.journal().borrow().sent.len(), 1);
}

#[tokio::test]
async fn other_wait_failures_end_the_session() {
    let script = SessionScript::steps(vec![Step::Fail(std::io::ErrorKind::Other), Step::Tick]);
    let (condition, platform) = run_script(script).await;

    assert_eq!(condition, ExitCondition::EventLoopRunFailed);
    assert_eq!(condition.code(), 10);
    assert!(platform.journal().borrow().sent.is_empty());
}

// ── Handlers ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unconsumable_tick_fails_without_sending() {
    let (condition, platform) =
        run_script(SessionScript::steps(vec![Step::TickUnconsumable, Step::Tick])).await;

    assert_eq!(condition, ExitCondition::TimerConsumeFailed);
    assert!(platform.journal().borrow().sent.is_empty());
}

#[tokio::test]
async fn send_error_and_zero_write_are_send_failures() {
    for behavior in [SendBehavior::Error, SendBehavior::Zero] {
        let script = SessionScript::steps(vec![Step::Tick, Step::Tick]).with_send(behavior);
        let (condition, platform) = run_script(script).await;
        assert_eq!(condition, ExitCondition::SendFailed, "{behavior:?}");
        assert!(platform.journal().borrow().fully_released());
    }
}

#[tokio::test]
async fn short_write_is_not_retried_or_fatal() {
    let script = SessionScript::steps(vec![Step::Tick, Step::Tick, Step::Signal])
        .with_send(SendBehavior::Short);
    let (condition, platform) = run_script(script).await;

    assert_eq!(condition, ExitCondition::TerminatedBySignal);
    let journal = platform.journal();
    assert_eq!(
        journal.borrow().sent,
        vec![
            "hl-app-to-rt-app-adding00".to_owned(),
            "hl-app-to-rt-app-adding01".to_owned(),
        ]
    );
}

#[tokio::test]
async fn silent_peer_surfaces_as_receive_failure() {
    let (condition, _) = run_script(SessionScript::steps(vec![Step::Silent, Step::Tick])).await;
    assert_eq!(condition, ExitCondition::ReceiveFailed);
    assert_eq!(condition.code(), 4);
}

#[tokio::test]
async fn exact_reboot_payload_requests_reboot() {
    let script = SessionScript::steps(vec![Step::Readable(b"reboot!!".to_vec()), Step::Tick]);
    let (condition, platform) = run_script(script).await;

    assert_eq!(condition, ExitCondition::SimulatedReboot);
    let journal = platform.journal();
    let journal = journal.borrow();
    assert!(
        journal.sent.is_empty(),
        "loop must stop before the next tick"
    );
    assert!(journal.fully_released());
}

#[tokio::test]
async fn near_miss_payloads_are_ignored() {
    let script = SessionScript::steps(vec![
        Step::Readable(b"reboot!!x".to_vec()),
        Step::Readable(b"reboot!".to_vec()),
        Step::Readable(b"REBOOT!!".to_vec()),
        Step::Readable(Vec::new()),
        Step::Signal,
    ]);
    let (condition, platform) = run_script(script).await;

    assert_eq!(condition, ExitCondition::TerminatedBySignal);
    assert_eq!(platform.journal().borrow().received_reads, 4);
}

#[tokio::test]
async fn oversized_payload_is_truncated_to_buffer() {
    // 32 bytes of filler followed by the command: the first read takes only
    // the filler, the second read sees the command on its own.
    let mut payload = vec![b'x'; 32];
    payload.extend_from_slice(b"reboot!!");
    let script = SessionScript::steps(vec![Step::Readable(payload), Step::Silent, Step::Tick]);
    let (condition, platform) = run_script(script).await;

    assert_eq!(condition, ExitCondition::SimulatedReboot);
    assert_eq!(platform.journal().borrow().received_reads, 2);
}

#[tokio::test]
async fn init_failure_wins_over_pending_signal() {
    // A signal that is already pending when init fails must not replace the
    // init failure: the failure is recorded before the loop condition folds
    // the signal in.
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let mut platform = FakePlatform::new(
        vec![SessionScript::failing_at(InitStep::Connect)],
        shutdown.clone(),
    );
    let mut sender = PeriodicSender::new();

    let condition = run_session(
        &mut platform,
        &SessionConfig::default(),
        &mut sender,
        &shutdown,
    )
    .await;

    assert_eq!(condition, ExitCondition::ConnectFailed);
}
