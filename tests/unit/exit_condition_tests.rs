//! Exit code mapping and first-failure-wins state.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use intercore_comms::exit::{ExitCondition, ExitState};

const ALL: [ExitCondition; 12] = [
    ExitCondition::Success,
    ExitCondition::TerminatedBySignal,
    ExitCondition::TimerConsumeFailed,
    ExitCondition::SendFailed,
    ExitCondition::ReceiveFailed,
    ExitCondition::EventLoopInitFailed,
    ExitCondition::TimerInitFailed,
    ExitCondition::ConnectFailed,
    ExitCondition::SocketOptionFailed,
    ExitCondition::RegisterIoFailed,
    ExitCondition::EventLoopRunFailed,
    ExitCondition::SimulatedReboot,
];

#[test]
fn exit_codes_match_the_published_table() {
    let codes: Vec<u8> = ALL.iter().map(|c| c.code()).collect();
    assert_eq!(codes, (0..=11).collect::<Vec<u8>>());
}

#[test]
fn exit_codes_are_distinct() {
    let codes: HashSet<u8> = ALL.iter().map(|c| c.code()).collect();
    assert_eq!(codes.len(), ALL.len());
}

#[test]
fn only_simulated_reboot_loops() {
    for condition in ALL {
        assert_eq!(
            condition.is_terminal(),
            condition != ExitCondition::SimulatedReboot,
            "{condition}"
        );
    }
}

#[test]
fn display_includes_numeric_code() {
    assert_eq!(
        ExitCondition::ConnectFailed.to_string(),
        "connect failed (7)"
    );
}

#[test]
fn state_starts_running_and_keeps_first_failure() {
    let mut state = ExitState::new(CancellationToken::new());
    assert!(state.is_running());

    state.set(ExitCondition::ReceiveFailed);
    state.set(ExitCondition::SimulatedReboot);

    assert!(!state.is_running());
    assert_eq!(state.current(), ExitCondition::ReceiveFailed);
}

#[test]
fn cancelled_token_reads_as_terminated_by_signal() {
    let shutdown = CancellationToken::new();
    let mut state = ExitState::new(shutdown.clone());
    shutdown.cancel();
    assert_eq!(state.current(), ExitCondition::TerminatedBySignal);

    state.set(ExitCondition::SendFailed);
    assert_eq!(state.current(), ExitCondition::TerminatedBySignal);
}
