//! Unit tests for the coarse player state

use fluxplayer_shared_types::PlayerState;

#[test]
fn test_terminal_states_reject_tasks() {
    assert!(PlayerState::Error.rejects_tasks());
    assert!(PlayerState::Released.rejects_tasks());
}

#[test]
fn test_live_states_accept_tasks() {
    for state in [
        PlayerState::Idle,
        PlayerState::Initializing,
        PlayerState::Prepared,
        PlayerState::Playing,
        PlayerState::Paused,
        PlayerState::Seeking,
        PlayerState::Complete,
    ] {
        assert!(!state.rejects_tasks(), "{state:?} must accept tasks");
    }
}

#[test]
fn test_default_state_is_idle() {
    assert_eq!(PlayerState::default(), PlayerState::Idle);
}
