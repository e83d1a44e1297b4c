//! Unit tests for session state and permission modes.

use std::path::PathBuf;

use agent_conduit::orchestrator::session::{PermissionMode, SessionState};

// ── Mode parsing ─────────────────────────────────────────────────────────────

#[test]
fn mode_ids_round_trip_through_parse() {
    for mode in PermissionMode::ALL {
        assert_eq!(PermissionMode::parse(mode.id()), Some(mode));
    }
}

#[test]
fn mode_parse_tolerates_agent_spellings() {
    assert_eq!(
        PermissionMode::parse("acceptEdits"),
        Some(PermissionMode::AcceptEdits)
    );
    assert_eq!(
        PermissionMode::parse("accept_edits"),
        Some(PermissionMode::AcceptEdits)
    );
    assert_eq!(
        PermissionMode::parse("bypassPermissions"),
        Some(PermissionMode::Bypass)
    );
    assert_eq!(PermissionMode::parse(" plan "), Some(PermissionMode::Plan));
}

#[test]
fn unknown_mode_strings_do_not_parse() {
    assert_eq!(PermissionMode::parse("yolo"), None);
    assert_eq!(PermissionMode::parse(""), None);
}

// ── Flag derivation ──────────────────────────────────────────────────────────

#[test]
fn plan_and_ask_pass_a_mode_flag() {
    assert_eq!(PermissionMode::Plan.cli_flags(), vec!["--mode", "plan"]);
    assert_eq!(PermissionMode::Ask.cli_flags(), vec!["--mode", "ask"]);
}

#[test]
fn bypass_passes_the_force_flag() {
    assert_eq!(PermissionMode::Bypass.cli_flags(), vec!["--force"]);
}

#[test]
fn default_and_accept_edits_pass_nothing() {
    assert!(PermissionMode::Default.cli_flags().is_empty());
    assert!(PermissionMode::AcceptEdits.cli_flags().is_empty());
}

#[test]
fn only_default_and_accept_edits_solicit_confirmation() {
    assert!(PermissionMode::Default.solicits_confirmation());
    assert!(PermissionMode::AcceptEdits.solicits_confirmation());
    assert!(!PermissionMode::Bypass.solicits_confirmation());
    assert!(!PermissionMode::Plan.solicits_confirmation());
    assert!(!PermissionMode::Ask.solicits_confirmation());
}

// ── Session lifecycle ────────────────────────────────────────────────────────

#[test]
fn begin_prompt_clears_cancelled_and_installs_a_run() {
    let mut state = SessionState::new(
        "s-1".to_owned(),
        PathBuf::from("/tmp"),
        PermissionMode::Default,
    );
    state.cancelled = true;

    let token = state.begin_prompt();

    assert!(!state.cancelled, "begin_prompt must clear the cancelled flag");
    assert!(state.active_run.is_some());
    assert!(!token.is_cancelled());
}

#[test]
fn cancel_sets_flag_and_fires_active_run() {
    let mut state = SessionState::new(
        "s-1".to_owned(),
        PathBuf::from("/tmp"),
        PermissionMode::Default,
    );
    let token = state.begin_prompt();

    state.cancel();

    assert!(state.cancelled);
    assert!(token.is_cancelled(), "cancel must fire the run's token");
}

#[test]
fn cancel_without_active_run_only_sets_flag() {
    let mut state = SessionState::new(
        "s-1".to_owned(),
        PathBuf::from("/tmp"),
        PermissionMode::Default,
    );
    state.cancel();
    assert!(state.cancelled);
    assert!(state.active_run.is_none());
}

#[test]
fn finish_prompt_releases_the_run() {
    let mut state = SessionState::new(
        "s-1".to_owned(),
        PathBuf::from("/tmp"),
        PermissionMode::Default,
    );
    state.begin_prompt();
    state.finish_prompt();
    assert!(state.active_run.is_none());
}
