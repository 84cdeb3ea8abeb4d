//! Session connectivity state machine
//!
//! Transitions are a pure function of the current state and an engine
//! signal. Side effects come back as a list for the caller to carry out, so
//! the machine is testable without a network stack.
//!
//! ```text
//!   New ──checking──► Connecting ──connected/completed──► Connected
//!    │                 │    ▲                              │
//!    │                 │    └────────disconnected──────────┤
//!    │                 ├──failed──► Failed ◄──failed───────┤
//!    └──closed──► Closed ◄──closed──┴──────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::ConnectivitySignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created at negotiation time, before any connectivity signal
    New,
    /// ICE checks in progress
    Connecting,
    /// Transport established; eligible for sampling and relay
    Connected,
    /// Transport failed (terminal)
    Failed,
    /// Transport closed (terminal)
    Closed,
}

impl SessionState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Work the owner must perform after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEffect {
    /// Close the session's peer context
    CloseTransport,
    /// Drop the session from its endpoint registry and the global list
    RemoveSession,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no transition from {from:?} on {signal:?}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub signal: ConnectivitySignal,
}

/// Compute the next state and the effects of entering it
pub fn transition(
    state: SessionState,
    signal: ConnectivitySignal,
) -> Result<(SessionState, Vec<SessionEffect>), InvalidTransition> {
    use ConnectivitySignal as Sig;
    use SessionState as St;

    let next = match (state, signal) {
        (St::Failed | St::Closed, _) => return Err(InvalidTransition { from: state, signal }),

        (St::New, Sig::New) => St::New,
        (St::New | St::Connecting, Sig::Checking) => St::Connecting,
        (St::Connecting | St::Connected, Sig::Connected | Sig::Completed) => St::Connected,
        // ICE agent is re-checking a path it lost
        (St::Connecting | St::Connected, Sig::Disconnected) => St::Connecting,
        (St::Connecting | St::Connected, Sig::Failed) => St::Failed,
        (_, Sig::Closed) => St::Closed,

        _ => return Err(InvalidTransition { from: state, signal }),
    };

    let effects = if next == state {
        Vec::new()
    } else {
        match next {
            St::Failed => vec![SessionEffect::CloseTransport, SessionEffect::RemoveSession],
            St::Closed => vec![SessionEffect::RemoveSession],
            _ => Vec::new(),
        }
    };

    Ok((next, effects))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectivitySignal as Sig;

    fn run(signals: &[Sig]) -> SessionState {
        signals.iter().fold(SessionState::New, |state, signal| {
            transition(state, *signal).unwrap().0
        })
    }

    #[test]
    fn test_happy_path() {
        assert_eq!(run(&[Sig::Checking]), SessionState::Connecting);
        assert_eq!(run(&[Sig::Checking, Sig::Connected]), SessionState::Connected);
        assert_eq!(
            run(&[Sig::Checking, Sig::Connected, Sig::Completed]),
            SessionState::Connected
        );
    }

    #[test]
    fn test_connected_requires_checking_first() {
        assert!(transition(SessionState::New, Sig::Connected).is_err());
        assert!(transition(SessionState::New, Sig::Failed).is_err());
    }

    #[test]
    fn test_failure_tears_down_and_removes() {
        for from in [SessionState::Connecting, SessionState::Connected] {
            let (next, effects) = transition(from, Sig::Failed).unwrap();
            assert_eq!(next, SessionState::Failed);
            assert_eq!(
                effects,
                vec![SessionEffect::CloseTransport, SessionEffect::RemoveSession]
            );
        }
    }

    #[test]
    fn test_close_removes_from_any_live_state() {
        for from in [SessionState::New, SessionState::Connecting, SessionState::Connected] {
            let (next, effects) = transition(from, Sig::Closed).unwrap();
            assert_eq!(next, SessionState::Closed);
            assert_eq!(effects, vec![SessionEffect::RemoveSession]);
        }
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let all = [
            Sig::New,
            Sig::Checking,
            Sig::Connected,
            Sig::Completed,
            Sig::Disconnected,
            Sig::Failed,
            Sig::Closed,
        ];
        for from in [SessionState::Failed, SessionState::Closed] {
            for signal in all {
                assert_eq!(
                    transition(from, signal),
                    Err(InvalidTransition { from, signal })
                );
            }
        }
    }

    #[test]
    fn test_disconnect_returns_to_connecting() {
        let (next, effects) = transition(SessionState::Connected, Sig::Disconnected).unwrap();
        assert_eq!(next, SessionState::Connecting);
        assert!(effects.is_empty());
    }
}
