use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::ComprobanteError;
use crate::core::error::Result;

/// Lifecycle of one document at the authority.
///
/// Moves forward only. `Returned` and `Rejected` are terminal failures,
/// `Authorized` is terminal success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Draft,
    Encoded,
    Signed,
    Sent,
    Received,
    Returned,
    Authorized,
    Rejected,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Returned | Self::Authorized | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Encoded => "ENCODED",
            Self::Signed => "SIGNED",
            Self::Sent => "SENT",
            Self::Received => "RECEIVED",
            Self::Returned => "RETURNED",
            Self::Authorized => "AUTHORIZED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Encode,
    SignSucceeded,
    SignFailed,
    Send,
    ReceptionAccepted,
    ReceptionReturned,
    Authorized,
    AuthorizationPending,
    AuthorizationRejected,
}

impl Event {
    /// Operation name used in precondition errors.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Encode => "encode",
            Self::SignSucceeded | Self::SignFailed => "sign",
            Self::Send | Self::ReceptionAccepted | Self::ReceptionReturned => "submit",
            Self::Authorized | Self::AuthorizationPending | Self::AuthorizationRejected => {
                "check authorization of"
            }
        }
    }
}

/// The transition table. Terminal states absorb every event.
pub fn transition(state: LifecycleState, event: Event) -> Result<LifecycleState> {
    use Event as E;
    use LifecycleState as S;

    if state.is_terminal() {
        return Ok(state);
    }
    let next = match (state, event) {
        (S::Draft, E::Encode) => S::Encoded,
        (S::Encoded, E::SignSucceeded) => S::Signed,
        (S::Encoded, E::SignFailed) => S::Encoded,
        (S::Signed, E::Send) => S::Sent,
        (S::Sent, E::ReceptionAccepted) => S::Received,
        (S::Sent, E::ReceptionReturned) => S::Returned,
        (S::Received, E::Authorized) => S::Authorized,
        (S::Received, E::AuthorizationPending) => S::Received,
        (S::Received, E::AuthorizationRejected) => S::Rejected,
        (state, event) => {
            return Err(ComprobanteError::State {
                state: state.to_string(),
                operation: event.operation(),
            });
        }
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use Event as E;
    use LifecycleState as S;

    #[test]
    fn happy_path() {
        let mut state = S::Draft;
        for event in [
            E::Encode,
            E::SignSucceeded,
            E::Send,
            E::ReceptionAccepted,
            E::Authorized,
        ] {
            state = transition(state, event).unwrap();
        }
        assert_eq!(state, S::Authorized);
    }

    #[test]
    fn failures_that_keep_state() {
        assert_eq!(transition(S::Encoded, E::SignFailed).unwrap(), S::Encoded);
        assert_eq!(
            transition(S::Received, E::AuthorizationPending).unwrap(),
            S::Received
        );
    }

    #[test]
    fn terminal_states_absorb() {
        for terminal in [S::Returned, S::Authorized, S::Rejected] {
            assert!(terminal.is_terminal());
            assert_eq!(transition(terminal, E::Encode).unwrap(), terminal);
            assert_eq!(transition(terminal, E::Authorized).unwrap(), terminal);
        }
    }

    #[test]
    fn out_of_order_events_fail() {
        let err = transition(S::Draft, E::Authorized).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot check authorization of a document in state DRAFT"
        );
        assert!(transition(S::Encoded, E::Send).is_err());
        assert!(transition(S::Signed, E::ReceptionAccepted).is_err());
        assert!(transition(S::Received, E::Encode).is_err());
    }

    #[test]
    fn serializes_in_upper_case() {
        assert_eq!(
            serde_json::to_string(&S::Authorized).unwrap(),
            "\"AUTHORIZED\""
        );
    }
}
