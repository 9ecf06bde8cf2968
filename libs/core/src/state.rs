use thiserror::Error;

use crate::types::SessionStatus;

/// Rejected transition, carrying both ends for the human-readable reason.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("checkout cannot move from {from} to {to}")]
pub struct TransitionDenied {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// Validates a status transition against the session lifecycle:
///
/// ```text
/// not_ready_for_payment -> ready_for_payment | canceled
/// ready_for_payment     -> completed         | canceled
/// completed / canceled  -> (terminal)
/// ```
pub fn can_transition(from: SessionStatus, to: SessionStatus) -> Result<(), TransitionDenied> {
    use SessionStatus::*;
    let allowed = matches!(
        (from, to),
        (NotReadyForPayment, ReadyForPayment)
            | (NotReadyForPayment, Canceled)
            | (ReadyForPayment, Completed)
            | (ReadyForPayment, Canceled)
    );
    if allowed {
        Ok(())
    } else {
        Err(TransitionDenied { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::*;

    #[test]
    fn forward_transitions_are_allowed() {
        can_transition(NotReadyForPayment, ReadyForPayment).unwrap();
        can_transition(NotReadyForPayment, Canceled).unwrap();
        can_transition(ReadyForPayment, Completed).unwrap();
        can_transition(ReadyForPayment, Canceled).unwrap();
    }

    #[test]
    fn completion_requires_ready_for_payment() {
        assert!(can_transition(NotReadyForPayment, Completed).is_err());
    }

    #[test]
    fn terminal_states_never_reopen() {
        for terminal in [Completed, Canceled] {
            for target in [NotReadyForPayment, ReadyForPayment, Completed, Canceled] {
                assert!(can_transition(terminal, target).is_err());
            }
        }
    }

    #[test]
    fn denial_names_both_states() {
        let err = can_transition(Completed, Canceled).unwrap_err();
        assert_eq!(err.to_string(), "checkout cannot move from completed to canceled");
    }
}
