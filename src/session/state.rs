//! Session state machine.

/// What a session is doing right now.
///
/// The control channel has a single "ready for command" state; the other
/// states only exist while one intent is being serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for the next command.
    #[default]
    Ready,
    /// A generic exec intent is running.
    Executing,
    /// A file transfer subchannel is open.
    Transferring,
    /// Transport closed or terminate intent processed.
    Closed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Ready -> Executing | Transferring
    /// - Executing | Transferring -> Ready
    /// - any non-closed state -> Closed
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Ready, Executing)
                | (Ready, Transferring)
                | (Executing, Ready)
                | (Transferring, Ready)
                | (Ready, Closed)
                | (Executing, Closed)
                | (Transferring, Closed)
        )
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::Error::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Check if a transfer is in flight for the session.
    pub fn is_transferring(&self) -> bool {
        matches!(self, SessionState::Transferring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_cycle() {
        let mut state = SessionState::Ready;
        assert!(state.transition_to(SessionState::Executing).is_ok());
        assert!(state.transition_to(SessionState::Ready).is_ok());
        assert_eq!(state, SessionState::Ready);
    }

    #[test]
    fn test_transfer_cycle() {
        let mut state = SessionState::Ready;
        state.transition_to(SessionState::Transferring).unwrap();
        assert!(state.is_transferring());
        state.transition_to(SessionState::Ready).unwrap();
        assert!(!state.is_transferring());
    }

    #[test]
    fn test_no_nested_intents() {
        let mut state = SessionState::Executing;
        assert!(state.transition_to(SessionState::Transferring).is_err());
        assert_eq!(state, SessionState::Executing);
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut state = SessionState::Transferring;
        state.transition_to(SessionState::Closed).unwrap();
        assert!(state.is_terminal());
        assert!(state.transition_to(SessionState::Ready).is_err());
        assert!(state.transition_to(SessionState::Closed).is_err());
    }

    #[test]
    fn test_default() {
        assert_eq!(SessionState::default(), SessionState::Ready);
    }
}
