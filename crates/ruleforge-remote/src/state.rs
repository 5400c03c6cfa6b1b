//! The per-rule remote-execution state machine:
//!
//! ```text
//! Pending --key-computed--> Fingerprinted
//! Fingerprinted --cache-miss--> TreeBuilt
//! TreeBuilt --action-dispatched--> AwaitingRemote
//! AwaitingRemote --result--> {Success, Failure, RetryableFailure}
//! RetryableFailure --retries-remain--> TreeBuilt
//! Any --cancelled--> Cancelled
//! ```

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Pending,
    Fingerprinted,
    TreeBuilt,
    AwaitingRemote,
    Success,
    Failure,
    Cancelled,
}

#[derive(Debug, Error)]
#[error("illegal remote-execution transition `{attempted}` from {from:?}")]
pub struct IllegalTransition {
    from: RemoteState,
    attempted: &'static str,
}

/// Drives one rule's remote-execution state machine. `max_retries` bounds
/// how many times a retryable failure may loop back to `TreeBuilt` before
/// it is treated as a terminal `Failure`.
pub struct RemoteExecutionMachine {
    state: RemoteState,
    max_retries: u32,
    retries_used: u32,
}

impl RemoteExecutionMachine {
    pub fn new(max_retries: u32) -> Self {
        Self {
            state: RemoteState::Pending,
            max_retries,
            retries_used: 0,
        }
    }

    pub fn state(&self) -> RemoteState {
        self.state
    }

    pub fn key_computed(&mut self) -> Result<(), IllegalTransition> {
        self.transition(RemoteState::Pending, RemoteState::Fingerprinted, "key-computed")
    }

    pub fn cache_miss(&mut self) -> Result<(), IllegalTransition> {
        self.transition(RemoteState::Fingerprinted, RemoteState::TreeBuilt, "cache-miss")
    }

    pub fn action_dispatched(&mut self) -> Result<(), IllegalTransition> {
        self.transition(RemoteState::TreeBuilt, RemoteState::AwaitingRemote, "action-dispatched")
    }

    pub fn succeed(&mut self) -> Result<(), IllegalTransition> {
        self.transition(RemoteState::AwaitingRemote, RemoteState::Success, "result(success)")
    }

    pub fn fail(&mut self) -> Result<(), IllegalTransition> {
        self.transition(RemoteState::AwaitingRemote, RemoteState::Failure, "result(failure)")
    }

    /// A retryable failure loops back to `TreeBuilt` while retries remain,
    /// and becomes a terminal `Failure` once they are exhausted.
    pub fn fail_retryable(&mut self) -> Result<(), IllegalTransition> {
        if self.state != RemoteState::AwaitingRemote {
            return Err(IllegalTransition {
                from: self.state,
                attempted: "result(retryable)",
            });
        }
        if self.retries_used < self.max_retries {
            self.retries_used += 1;
            self.state = RemoteState::TreeBuilt;
        } else {
            self.state = RemoteState::Failure;
        }
        Ok(())
    }

    /// Cancellation is reachable from any non-terminal state; a no-op once
    /// the machine has already reached a terminal state.
    pub fn cancel(&mut self) {
        if !matches!(
            self.state,
            RemoteState::Success | RemoteState::Failure | RemoteState::Cancelled
        ) {
            self.state = RemoteState::Cancelled;
        }
    }

    fn transition(
        &mut self,
        expected: RemoteState,
        next: RemoteState,
        attempted: &'static str,
    ) -> Result<(), IllegalTransition> {
        if self.state != expected {
            return Err(IllegalTransition {
                from: self.state,
                attempted,
            });
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_runs_through_to_success() {
        let mut m = RemoteExecutionMachine::new(2);
        m.key_computed().unwrap();
        m.cache_miss().unwrap();
        m.action_dispatched().unwrap();
        m.succeed().unwrap();
        assert_eq!(m.state(), RemoteState::Success);
    }

    #[test]
    fn retryable_failure_loops_back_until_retries_are_exhausted() {
        let mut m = RemoteExecutionMachine::new(1);
        m.key_computed().unwrap();
        m.cache_miss().unwrap();
        m.action_dispatched().unwrap();
        m.fail_retryable().unwrap();
        assert_eq!(m.state(), RemoteState::TreeBuilt);

        m.action_dispatched().unwrap();
        m.fail_retryable().unwrap();
        assert_eq!(m.state(), RemoteState::Failure);
    }

    #[test]
    fn out_of_order_transitions_are_rejected() {
        let mut m = RemoteExecutionMachine::new(0);
        assert!(m.action_dispatched().is_err());
    }

    #[test]
    fn cancellation_is_reachable_from_any_non_terminal_state() {
        let mut m = RemoteExecutionMachine::new(0);
        m.key_computed().unwrap();
        m.cancel();
        assert_eq!(m.state(), RemoteState::Cancelled);

        let mut finished = RemoteExecutionMachine::new(0);
        finished.key_computed().unwrap();
        finished.cache_miss().unwrap();
        finished.action_dispatched().unwrap();
        finished.succeed().unwrap();
        finished.cancel();
        assert_eq!(finished.state(), RemoteState::Success);
    }
}
