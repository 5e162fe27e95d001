//! Per-process lifecycle state
//!
//! ```text
//! Spawned -> Ready <-> AwaitingDrain -> ... -> Crashed -> Terminated
//!            Ready -> Closed -> Terminated
//! ```
//!
//! Shared between the owning handle and its stderr watchdog.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle state of a supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessState {
    Spawned = 0,
    Ready = 1,
    AwaitingDrain = 2,
    Crashed = 3,
    Closed = 4,
    Terminated = 5,
}

impl ProcessState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Spawned,
            1 => Self::Ready,
            2 => Self::AwaitingDrain,
            3 => Self::Crashed,
            4 => Self::Closed,
            _ => Self::Terminated,
        }
    }

    /// Whether `self -> next` is allowed
    pub fn can_move_to(self, next: Self) -> bool {
        use ProcessState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Crashed, _) => false,
            (_, Crashed) => true,
            (Spawned, Ready) => true,
            (Ready, AwaitingDrain) | (AwaitingDrain, Ready) => true,
            (Ready | AwaitingDrain, Closed) => true,
            (a, b) => a == b,
        }
    }
}

/// Atomically shared [`ProcessState`]
#[derive(Debug, Clone)]
pub struct StateCell(Arc<AtomicU8>);

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ProcessState::Spawned as u8)))
    }

    pub fn get(&self) -> ProcessState {
        ProcessState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` if the transition is legal; returns whether it moved
    pub fn advance(&self, next: ProcessState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                ProcessState::from_u8(raw)
                    .can_move_to(next)
                    .then_some(next as u8)
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = StateCell::new();
        assert!(state.advance(ProcessState::Ready));
        assert!(state.advance(ProcessState::AwaitingDrain));
        assert!(state.advance(ProcessState::Ready));
        assert!(state.advance(ProcessState::Closed));
        assert!(state.advance(ProcessState::Terminated));
        assert_eq!(state.get(), ProcessState::Terminated);
    }

    #[test]
    fn test_crashed_only_terminates() {
        let state = StateCell::new();
        state.advance(ProcessState::Ready);
        assert!(state.advance(ProcessState::Crashed));
        assert!(!state.advance(ProcessState::Ready));
        assert!(!state.advance(ProcessState::Closed));
        assert!(state.advance(ProcessState::Terminated));
        assert!(!state.advance(ProcessState::Crashed));
    }

    #[test]
    fn test_clones_share_state() {
        let state = StateCell::new();
        let watchdog_view = state.clone();
        watchdog_view.advance(ProcessState::Crashed);
        assert_eq!(state.get(), ProcessState::Crashed);
    }
}
