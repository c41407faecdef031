// Application state module
// Lifecycle of the overlay: Idle until the surface exists, Running inside the
// event loop, Terminated once Escape is pressed or the surface goes away

use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Terminated(TerminationReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    EscapePressed,
    SurfaceClosed,
    /// Drawing failed after the loop started
    Failed,
}

#[derive(Debug)]
pub struct AppState {
    phase: Phase,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Enter the event loop. Only valid from `Idle`.
    pub fn start(&mut self) {
        match self.phase {
            Phase::Idle => {
                debug!("Idle -> Running");
                self.phase = Phase::Running;
            }
            phase => debug!("Ignoring start while {:?}", phase),
        }
    }

    /// Stop for good. The first reason wins.
    pub fn terminate(&mut self, reason: TerminationReason) {
        if let Phase::Terminated(previous) = self.phase {
            debug!("Already terminated ({:?}), ignoring {:?}", previous, reason);
            return;
        }
        info!("Terminating: {:?}", reason);
        self.phase = Phase::Terminated(reason);
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    #[test]
    fn starts_idle() {
        let state = AppState::new();
        assert!(state.phase() == Phase::Idle);
        assert!(!state.is_running());
    }

    #[test]
    fn escape_ends_a_running_app() {
        let mut state = AppState::new();
        state.start();
        assert!(state.is_running());
        state.terminate(TerminationReason::EscapePressed);
        assert!(state.phase() == Phase::Terminated(TerminationReason::EscapePressed));
        assert!(!state.is_running());
    }

    #[test]
    fn terminated_is_final() {
        let mut state = AppState::new();
        state.start();
        state.terminate(TerminationReason::SurfaceClosed);
        state.start();
        state.terminate(TerminationReason::EscapePressed);
        assert!(state.phase() == Phase::Terminated(TerminationReason::SurfaceClosed));
    }

    #[test]
    fn can_terminate_before_running() {
        let mut state = AppState::new();
        state.terminate(TerminationReason::SurfaceClosed);
        assert!(state.phase() == Phase::Terminated(TerminationReason::SurfaceClosed));
        state.start();
        assert!(!state.is_running());
    }

    #[test]
    fn start_twice_stays_running() {
        let mut state = AppState::new();
        state.start();
        state.start();
        assert!(state.phase() == Phase::Running);
    }
}
