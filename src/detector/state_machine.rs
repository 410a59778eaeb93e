//! Lifecycle state machine (§4.G)
//!
//! `STOPPED -> STARTING -> RUNNING -> STOPPING -> STOPPED`, with `ERROR`
//! reachable from `STARTING` or `STOPPING` on failure. A start attempt is
//! rejected unless the current state is `STOPPED`; stop unless `RUNNING` or
//! `ERROR`.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Error = 4,
}

impl State {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => State::Stopped,
            1 => State::Starting,
            2 => State::Running,
            3 => State::Stopping,
            _ => State::Error,
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Stopped => "stopped",
            State::Starting => "starting",
            State::Running => "running",
            State::Stopping => "stopping",
            State::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Atomic wrapper around `State` so `getState`/`isRunning` never need a lock.
pub struct StateManager {
    state: AtomicU8,
}

impl Default for StateManager {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(State::Stopped as u8),
        }
    }
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_state(&self) -> State {
        State::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.get_state() == State::Running
    }

    fn set(&self, state: State) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Transitions `STOPPED -> STARTING`, runs `f`, then `STARTING ->
    /// RUNNING` on success or `STARTING -> ERROR` on failure. Rejects (no
    /// transition, returns the rejection) unless currently `STOPPED`.
    pub async fn execute_start<F, Fut, E>(&self, f: F) -> Result<(), StartRejected<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), E>>,
    {
        if self.get_state() != State::Stopped {
            return Err(StartRejected::InvalidState(self.get_state()));
        }
        self.set(State::Starting);
        match f().await {
            Ok(()) => {
                self.set(State::Running);
                Ok(())
            }
            Err(e) => {
                self.set(State::Error);
                Err(StartRejected::Failed(e))
            }
        }
    }

    /// Transitions `{RUNNING,ERROR} -> STOPPING`, runs `f`, then `STOPPING ->
    /// STOPPED` regardless of `f`'s outcome (stop always attempts to release
    /// resources — see §7 propagation policy).
    pub async fn execute_stop<F, Fut, E>(&self, f: F) -> Result<(), StopRejected<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), E>>,
    {
        let current = self.get_state();
        if current != State::Running && current != State::Error {
            return Err(StopRejected::InvalidState(current));
        }
        self.set(State::Stopping);
        let result = f().await;
        self.set(State::Stopped);
        result.map_err(StopRejected::Failed)
    }
}

#[derive(Debug)]
pub enum StartRejected<E> {
    InvalidState(State),
    Failed(E),
}

#[derive(Debug)]
pub enum StopRejected<E> {
    InvalidState(State),
    Failed(E),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_from_stopped_succeeds_and_reaches_running() {
        let sm = StateManager::new();
        let result: Result<(), StartRejected<anyhow::Error>> =
            sm.execute_start(|| async { Ok(()) }).await;
        assert!(result.is_ok());
        assert_eq!(sm.get_state(), State::Running);
        assert!(sm.is_running());
    }

    #[tokio::test]
    async fn start_from_running_is_rejected() {
        let sm = StateManager::new();
        sm.execute_start(|| async { Ok::<(), anyhow::Error>(()) })
            .await
            .unwrap();
        let result = sm.execute_start(|| async { Ok::<(), anyhow::Error>(()) }).await;
        assert!(matches!(result, Err(StartRejected::InvalidState(State::Running))));
    }

    #[tokio::test]
    async fn failed_start_reaches_error_state() {
        let sm = StateManager::new();
        let result = sm
            .execute_start(|| async { Err::<(), anyhow::Error>(anyhow::anyhow!("boom")) })
            .await;
        assert!(result.is_err());
        assert_eq!(sm.get_state(), State::Error);
    }

    #[tokio::test]
    async fn stop_from_stopped_is_rejected() {
        let sm = StateManager::new();
        let result = sm.execute_stop(|| async { Ok::<(), anyhow::Error>(()) }).await;
        assert!(matches!(result, Err(StopRejected::InvalidState(State::Stopped))));
    }

    #[tokio::test]
    async fn stop_from_error_is_allowed_and_always_reaches_stopped() {
        let sm = StateManager::new();
        let _ = sm
            .execute_start(|| async { Err::<(), anyhow::Error>(anyhow::anyhow!("boom")) })
            .await;
        assert_eq!(sm.get_state(), State::Error);
        let result = sm
            .execute_stop(|| async { Err::<(), anyhow::Error>(anyhow::anyhow!("cleanup failed")) })
            .await;
        assert!(result.is_err());
        assert_eq!(sm.get_state(), State::Stopped);
    }

    #[tokio::test]
    async fn stop_from_running_reaches_stopped_on_success() {
        let sm = StateManager::new();
        sm.execute_start(|| async { Ok::<(), anyhow::Error>(()) })
            .await
            .unwrap();
        sm.execute_stop(|| async { Ok::<(), anyhow::Error>(()) })
            .await
            .unwrap();
        assert_eq!(sm.get_state(), State::Stopped);
    }
}
