//! Pause/resume/cancel signalling for a single execution.
//!
//! Three orthogonal signals a runner polls between units of work:
//!
//! - **paused** — latching, clears on resume. Doubles as the pause gate:
//!   `wait_if_paused` blocks while set.
//! - **cancelled** — latching, never clears.
//! - the execution context token, owned by the handle, which tears the run
//!   down when the cancel grace period expires.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Control signals shared between HTTP handlers and the runner.
#[derive(Debug)]
pub struct ControlPlane {
    paused: watch::Sender<bool>,
    cancelled: CancellationToken,
}

impl ControlPlane {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused,
            cancelled: CancellationToken::new(),
        }
    }

    /// Latch the paused flag and close the pause gate. Idempotent.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    /// Clear the paused flag and reopen the gate. No-op if not paused.
    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Latch the cancelled flag. Never clears.
    pub fn cancel(&self) {
        self.cancelled.cancel();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }

    /// Block until resumed or the execution context is cancelled.
    ///
    /// Returns whether the caller was actually paused.
    pub async fn wait_if_paused(&self, exec: &CancellationToken) -> bool {
        let mut gate = self.paused.subscribe();
        if !*gate.borrow() {
            return false;
        }
        tokio::select! {
            _ = exec.cancelled() => {}
            // The sender lives on self, so wait_for cannot observe a closed
            // channel here.
            _ = gate.wait_for(|paused| !*paused) => {}
        }
        true
    }
}

impl Default for ControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn pause_is_latching_and_idempotent() {
        let control = ControlPlane::new();
        assert!(!control.is_paused());
        control.pause();
        control.pause();
        assert!(control.is_paused());
        control.resume();
        assert!(!control.is_paused());
        // Resume without pause is a no-op.
        control.resume();
        assert!(!control.is_paused());
    }

    #[test]
    fn cancel_never_clears() {
        let control = ControlPlane::new();
        control.cancel();
        assert!(control.is_cancelled());
        control.resume();
        assert!(control.is_cancelled());
    }

    #[tokio::test]
    async fn wait_if_paused_returns_immediately_when_not_paused() {
        let control = ControlPlane::new();
        let exec = CancellationToken::new();
        assert!(!control.wait_if_paused(&exec).await);
    }

    #[tokio::test]
    async fn wait_if_paused_blocks_until_resume() {
        let control = Arc::new(ControlPlane::new());
        control.pause();

        let waiter = {
            let control = Arc::clone(&control);
            tokio::spawn(async move {
                let exec = CancellationToken::new();
                control.wait_if_paused(&exec).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        control.resume();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn wait_if_paused_unblocks_on_context_cancellation() {
        let control = Arc::new(ControlPlane::new());
        control.pause();
        let exec = CancellationToken::new();

        let waiter = {
            let control = Arc::clone(&control);
            let exec = exec.clone();
            tokio::spawn(async move { control.wait_if_paused(&exec).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        exec.cancel();
        assert!(waiter.await.unwrap());
        // Still paused: context cancellation does not clear the latch.
        assert!(control.is_paused());
    }
}
