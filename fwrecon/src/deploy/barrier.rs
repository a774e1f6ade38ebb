//! Cross-attempt barrier for HA pairs.
//!
//! The passive member's attempt holds the [`BarrierRelease`] and signals once
//! it has committed. The active member's attempt waits on the
//! [`BarrierGate`] before leaving `Staged`. Dropping the release without
//! signalling breaks the barrier, so the active side never waits on a passive
//! attempt that has already ended.

use std::time::Duration;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Waiting,
    Committed,
    Broken,
}

#[derive(Debug)]
pub struct BarrierRelease {
    tx: watch::Sender<Signal>,
}

impl BarrierRelease {
    pub fn committed(self) {
        self.tx.send_replace(Signal::Committed);
    }
}

impl Drop for BarrierRelease {
    fn drop(&mut self) {
        self.tx.send_if_modified(|signal| {
            if *signal == Signal::Waiting {
                *signal = Signal::Broken;
                true
            } else {
                false
            }
        });
    }
}

#[derive(Debug, Clone)]
pub struct BarrierGate {
    rx: watch::Receiver<Signal>,
}

/// Why the active side may not proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierError {
    PeerEnded,
    TimedOut(Duration),
}

impl std::fmt::Display for BarrierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BarrierError::PeerEnded => f.write_str("passive member ended without committing"),
            BarrierError::TimedOut(limit) => write!(
                f,
                "passive member did not commit within {:.3}s",
                limit.as_secs_f64()
            ),
        }
    }
}

impl BarrierGate {
    /// Wait for the passive commit.
    pub async fn wait(&mut self, limit: Duration) -> Result<(), BarrierError> {
        let outcome = tokio::time::timeout(limit, self.rx.wait_for(|s| *s != Signal::Waiting)).await;
        match outcome {
            Err(_) => Err(BarrierError::TimedOut(limit)),
            Ok(Err(_)) => Err(BarrierError::PeerEnded),
            Ok(Ok(signal)) if *signal == Signal::Committed => Ok(()),
            Ok(Ok(_)) => Err(BarrierError::PeerEnded),
        }
    }
}

pub fn ha_barrier() -> (BarrierRelease, BarrierGate) {
    let (tx, rx) = watch::channel(Signal::Waiting);
    (BarrierRelease { tx }, BarrierGate { rx })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ha_barrier, BarrierError};

    #[tokio::test]
    async fn gate_opens_after_commit() {
        let (release, mut gate) = ha_barrier();
        let waiter = tokio::spawn(async move { gate.wait(Duration::from_secs(5)).await });
        release.committed();
        assert_eq!(waiter.await.expect("join"), Ok(()));
    }

    #[tokio::test]
    async fn dropped_release_breaks_the_barrier() {
        let (release, mut gate) = ha_barrier();
        drop(release);
        assert_eq!(gate.wait(Duration::from_secs(5)).await, Err(BarrierError::PeerEnded));
    }

    #[tokio::test]
    async fn gate_times_out() {
        let (_release, mut gate) = ha_barrier();
        assert!(matches!(
            gate.wait(Duration::from_millis(5)).await,
            Err(BarrierError::TimedOut(_))
        ));
    }
}
