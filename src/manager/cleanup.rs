use super::AuthManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

/// Runs one sweep on the blocking pool. Returns the number of sessions
/// removed, or zero when the sweep failed.
pub async fn run_session_cleanup(manager: Arc<AuthManager>) -> usize {
    match task::spawn_blocking(move || manager.cleanup_expired_sessions()).await {
        Ok(Ok(deleted)) => deleted,
        Ok(Err(err)) => {
            error!(error = %err, "session cleanup failed");
            0
        }
        Err(err) => {
            error!(error = %err, "session cleanup task panicked");
            0
        }
    }
}

/// Sweeps expired sessions every `period`, starting immediately, until
/// `shutdown` turns true or its sender is dropped.
pub fn spawn_session_cleanup(
    manager: Arc<AuthManager>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = period.as_millis() as u64, "session cleanup started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let deleted = run_session_cleanup(Arc::clone(&manager)).await;
                    debug!(deleted, "session cleanup tick");
                }
            }
        }
        info!("session cleanup stopped");
    })
}
