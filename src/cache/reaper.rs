//! Background sweeping of expired cache entries
//!
//! Reads already ignore expired entries, so the reaper only reclaims memory.
//! It runs on its own tokio task and never touches the request path.

use crate::cache::{codec::Codec, store::CacheStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Something the reaper can sweep
pub trait Sweep: Send + Sync + 'static {
    /// Remove expired entries and return how many were removed
    fn sweep_expired(&self) -> usize;
}

impl<C: Codec + 'static> Sweep for CacheStore<C> {
    fn sweep_expired(&self) -> usize {
        self.purge_expired()
    }
}

/// Counters exposed by a running reaper
#[derive(Debug, Default)]
pub struct ReaperStats {
    sweeps: AtomicU64,
    purged: AtomicU64,
}

impl ReaperStats {
    /// Completed sweeps
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Entries removed across all sweeps
    pub fn purged(&self) -> u64 {
        self.purged.load(Ordering::Relaxed)
    }
}

/// Handle to the background sweeping task
pub struct Reaper {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<ReaperStats>,
}

impl Reaper {
    /// Spawn a reaper sweeping `target` every `interval`
    ///
    /// Must be called from within a tokio runtime. The first sweep happens
    /// one full interval after spawning.
    pub fn spawn<S: Sweep>(target: Arc<S>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let stats = Arc::new(ReaperStats::default());
        let task_stats = Arc::clone(&stats);

        info!("Starting cache reaper (interval: {:?})", interval);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = target.sweep_expired();
                        task_stats.sweeps.fetch_add(1, Ordering::Relaxed);
                        task_stats.purged.fetch_add(purged as u64, Ordering::Relaxed);
                        if purged > 0 {
                            debug!("Reaper purged {} expired entries", purged);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        // A dropped sender also means stop
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Cache reaper stopped");
        });

        Self {
            shutdown,
            task,
            stats,
        }
    }

    /// Sweep counters
    pub fn stats(&self) -> Arc<ReaperStats> {
        Arc::clone(&self.stats)
    }

    /// Whether the sweeping task is still alive
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the task to stop and wait for it to exit
    pub async fn shutdown(self) {
        // Err means the task already exited
        let _ = self.shutdown.send(true);

        if let Err(e) = self.task.await {
            warn!("Cache reaper task ended abnormally: {}", e);
        }
        info!("Cache reaper shut down");
    }
}
