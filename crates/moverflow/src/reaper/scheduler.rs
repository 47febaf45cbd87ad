//! Periodic reaper for long-running deployments.
//!
//! Ingestion already reaps inline; the scheduler covers processes that
//! dispatch on demand without ingesting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::broadcast;

use super::Reaper;

/// Runs [`Reaper::reap`] on an interval, or when triggered.
pub struct ReaperScheduler {
    reaper: Reaper,
    interval: Duration,
    stale_timeout: Duration,
    shutdown: Arc<AtomicBool>,
}

impl ReaperScheduler {
    pub fn new(reaper: Reaper, interval: Duration, stale_timeout: Duration) -> Self {
        Self {
            reaper,
            interval,
            stale_timeout,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the reap loop in a background thread.
    /// Accepts a trigger receiver for manual reap requests.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let reaper = self.reaper.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;
        let stale_timeout = self.stale_timeout;

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Reaper scheduler could not start a runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                let mut interval_timer = tokio::time::interval(interval);
                interval_timer.tick().await; // skip immediate first tick

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    tokio::select! {
                        _ = interval_timer.tick() => {},
                        Ok(()) = trigger_rx.recv() => {
                            log::info!("Manual reap triggered");
                        },
                    }

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    match reaper.reap(stale_timeout) {
                        Ok(n) if n > 0 => log::info!("Scheduled reap failed {} job(s)", n),
                        Err(e) => log::error!("Scheduled reap failed: {}", e),
                        _ => {}
                    }
                }
            });
        })
    }

    /// Signals the scheduler to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
