//! Background eviction of expired entries from the link cache.
//!
//! Reads already drop an expired record when they trip over it, but a code
//! nobody asks for again would sit in memory forever. The reaper walks the
//! cache on a fixed interval and evicts up to one batch of expired codes per
//! tick. It never touches the durable store, which expires rows on its own.

use crate::{cache::LinkCache, models::now_epoch};
use std::{ops::ControlFlow, time::Duration};
use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::{debug, error, info};

/// Smallest batch a sweep will work with.
pub const MIN_BATCH_SIZE: usize = 16;

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Time between sweeps.
    pub interval: Duration,

    /// Maximum number of codes evicted per sweep.
    pub batch_size: usize,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            batch_size: 1024,
        }
    }
}

/// Handle to the running reaper. Dropping it stops the task.
#[derive(Debug)]
pub struct Reaper {
    shutdown_tx: watch::Sender<bool>,
}

impl Reaper {
    /// Spawn the sweep loop on the current tokio runtime.
    pub fn start(cache: LinkCache, config: ReaperConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            interval_secs = config.interval.as_secs(),
            batch_size = config.batch_size,
            "Cache reaper started"
        );
        tokio::spawn(reaper_loop(cache, config, shutdown_rx));

        Self { shutdown_tx }
    }

    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            info!("Cache reaper stopped");
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn reaper_loop(cache: LinkCache, config: ReaperConfig, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the cache was just warmed.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Cache reaper received shutdown signal");
                    return;
                }
            }
        }

        // Each sweep runs in its own task so a panic inside it is contained
        // to this tick.
        let sweep_cache = cache.clone();
        let batch_size = config.batch_size;
        let outcome = tokio::spawn(async move { sweep(&sweep_cache, batch_size, now_epoch()) }).await;

        match outcome {
            Ok(0) => debug!(cached = cache.len(), "Cache sweep found nothing to evict"),
            Ok(evicted) => info!(evicted, cached = cache.len(), "Expired links evicted from cache"),
            Err(e) => error!("Cache sweep failed: {}", e),
        }
    }
}

/// Evict at most `batch_size` codes that are expired at `now`.
///
/// The walk stops as soon as the batch is full. Returns the number of codes
/// actually evicted.
pub fn sweep(cache: &LinkCache, batch_size: usize, now: u64) -> usize {
    if batch_size == 0 {
        return 0;
    }

    let mut batch = Vec::new();
    cache.for_each(|record| {
        if record.is_expired_at(now) {
            batch.push(record.code.clone());
        }
        if batch.len() >= batch_size {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    cache.evict_expired(&batch, now)
}
