//! Fixed-interval driver for the aggregation cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::PriceAggregator;

/// Runs [`PriceAggregator::aggregate_and_store`] on a fixed schedule.
///
/// One logical invocation at a time: if a cycle is still running when the
/// next tick fires, the tick is skipped. Shutdown is signalled through a
/// watch channel so the binary can stop the scheduler before the store
/// goes away.
pub struct AggregationScheduler {
    aggregator: Arc<PriceAggregator>,
    interval: Duration,
    cycle_guard: Arc<Mutex<()>>,
}

impl AggregationScheduler {
    /// Create a scheduler for the given aggregator and cycle period.
    #[must_use]
    pub fn new(aggregator: Arc<PriceAggregator>, interval: Duration) -> Self {
        Self {
            aggregator,
            interval,
            cycle_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Spawn the scheduler loop. The first cycle runs immediately.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_secs = self.interval.as_secs(), "aggregation scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.cycle_guard.try_lock() {
                            Ok(_guard) => self.aggregator.aggregate_and_store().await,
                            Err(_) => {
                                debug!("previous aggregation cycle still running, skipping tick");
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("aggregation scheduler stopping");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn scheduler_runs_cycles_and_stops_on_shutdown() {
        let store = Store::open_in_memory().await.unwrap();
        // No gateways: every cycle logs "no quotes" and returns quickly.
        let aggregator = Arc::new(PriceAggregator::new(
            Vec::new(),
            store,
            vec!["BTCUSDT".to_string()],
        ));

        let scheduler =
            AggregationScheduler::new(Arc::clone(&aggregator), Duration::from_millis(10));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = scheduler.spawn(shutdown_rx);

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(true).unwrap();

        // The loop must exit promptly after the signal.
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
