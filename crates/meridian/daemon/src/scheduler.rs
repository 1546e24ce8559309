//! Background eviction loop

use meridian_registry::InstanceRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Runs eviction passes at a fixed interval until shutdown
pub struct Evictor {
    registry: Arc<dyn InstanceRegistry>,
    every: Duration,
}

impl Evictor {
    pub fn new(registry: Arc<dyn InstanceRegistry>, every: Duration) -> Self {
        Self { registry, every }
    }

    /// Start the loop on the runtime
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; nothing can have expired yet.
        ticker.tick().await;

        tracing::info!(interval_ms = self.every.as_millis() as u64, "Evictor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Outcomes are logged by the registry itself.
                    if let Err(e) = self.registry.evict().await {
                        tracing::error!(error = %e, "Eviction pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Evictor stopped");
    }
}
