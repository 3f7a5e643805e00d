//! Periodic eviction of stale players

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::util::time::unix_millis;
use crate::ws::hub::ConnectionHub;
use crate::ws::protocol::ServerMsg;

use super::registry::StateRegistry;

/// Removes players that stopped sending updates
pub struct CleanupSweeper {
    registry: Arc<StateRegistry>,
    hub: Arc<ConnectionHub>,
    interval: Duration,
    stale_after: Duration,
}

impl CleanupSweeper {
    pub fn new(
        registry: Arc<StateRegistry>,
        hub: Arc<ConnectionHub>,
        interval: Duration,
        stale_after: Duration,
    ) -> Self {
        Self {
            registry,
            hub,
            interval,
            stale_after,
        }
    }

    /// Run one sweep at the current time
    pub fn sweep(&self) -> Vec<Uuid> {
        self.sweep_at(unix_millis())
    }

    /// Run one sweep as if the clock read `now` (unix millis)
    pub fn sweep_at(&self, now: u64) -> Vec<Uuid> {
        // Skip the write lock when there is nobody to scan
        if self.registry.is_empty() {
            return Vec::new();
        }

        let removed = self
            .registry
            .remove_stale(now, self.stale_after.as_millis() as u64);
        if removed.is_empty() {
            return removed;
        }

        // Closing the queue ends the connection's session
        for id in &removed {
            self.hub.detach(*id);
            info!(player_id = %id, "Cleaned up stale player");
        }

        self.hub.broadcast(&ServerMsg::PlayersCleaned {
            disconnected_players: removed.clone(),
            total_players: self.registry.len(),
        });
        removed
    }

    /// Sweep every interval until `shutdown` flips to true or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!(
            interval_secs = self.interval.as_secs_f64(),
            stale_after_secs = self.stale_after.as_secs_f64(),
            "Cleanup sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep();
                    debug!(removed = removed.len(), "Sweep complete");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Cleanup sweeper stopped");
    }
}
