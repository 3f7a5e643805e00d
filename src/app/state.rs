//! Application state shared across routes

use std::sync::Arc;

use uuid::Uuid;

use crate::config::{AccelerationMode, Config};
use crate::game::acceleration::PackedGeometry;
use crate::game::{CleanupSweeper, CombatResolver, Geometry, StateRegistry};
use crate::ws::dispatcher::EventDispatcher;
use crate::ws::hub::ConnectionHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<StateRegistry>,
    pub hub: Arc<ConnectionHub>,
    pub geometry: Arc<Geometry>,
    pub combat: CombatResolver,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Backend is chosen once here and never re-probed
        let geometry = Arc::new(match config.acceleration {
            AccelerationMode::Auto => Geometry::select(Arc::new(PackedGeometry)),
            AccelerationMode::Off => Geometry::reference(),
        });

        let registry = Arc::new(StateRegistry::new());
        let hub = Arc::new(ConnectionHub::new(config.outbound_queue));
        let combat = CombatResolver::new(registry.clone(), geometry.clone());

        Self {
            config,
            registry,
            hub,
            geometry,
            combat,
        }
    }

    pub fn sweeper(&self) -> CleanupSweeper {
        CleanupSweeper::new(
            self.registry.clone(),
            self.hub.clone(),
            self.config.cleanup_interval,
            self.config.stale_after,
        )
    }

    /// Register an attached connection as a player
    pub fn dispatcher(&self, player_id: Uuid) -> EventDispatcher {
        EventDispatcher::connect(
            player_id,
            self.registry.clone(),
            self.combat.clone(),
            self.hub.clone(),
        )
    }
}
