//! Combat system - hit detection and damage

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::acceleration::Geometry;
use super::geometry::{HitResult, Vec3};
use super::registry::{DamageOutcome, RegistryError, StateRegistry};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CombatError {
    #[error("Shooter is not in the arena: {0}")]
    UnknownShooter(Uuid),
}

/// Everything that happened because of one shot
#[derive(Debug, Clone, PartialEq)]
pub struct ShotOutcome {
    pub shooter_id: Uuid,
    pub hit: HitResult,
    /// Health change on the target, absent on a miss or when the target vanished
    pub damage: Option<DamageOutcome>,
}

impl ShotOutcome {
    /// Target id when this shot eliminated someone
    pub fn eliminated(&self) -> Option<Uuid> {
        match self.damage {
            Some(DamageOutcome { eliminated: true, .. }) => self.hit.target_id,
            _ => None,
        }
    }
}

/// Resolves shots against the shared registry
#[derive(Clone)]
pub struct CombatResolver {
    registry: Arc<StateRegistry>,
    geometry: Arc<Geometry>,
}

impl CombatResolver {
    pub fn new(registry: Arc<StateRegistry>, geometry: Arc<Geometry>) -> Self {
        Self { registry, geometry }
    }

    /// Cast a ray for `shooter_id` and apply damage to whoever it hits first
    pub fn resolve_shot(
        &self,
        shooter_id: Uuid,
        origin: Vec3,
        direction: Vec3,
    ) -> Result<ShotOutcome, CombatError> {
        if !self.registry.contains(shooter_id) {
            return Err(CombatError::UnknownShooter(shooter_id));
        }

        let candidates = self.registry.candidates_except(shooter_id);
        let hit = self
            .geometry
            .ray_hit(origin, direction, &candidates, Some(shooter_id));

        let damage = match hit.target_id {
            Some(target_id) if hit.hit => match self.registry.apply_damage(target_id, hit.damage) {
                Ok(outcome) => {
                    if outcome.eliminated {
                        info!(
                            shooter_id = %shooter_id,
                            target_id = %target_id,
                            "Player eliminated"
                        );
                    }
                    Some(outcome)
                }
                Err(RegistryError::UnknownPlayer(_)) => {
                    debug!(target_id = %target_id, "Hit target left before damage was applied");
                    None
                }
                Err(e) => {
                    debug!(target_id = %target_id, error = %e, "Damage not applied");
                    None
                }
            },
            _ => None,
        };

        Ok(ShotOutcome {
            shooter_id,
            hit,
            damage,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use uuid::Uuid;

    use crate::game::acceleration::{
        AccelerationError, Capabilities, GeometryBackend, ReferenceGeometry,
    };
    use crate::game::geometry::{Candidate, HitResult, Ray, Sphere};
    use crate::game::registry::StateRegistry;

    /// Reference answers, but whoever gets hit leaves the arena before the
    /// answer is returned
    pub(crate) struct VanishingBackend {
        pub(crate) registry: Arc<StateRegistry>,
    }

    impl GeometryBackend for VanishingBackend {
        fn name(&self) -> &'static str {
            "vanishing"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::ALL
        }

        fn add(&self, a: i64, b: i64) -> Result<i64, AccelerationError> {
            ReferenceGeometry.add(a, b)
        }

        fn spheres_intersect_coords(
            &self,
            x1: f64,
            y1: f64,
            z1: f64,
            r1: f64,
            x2: f64,
            y2: f64,
            z2: f64,
            r2: f64,
        ) -> Result<bool, AccelerationError> {
            ReferenceGeometry.spheres_intersect_coords(x1, y1, z1, r1, x2, y2, z2, r2)
        }

        fn spheres_intersect(&self, a: &Sphere, b: &Sphere) -> Result<bool, AccelerationError> {
            ReferenceGeometry.spheres_intersect(a, b)
        }

        fn ray_hit_spheres(
            &self,
            ray: &Ray,
            candidates: &[Candidate],
            exclude: Option<Uuid>,
        ) -> Result<HitResult, AccelerationError> {
            let result = ReferenceGeometry.ray_hit_spheres(ray, candidates, exclude)?;
            if let Some(target_id) = result.target_id {
                self.registry.remove(target_id);
            }
            Ok(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::VanishingBackend;
    use super::*;
    use crate::game::acceleration::PackedGeometry;
    use crate::game::registry::PlayerUpdate;

    fn setup() -> (Arc<StateRegistry>, CombatResolver) {
        let registry = Arc::new(StateRegistry::new());
        let geometry = Arc::new(Geometry::select(Arc::new(PackedGeometry)));
        let resolver = CombatResolver::new(registry.clone(), geometry);
        (registry, resolver)
    }

    fn place(registry: &StateRegistry, x: f64) -> Uuid {
        let id = Uuid::new_v4();
        registry.register(id);
        registry
            .update(
                id,
                PlayerUpdate {
                    x: Some(x),
                    y: Some(0.0),
                    z: Some(0.0),
                    rotation: None,
                },
            )
            .unwrap();
        id
    }

    #[test]
    fn shot_damages_nearest_target() {
        let (registry, resolver) = setup();
        let shooter = place(&registry, 0.0);
        let near = place(&registry, 5.0);
        let far = place(&registry, 10.0);

        let outcome = resolver
            .resolve_shot(shooter, Vec3::default(), Vec3::new(1.0, 0.0, 0.0))
            .unwrap();

        assert!(outcome.hit.hit);
        assert_eq!(outcome.hit.target_id, Some(near));
        assert_eq!(outcome.hit.damage, 25);
        assert_eq!(outcome.damage, Some(DamageOutcome { health: 75, eliminated: false }));
        assert_eq!(registry.get(near).unwrap().health, 75);
        assert_eq!(registry.get(far).unwrap().health, 100);
        assert_eq!(registry.get(shooter).unwrap().health, 100);
    }

    #[test]
    fn shooter_never_hits_itself() {
        let (registry, resolver) = setup();
        let shooter = place(&registry, 0.0);

        let outcome = resolver
            .resolve_shot(shooter, Vec3::default(), Vec3::new(1.0, 0.0, 0.0))
            .unwrap();

        assert!(!outcome.hit.hit);
        assert_eq!(outcome.damage, None);
        assert_eq!(registry.get(shooter).unwrap().health, 100);
    }

    #[test]
    fn fourth_hit_eliminates_with_attribution() {
        let (registry, resolver) = setup();
        let shooter = place(&registry, 0.0);
        let target = place(&registry, 5.0);

        let outcomes: Vec<ShotOutcome> = (0..5)
            .map(|_| {
                resolver
                    .resolve_shot(shooter, Vec3::default(), Vec3::new(1.0, 0.0, 0.0))
                    .unwrap()
            })
            .collect();

        assert_eq!(outcomes[3].eliminated(), Some(target));
        assert_eq!(outcomes.iter().filter(|o| o.eliminated().is_some()).count(), 1);
        // Eliminated players stay in the arena
        assert!(registry.contains(target));
        assert_eq!(outcomes[4].damage, Some(DamageOutcome { health: 0, eliminated: false }));
    }

    #[test]
    fn target_leaving_mid_shot_takes_no_damage() {
        let registry = Arc::new(StateRegistry::new());
        let geometry = Geometry::select(Arc::new(VanishingBackend {
            registry: registry.clone(),
        }));
        assert!(geometry.is_accelerated());
        let resolver = CombatResolver::new(registry.clone(), Arc::new(geometry));
        let shooter = place(&registry, 0.0);
        let target = place(&registry, 5.0);

        let outcome = resolver
            .resolve_shot(shooter, Vec3::default(), Vec3::new(1.0, 0.0, 0.0))
            .unwrap();

        assert!(outcome.hit.hit);
        assert_eq!(outcome.hit.target_id, Some(target));
        assert_eq!(outcome.damage, None);
        assert_eq!(outcome.eliminated(), None);
        assert!(!registry.contains(target));
        assert_eq!(registry.get(shooter).unwrap().health, 100);
    }

    #[test]
    fn unknown_shooter_is_rejected() {
        let (_registry, resolver) = setup();
        let ghost = Uuid::new_v4();
        assert_eq!(
            resolver.resolve_shot(ghost, Vec3::default(), Vec3::new(1.0, 0.0, 0.0)),
            Err(CombatError::UnknownShooter(ghost))
        );
    }

    #[test]
    fn degenerate_direction_misses() {
        let (registry, resolver) = setup();
        let shooter = place(&registry, 0.0);
        place(&registry, 0.2);

        let outcome = resolver
            .resolve_shot(shooter, Vec3::default(), Vec3::default())
            .unwrap();
        assert!(!outcome.hit.hit);
        assert_eq!(outcome.damage, None);
    }
}
