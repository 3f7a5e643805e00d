//! Geometry backend selection
//!
//! The server can run hit detection through an optimized backend. Which
//! backend is used is decided once at startup by probing the candidate with
//! known-answer checks; afterwards every call that the optimized backend
//! fails, or answers with an impossible result, is retried through the
//! reference implementation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::geometry::{
    self, closer, Candidate, HitResult, Ray, Sphere, Vec3, PLAYER_RADIUS, SHOT_DAMAGE,
};

/// Errors raised by an optimized backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccelerationError {
    #[error("Operation not supported by backend: {0}")]
    Unsupported(&'static str),

    #[error("Backend returned a malformed result: {0}")]
    MalformedResult(String),
}

/// Operations a backend claims to provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub add: bool,
    pub spheres_intersect_coords: bool,
    pub spheres_intersect: bool,
    pub ray_hit_spheres: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        add: true,
        spheres_intersect_coords: true,
        spheres_intersect: true,
        ray_hit_spheres: true,
    };

    /// First required operation the backend lacks
    pub fn missing(&self) -> Option<&'static str> {
        [
            (self.add, "add"),
            (self.spheres_intersect_coords, "spheres_intersect_coords"),
            (self.spheres_intersect, "spheres_intersect"),
            (self.ray_hit_spheres, "ray_hit_spheres"),
        ]
        .into_iter()
        .find_map(|(present, op)| (!present).then_some(op))
    }
}

/// A geometry implementation
pub trait GeometryBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    fn add(&self, a: i64, b: i64) -> Result<i64, AccelerationError>;

    #[allow(clippy::too_many_arguments)]
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
    ) -> Result<bool, AccelerationError>;

    fn spheres_intersect(&self, a: &Sphere, b: &Sphere) -> Result<bool, AccelerationError>;

    fn ray_hit_spheres(
        &self,
        ray: &Ray,
        candidates: &[Candidate],
        exclude: Option<Uuid>,
    ) -> Result<HitResult, AccelerationError>;
}

/// Straightforward implementation on top of [`geometry`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceGeometry;

impl GeometryBackend for ReferenceGeometry {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn add(&self, a: i64, b: i64) -> Result<i64, AccelerationError> {
        Ok(a.wrapping_add(b))
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
        Ok(geometry::spheres_intersect_coords(x1, y1, z1, r1, x2, y2, z2, r2))
    }

    fn spheres_intersect(&self, a: &Sphere, b: &Sphere) -> Result<bool, AccelerationError> {
        Ok(geometry::spheres_intersect(a, b))
    }

    fn ray_hit_spheres(
        &self,
        ray: &Ray,
        candidates: &[Candidate],
        exclude: Option<Uuid>,
    ) -> Result<HitResult, AccelerationError> {
        Ok(geometry::closest_hit(ray, candidates, exclude))
    }
}

/// Optimized backend.
///
/// Compares squared distances so sphere tests skip the square root, and
/// rejects ray candidates by their projected distance before solving for the
/// entry point. Results are checked before they are returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackedGeometry;

impl PackedGeometry {
    fn entry_distance(ray: &Ray, center: Vec3, radius: f64) -> Option<f64> {
        let to_center = center - ray.origin;
        let r2 = radius * radius;
        let tca = to_center.dot(ray.direction);
        let center_dist2 = to_center.length_squared();

        // Sphere behind the origin, origin outside the sphere
        if tca < 0.0 && center_dist2 > r2 {
            return None;
        }

        let d2 = center_dist2 - tca * tca;
        if d2 > r2 {
            return None;
        }

        let thc = (r2 - d2).max(0.0).sqrt();
        let t0 = tca - thc;
        let t1 = tca + thc;
        if t0 >= 0.0 {
            Some(t0)
        } else if t1 >= 0.0 {
            Some(t1)
        } else {
            None
        }
    }
}

impl GeometryBackend for PackedGeometry {
    fn name(&self) -> &'static str {
        "packed"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn add(&self, a: i64, b: i64) -> Result<i64, AccelerationError> {
        a.checked_add(b)
            .ok_or_else(|| AccelerationError::MalformedResult("integer overflow".to_string()))
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
        self.spheres_intersect(
            &Sphere::new(Vec3::new(x1, y1, z1), r1),
            &Sphere::new(Vec3::new(x2, y2, z2), r2),
        )
    }

    fn spheres_intersect(&self, a: &Sphere, b: &Sphere) -> Result<bool, AccelerationError> {
        let dist2 = (a.center - b.center).length_squared();
        let reach = a.radius + b.radius;
        if !dist2.is_finite() || !reach.is_finite() {
            return Err(AccelerationError::MalformedResult(
                "non-finite sphere input".to_string(),
            ));
        }
        Ok(reach >= 0.0 && dist2 <= reach * reach)
    }

    fn ray_hit_spheres(
        &self,
        ray: &Ray,
        candidates: &[Candidate],
        exclude: Option<Uuid>,
    ) -> Result<HitResult, AccelerationError> {
        let mut best: Option<(f64, &Candidate)> = None;

        for candidate in candidates.iter().filter(|c| Some(c.id) != exclude) {
            let Some(t) = Self::entry_distance(ray, candidate.position, PLAYER_RADIUS) else {
                continue;
            };
            match best {
                Some((best_t, best_candidate))
                    if !closer(t, candidate, best_t, best_candidate) => {}
                _ => best = Some((t, candidate)),
            }
        }

        let Some((t, candidate)) = best else {
            return Ok(HitResult::miss());
        };

        let position = ray.at(t);
        if !t.is_finite() || t < 0.0 || !position.is_finite() {
            return Err(AccelerationError::MalformedResult(format!(
                "hit distance {t} is not a finite non-negative value"
            )));
        }
        Ok(HitResult::hit(candidate.id, t, position))
    }
}

/// Geometry facade used by the rest of the server.
///
/// Callers never see backend failures: an error, a panic or an impossible
/// result from the optimized backend is logged and the call is answered by
/// the reference implementation.
pub struct Geometry {
    accelerated: Option<Arc<dyn GeometryBackend>>,
}

impl Geometry {
    /// Reference implementation only
    pub fn reference() -> Self {
        Self { accelerated: None }
    }

    /// Probe `candidate` once and use it if it passes
    pub fn select(candidate: Arc<dyn GeometryBackend>) -> Self {
        match probe(candidate.as_ref()) {
            Ok(()) => {
                info!(backend = candidate.name(), "Using accelerated geometry backend");
                Self {
                    accelerated: Some(candidate),
                }
            }
            Err(e) => {
                warn!(
                    backend = candidate.name(),
                    error = %e,
                    "Accelerated geometry unavailable, using reference implementation"
                );
                Self::reference()
            }
        }
    }

    /// Name of the backend answering calls
    pub fn backend_name(&self) -> &'static str {
        self.accelerated
            .as_ref()
            .map(|backend| backend.name())
            .unwrap_or_else(|| ReferenceGeometry.name())
    }

    pub fn is_accelerated(&self) -> bool {
        self.accelerated.is_some()
    }

    /// Closest candidate hit by a ray from `origin` along `direction`
    pub fn ray_hit(
        &self,
        origin: Vec3,
        direction: Vec3,
        candidates: &[Candidate],
        exclude: Option<Uuid>,
    ) -> HitResult {
        let Ok(ray) = Ray::new(origin, direction) else {
            return HitResult::miss();
        };
        self.with_fallback(
            "ray_hit_spheres",
            |backend| {
                let result = backend.ray_hit_spheres(&ray, candidates, exclude)?;
                check_hit_result(&result, candidates, exclude)?;
                Ok(result)
            },
            || geometry::closest_hit(&ray, candidates, exclude),
        )
    }

    fn with_fallback<T>(
        &self,
        op: &'static str,
        accelerated: impl FnOnce(&dyn GeometryBackend) -> Result<T, AccelerationError>,
        reference: impl FnOnce() -> T,
    ) -> T {
        if let Some(backend) = &self.accelerated {
            match panic::catch_unwind(AssertUnwindSafe(|| accelerated(backend.as_ref()))) {
                Ok(Ok(value)) => return value,
                Ok(Err(e)) => {
                    warn!(
                        backend = backend.name(),
                        op,
                        error = %e,
                        "Accelerated geometry failed, falling back"
                    );
                }
                Err(_) => {
                    warn!(
                        backend = backend.name(),
                        op,
                        "Accelerated geometry panicked, falling back"
                    );
                }
            }
        }
        reference()
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::reference()
    }
}

/// Known-answer checks a backend must pass before it is selected
pub fn probe(backend: &dyn GeometryBackend) -> Result<(), AccelerationError> {
    if let Some(op) = backend.capabilities().missing() {
        return Err(AccelerationError::Unsupported(op));
    }

    expect(backend.add(2, 3)? == 5, "add(2, 3) != 5")?;
    expect(
        !backend.spheres_intersect_coords(0.0, 0.0, 0.0, 1.0, 2.1, 0.0, 0.0, 1.0)?,
        "separate spheres reported as intersecting",
    )?;
    expect(
        backend.spheres_intersect_coords(0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0)?,
        "overlapping spheres reported as separate",
    )?;
    let a = Sphere::new(Vec3::new(0.0, 0.0, 0.0), 1.0);
    let b = Sphere::new(Vec3::new(0.0, 2.0, 0.0), 1.0);
    expect(backend.spheres_intersect(&a, &b)?, "touching spheres reported as separate")?;

    let near = Candidate {
        id: Uuid::from_u128(1),
        position: Vec3::new(5.0, 0.0, 0.0),
    };
    let far = Candidate {
        id: Uuid::from_u128(2),
        position: Vec3::new(10.0, 0.0, 0.0),
    };
    let ray = Ray::new(Vec3::default(), Vec3::new(1.0, 0.0, 0.0))
        .map_err(|e| AccelerationError::MalformedResult(e.to_string()))?;
    let result = backend.ray_hit_spheres(&ray, &[far, near], None)?;
    expect(
        result == ReferenceGeometry.ray_hit_spheres(&ray, &[far, near], None)?,
        "ray scan disagrees with reference",
    )?;
    expect(result.target_id == Some(near.id), "ray scan picked the wrong player")?;

    Ok(())
}

/// Reject scan results that no correct backend could produce
fn check_hit_result(
    result: &HitResult,
    candidates: &[Candidate],
    exclude: Option<Uuid>,
) -> Result<(), AccelerationError> {
    if !result.hit {
        return expect(
            result.target_id.is_none()
                && result.distance.is_none()
                && result.hit_position.is_none()
                && result.damage == 0,
            "miss carries hit details",
        );
    }

    let Some(target_id) = result.target_id else {
        return expect(false, "hit without a target");
    };
    expect(Some(target_id) != exclude, "hit on the excluded player")?;
    expect(
        candidates.iter().any(|c| c.id == target_id),
        "hit on a player outside the scan",
    )?;
    expect(
        matches!(result.distance, Some(t) if t.is_finite() && t >= 0.0),
        "hit distance is not a finite non-negative value",
    )?;
    expect(
        matches!(result.hit_position, Some(p) if p.is_finite()),
        "hit position missing or not finite",
    )?;
    expect(result.damage == SHOT_DAMAGE, "unexpected damage value")
}

fn expect(ok: bool, reason: &str) -> Result<(), AccelerationError> {
    if ok {
        Ok(())
    } else {
        Err(AccelerationError::MalformedResult(reason.to_string()))
    }
}
