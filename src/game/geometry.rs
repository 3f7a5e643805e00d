//! Sphere and ray geometry used for hit detection

use std::cmp::Ordering;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Radius of the sphere proxy that stands in for a player
pub const PLAYER_RADIUS: f64 = 0.5;

/// Damage dealt by a single hit
pub const SHOT_DAMAGE: i32 = 25;

/// Geometry errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("Ray direction has zero length")]
    DegenerateRay,
}

/// Point or direction in arena space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }

    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    pub fn distance(self, other: Vec3) -> f64 {
        (self - other).length()
    }

    /// Unit vector in the same direction
    pub fn normalize(self) -> Result<Vec3, GeometryError> {
        let length = self.length();
        if length == 0.0 || !length.is_finite() {
            return Err(GeometryError::DegenerateRay);
        }
        Ok(self * (1.0 / length))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;

    fn mul(self, scalar: f64) -> Vec3 {
        Vec3::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f64,
}

impl Sphere {
    pub const fn new(center: Vec3, radius: f64) -> Self {
        Self { center, radius }
    }
}

/// Ray with a unit-length direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Build a ray, normalizing the direction
    pub fn new(origin: Vec3, direction: Vec3) -> Result<Self, GeometryError> {
        Ok(Self {
            origin,
            direction: direction.normalize()?,
        })
    }

    pub fn at(&self, t: f64) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// A player considered by a hit scan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: Uuid,
    pub position: Vec3,
}

/// Outcome of a single shot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitResult {
    pub hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_position: Option<Vec3>,
    pub damage: i32,
}

impl HitResult {
    pub fn miss() -> Self {
        Self {
            hit: false,
            target_id: None,
            distance: None,
            hit_position: None,
            damage: 0,
        }
    }

    pub fn hit(target_id: Uuid, distance: f64, hit_position: Vec3) -> Self {
        Self {
            hit: true,
            target_id: Some(target_id),
            distance: Some(distance),
            hit_position: Some(hit_position),
            damage: SHOT_DAMAGE,
        }
    }
}

/// True when the spheres touch or overlap
pub fn spheres_intersect(a: &Sphere, b: &Sphere) -> bool {
    a.center.distance(b.center) <= a.radius + b.radius
}

#[allow(clippy::too_many_arguments)]
pub fn spheres_intersect_coords(
    x1: f64,
    y1: f64,
    z1: f64,
    r1: f64,
    x2: f64,
    y2: f64,
    z2: f64,
    r2: f64,
) -> bool {
    spheres_intersect(
        &Sphere::new(Vec3::new(x1, y1, z1), r1),
        &Sphere::new(Vec3::new(x2, y2, z2), r2),
    )
}

/// Distance along the ray to the first non-negative intersection
pub fn ray_sphere_intersect(ray: &Ray, center: Vec3, radius: f64) -> Option<f64> {
    let oc = ray.origin - center;
    // a == 1 for a unit direction
    let b = 2.0 * oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;

    let discriminant = b * b - 4.0 * c;
    if discriminant < 0.0 {
        return None;
    }

    let sqrt_disc = discriminant.sqrt();
    let t0 = (-b - sqrt_disc) / 2.0;
    let t1 = (-b + sqrt_disc) / 2.0;

    if t0 >= 0.0 {
        Some(t0)
    } else if t1 >= 0.0 {
        Some(t1)
    } else {
        None
    }
}

/// Nearest candidate hit by the ray, ignoring `exclude`.
///
/// Candidates at exactly the same distance resolve to the lowest id.
pub fn closest_hit(ray: &Ray, candidates: &[Candidate], exclude: Option<Uuid>) -> HitResult {
    let mut best: Option<(f64, &Candidate)> = None;

    for candidate in candidates {
        if Some(candidate.id) == exclude {
            continue;
        }
        let Some(t) = ray_sphere_intersect(ray, candidate.position, PLAYER_RADIUS) else {
            continue;
        };
        best = match best {
            Some((best_t, best_candidate)) if closer(t, candidate, best_t, best_candidate) => {
                Some((t, candidate))
            }
            None => Some((t, candidate)),
            keep => keep,
        };
    }

    match best {
        Some((t, candidate)) => HitResult::hit(candidate.id, t, ray.at(t)),
        None => HitResult::miss(),
    }
}

/// Ordering used to pick between two hits
pub(crate) fn closer(t: f64, candidate: &Candidate, best_t: f64, best: &Candidate) -> bool {
    match t.partial_cmp(&best_t) {
        Some(Ordering::Less) => true,
        Some(Ordering::Equal) => candidate.id < best.id,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(n: u128, x: f64, y: f64, z: f64) -> Candidate {
        Candidate {
            id: Uuid::from_u128(n),
            position: Vec3::new(x, y, z),
        }
    }

    /// Scan from the origin along +x
    fn scan_along_x(candidates: &[Candidate], exclude: Option<Uuid>) -> HitResult {
        let ray = Ray::new(Vec3::default(), Vec3::new(1.0, 0.0, 0.0)).unwrap();
        closest_hit(&ray, candidates, exclude)
    }

    #[test]
    fn spheres_apart_do_not_intersect() {
        assert!(!spheres_intersect_coords(0.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.5));
        assert!(!spheres_intersect_coords(0.0, 0.0, 0.0, 1.0, 2.1, 0.0, 0.0, 1.0));
    }

    #[test]
    fn overlapping_spheres_intersect() {
        assert!(spheres_intersect_coords(0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn touching_spheres_intersect() {
        assert!(spheres_intersect_coords(0.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 1.0));
        assert!(spheres_intersect_coords(0.0, 0.0, 0.0, 1.5, 0.0, 3.0, 0.0, 1.5));
    }

    #[test]
    fn sphere_intersection_is_symmetric() {
        let spheres = [
            Sphere::new(Vec3::new(0.0, 0.0, 0.0), 1.0),
            Sphere::new(Vec3::new(2.0, 0.0, 0.0), 1.0),
            Sphere::new(Vec3::new(0.3, -4.0, 2.0), 0.25),
            Sphere::new(Vec3::new(-1.0, 1.0, 1.0), 3.0),
        ];
        for a in &spheres {
            for b in &spheres {
                assert_eq!(spheres_intersect(a, b), spheres_intersect(b, a));
            }
        }
    }

    #[test]
    fn zero_direction_is_degenerate() {
        assert_eq!(
            Ray::new(Vec3::default(), Vec3::default()),
            Err(GeometryError::DegenerateRay)
        );
        let direction = Vec3::new(f64::NAN, 0.0, 0.0);
        assert_eq!(
            Ray::new(Vec3::default(), direction),
            Err(GeometryError::DegenerateRay)
        );
    }

    #[test]
    fn ray_direction_is_normalized() {
        let ray = Ray::new(Vec3::default(), Vec3::new(0.0, 3.0, 4.0)).unwrap();
        assert!((ray.direction.length() - 1.0).abs() < 1e-12);
        assert!((ray.direction.y - 0.6).abs() < 1e-12);
    }

    #[test]
    fn ray_hits_front_surface() {
        let ray = Ray::new(Vec3::default(), Vec3::new(10.0, 0.0, 0.0)).unwrap();
        let t = ray_sphere_intersect(&ray, Vec3::new(5.0, 0.0, 0.0), 0.5).unwrap();
        assert!((t - 4.5).abs() < 1e-12);
    }

    #[test]
    fn ray_from_inside_hits_far_surface() {
        let ray = Ray::new(Vec3::default(), Vec3::new(1.0, 0.0, 0.0)).unwrap();
        let t = ray_sphere_intersect(&ray, Vec3::new(0.2, 0.0, 0.0), 0.5).unwrap();
        assert!((t - 0.7).abs() < 1e-12);
    }

    #[test]
    fn sphere_behind_origin_is_a_miss() {
        let ray = Ray::new(Vec3::default(), Vec3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(ray_sphere_intersect(&ray, Vec3::new(-5.0, 0.0, 0.0), 0.5), None);
    }

    #[test]
    fn ray_passing_beside_sphere_misses() {
        let ray = Ray::new(Vec3::default(), Vec3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(ray_sphere_intersect(&ray, Vec3::new(5.0, 0.6, 0.0), 0.5), None);
    }

    #[test]
    fn closest_of_two_players_is_hit() {
        let near = candidate(2, 5.0, 0.0, 0.0);
        let far = candidate(1, 10.0, 0.0, 0.0);
        let result = scan_along_x(&[far, near], None);

        assert!(result.hit);
        assert_eq!(result.target_id, Some(near.id));
        assert_eq!(result.damage, SHOT_DAMAGE);
        assert!((result.distance.unwrap() - 4.5).abs() < 1e-12);
        let position = result.hit_position.unwrap();
        assert!((position.x - 4.5).abs() < 1e-12);
    }

    #[test]
    fn excluded_candidate_is_skipped() {
        let shooter = candidate(1, 0.0, 0.0, 0.0);
        let target = candidate(2, 5.0, 0.0, 0.0);
        let result = scan_along_x(&[shooter, target], Some(shooter.id));
        assert_eq!(result.target_id, Some(target.id));
    }

    #[test]
    fn equal_distances_pick_lowest_id() {
        let a = candidate(7, 5.0, 0.0, 0.0);
        let b = candidate(3, 5.0, 0.0, 0.0);
        let c = candidate(9, 5.0, 0.0, 0.0);
        for order in [[a, b, c], [c, a, b], [b, c, a]] {
            let result = scan_along_x(&order, None);
            assert_eq!(result.target_id, Some(b.id));
        }
    }

    #[test]
    fn no_candidates_is_a_miss() {
        assert_eq!(scan_along_x(&[], None), HitResult::miss());
        let only_shooter = candidate(1, 0.0, 0.0, 0.0);
        assert_eq!(
            scan_along_x(&[only_shooter], Some(only_shooter.id)),
            HitResult::miss()
        );
    }

    #[test]
    fn miss_serializes_without_optional_fields() {
        let json = serde_json::to_value(HitResult::miss()).unwrap();
        assert_eq!(json, serde_json::json!({ "hit": false, "damage": 0 }));
    }
}
