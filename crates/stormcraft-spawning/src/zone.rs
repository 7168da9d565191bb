//! Spawn zones: concentric rings around a storm centre.

use std::f64::consts::TAU;

use serde::Serialize;
use stormcraft_core::config::ZonesConfig;
use stormcraft_core::error::DomainError;
use stormcraft_core::geometry::Location;
use stormcraft_core::ports::SurfaceResolver;
use stormcraft_core::rng::DeterministicRng;

/// One ring: a selection percentage and a planar distance band
/// `[min_radius, max_radius)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpawnRing {
    pub name: String,
    pub percent: u32,
    pub min_radius: f64,
    pub max_radius: f64,
}

impl SpawnRing {
    /// Returns true when `distance` falls inside the band.
    #[must_use]
    pub fn contains(&self, distance: f64) -> bool {
        distance >= self.min_radius && distance < self.max_radius
    }
}

/// A sampled spawn location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpawnPoint {
    pub location: Location,
    /// Name of the ring the point was drawn from.
    pub ring: String,
    /// Planar distance from the centre.
    pub distance: f64,
    /// Angle in radians, in `[0, 2π)`.
    pub angle: f64,
}

/// Samples spawn points from a validated ring layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnZoneSampler {
    rings: Vec<SpawnRing>,
}

impl SpawnZoneSampler {
    /// Builds a sampler from `zones`, innermost ring first.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` if the percentages do not sum to
    /// 100 or a band is empty.
    pub fn from_config(zones: &ZonesConfig) -> Result<Self, DomainError> {
        zones.validate()?;
        let rings = zones
            .rings
            .iter()
            .map(|ring| SpawnRing {
                name: ring.name.clone(),
                percent: ring.percent,
                min_radius: ring.min_radius,
                max_radius: ring.max_radius,
            })
            .collect();
        Ok(Self { rings })
    }

    #[must_use]
    pub fn rings(&self) -> &[SpawnRing] {
        &self.rings
    }

    /// Picks a ring: one draw in `0..=99` checked against cumulative
    /// percentages.
    pub fn select_ring(&self, rng: &mut dyn DeterministicRng) -> &SpawnRing {
        let draw = rng.next_u32_range(0, 99);
        let mut cumulative = 0;
        for ring in &self.rings {
            cumulative += ring.percent;
            if draw < cumulative {
                return ring;
            }
        }
        // Percentages sum to 100, so this is only reached for an out-of-range draw.
        &self.rings[self.rings.len() - 1]
    }

    /// Uniform angle, uniform radius inside the selected ring's band, offset
    /// on the horizontal plane. `y` is copied from `center`.
    pub fn sample(&self, center: &Location, rng: &mut dyn DeterministicRng) -> SpawnPoint {
        let ring = self.select_ring(rng);
        let angle = rng.next_f64() * TAU;
        let distance = ring.min_radius + rng.next_f64() * (ring.max_radius - ring.min_radius);
        SpawnPoint {
            location: center.offset_planar(distance * angle.cos(), distance * angle.sin()),
            ring: ring.name.clone(),
            distance,
            angle,
        }
    }

    /// Like [`SpawnZoneSampler::sample`], with `y` resolved to the surface.
    /// An unresolvable column keeps the centre's `y`.
    pub fn sample_with_surface(
        &self,
        center: &Location,
        rng: &mut dyn DeterministicRng,
        resolver: &dyn SurfaceResolver,
    ) -> SpawnPoint {
        let mut point = self.sample(center, rng);
        if let Some(y) = resolver.surface_y(&point.location) {
            point.location.y = y;
        }
        point
    }

    /// The ring whose band holds `location`'s planar distance from `center`.
    #[must_use]
    pub fn ring_containing(&self, center: &Location, location: &Location) -> Option<&SpawnRing> {
        if !center.same_world(location) {
            return None;
        }
        let distance = center.planar_distance(location);
        self.rings.iter().find(|ring| ring.contains(distance))
    }

    /// Outer radius of the widest ring.
    #[must_use]
    pub fn max_reach(&self) -> f64 {
        self.rings
            .iter()
            .map(|ring| ring.max_radius)
            .fold(0.0, f64::max)
    }
}
