//! World positions and identities of the things that occupy them.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of a world (dimension) hosted by the game server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub String);

impl WorldId {
    /// Creates a world identifier from its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identity of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Generates a fresh random player identity.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable identity of a traveling storm owned by the storm host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StormId(pub Uuid);

impl StormId {
    /// Generates a fresh random storm identity.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for StormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A point in a world. `y` is the vertical axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// The world this point belongs to.
    pub world: WorldId,
    /// East-west coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
    /// North-south coordinate.
    pub z: f64,
}

impl Location {
    /// Creates a location.
    #[must_use]
    pub fn new(world: WorldId, x: f64, y: f64, z: f64) -> Self {
        Self { world, x, y, z }
    }

    /// Returns true when both points are in the same world.
    #[must_use]
    pub fn same_world(&self, other: &Location) -> bool {
        self.world == other.world
    }

    /// Euclidean distance, or `None` when the points are in different worlds.
    #[must_use]
    pub fn distance(&self, other: &Location) -> Option<f64> {
        self.same_world(other)
            .then(|| self.distance_squared(other).sqrt())
    }

    /// Squared Euclidean distance ignoring the world.
    #[must_use]
    pub fn distance_squared(&self, other: &Location) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Horizontal (x/z plane) distance ignoring the world.
    #[must_use]
    pub fn planar_distance(&self, other: &Location) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// Returns true when `other` is in the same world and within `radius`.
    #[must_use]
    pub fn is_within(&self, other: &Location, radius: f64) -> bool {
        self.same_world(other) && self.distance_squared(other) <= radius * radius
    }

    /// Returns a copy shifted horizontally by `(dx, dz)`.
    #[must_use]
    pub fn offset_planar(&self, dx: f64, dz: f64) -> Self {
        Self {
            world: self.world.clone(),
            x: self.x + dx,
            y: self.y,
            z: self.z + dz,
        }
    }

    /// Integer bucket coordinates for a grid of `bucket_size` cells per axis.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn bucket(&self, bucket_size: f64) -> (i64, i64, i64) {
        (
            (self.x / bucket_size).floor() as i64,
            (self.y / bucket_size).floor() as i64,
            (self.z / bucket_size).floor() as i64,
        )
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@({:.1}, {:.1}, {:.1})", self.world, self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overworld(x: f64, y: f64, z: f64) -> Location {
        Location::new(WorldId::new("overworld"), x, y, z)
    }

    #[test]
    fn test_distance_in_same_world() {
        let a = overworld(0.0, 64.0, 0.0);
        let b = overworld(3.0, 64.0, 4.0);

        assert_eq!(a.distance(&b), Some(5.0));
        assert!(a.is_within(&b, 5.0));
        assert!(!a.is_within(&b, 4.99));
    }

    #[test]
    fn test_distance_across_worlds_is_none() {
        let a = overworld(0.0, 64.0, 0.0);
        let b = Location::new(WorldId::new("nether"), 0.0, 64.0, 0.0);

        assert_eq!(a.distance(&b), None);
        assert!(!a.is_within(&b, 1_000.0));
    }

    #[test]
    fn test_bucket_floors_negative_coordinates() {
        let loc = overworld(-1.0, 15.9, 16.0);

        assert_eq!(loc.bucket(16.0), (-1, 0, 1));
    }

    #[test]
    fn test_offset_planar_keeps_height_and_world() {
        let loc = overworld(10.0, 70.0, -5.0).offset_planar(2.5, -2.5);

        assert_eq!(loc, overworld(12.5, 70.0, -7.5));
    }
}
