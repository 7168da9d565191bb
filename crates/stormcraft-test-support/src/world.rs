//! Test worlds: in-memory `PlayerSource` implementations for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use stormcraft_core::error::DomainError;
use stormcraft_core::geometry::{Location, PlayerId, WorldId};
use stormcraft_core::ports::PlayerSource;

/// Shorthand for a location in the `overworld` world.
#[must_use]
pub fn location(x: f64, y: f64, z: f64) -> Location {
    Location::new(WorldId::new("overworld"), x, y, z)
}

#[derive(Debug, Clone)]
struct PlacedPlayer {
    location: Location,
    online: bool,
}

/// A world with a fixed set of players. Counts `players_near` calls so tests
/// can assert cache hits.
#[derive(Debug, Default)]
pub struct StaticWorld {
    players: Mutex<Vec<(PlayerId, PlacedPlayer)>>,
    queries: AtomicUsize,
}

impl StaticWorld {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an online player at `location` and return its id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn spawn(&self, location: Location) -> PlayerId {
        let id = PlayerId::new_v4();
        self.players.lock().unwrap().push((
            id,
            PlacedPlayer {
                location,
                online: true,
            },
        ));
        id
    }

    /// Add an online player with a known id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn place(&self, id: PlayerId, location: Location) {
        let mut players = self.players.lock().unwrap();
        players.retain(|(p, _)| *p != id);
        players.push((
            id,
            PlacedPlayer {
                location,
                online: true,
            },
        ));
    }

    /// Mark a player as offline. Offline players are invisible to queries.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn disconnect(&self, id: PlayerId) {
        for (p, placed) in self.players.lock().unwrap().iter_mut() {
            if *p == id {
                placed.online = false;
            }
        }
    }

    /// Number of `players_near` calls served so far.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn lookup(&self, id: PlayerId) -> Option<PlacedPlayer> {
        self.players
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| *p == id)
            .map(|(_, placed)| placed.clone())
    }
}

impl PlayerSource for StaticWorld {
    fn players_near(
        &self,
        world: &WorldId,
        location: &Location,
        radius: f64,
    ) -> Result<Vec<PlayerId>, DomainError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let players = self.players.lock().unwrap();
        Ok(players
            .iter()
            .filter(|(_, placed)| {
                placed.online
                    && placed.location.world == *world
                    && placed.location.is_within(location, radius)
            })
            .map(|(id, _)| *id)
            .collect())
    }

    fn current_location(&self, player: PlayerId) -> Result<Option<Location>, DomainError> {
        Ok(self
            .lookup(player)
            .filter(|placed| placed.online)
            .map(|placed| placed.location))
    }

    fn is_online(&self, player: PlayerId) -> Result<bool, DomainError> {
        Ok(self.lookup(player).is_some_and(|placed| placed.online))
    }
}

/// A player source whose every call fails. Useful for testing degradation.
#[derive(Debug, Default)]
pub struct FailingPlayerSource;

impl PlayerSource for FailingPlayerSource {
    fn players_near(
        &self,
        _world: &WorldId,
        _location: &Location,
        _radius: f64,
    ) -> Result<Vec<PlayerId>, DomainError> {
        Err(DomainError::Collaborator("world unavailable".into()))
    }

    fn current_location(&self, _player: PlayerId) -> Result<Option<Location>, DomainError> {
        Err(DomainError::Collaborator("world unavailable".into()))
    }

    fn is_online(&self, _player: PlayerId) -> Result<bool, DomainError> {
        Err(DomainError::Collaborator("world unavailable".into()))
    }
}
