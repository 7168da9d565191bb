//! Collaborator ports: the host-world queries this engine consumes.
//!
//! Every call is synchronous and expected to be fast. Implementations report
//! failures as [`DomainError::Collaborator`]; callers degrade them to neutral
//! values instead of aborting.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::geometry::{Location, PlayerId, StormId, WorldId};

/// Queries about online players.
pub trait PlayerSource: Send + Sync {
    /// All players in `world` within `radius` euclidean distance of `location`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Collaborator` if the world cannot be queried.
    fn players_near(
        &self,
        world: &WorldId,
        location: &Location,
        radius: f64,
    ) -> Result<Vec<PlayerId>, DomainError>;

    /// The player's current location, `None` when offline.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Collaborator` if the lookup fails.
    fn current_location(&self, player: PlayerId) -> Result<Option<Location>, DomainError>;

    /// Whether the player is online.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Collaborator` if the lookup fails.
    fn is_online(&self, player: PlayerId) -> Result<bool, DomainError>;
}

/// A party plugin. `None` means the player has no party.
pub trait PartySource: Send + Sync {
    /// Members of the player's party, which may include the player.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Collaborator` if the party plugin fails.
    fn party_of(&self, player: PlayerId) -> Result<Option<HashSet<PlayerId>>, DomainError>;
}

/// Scoreboard-style team membership, consulted when no party is found.
pub trait TeamSource: Send + Sync {
    /// Members of the player's team, which may include offline players.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Collaborator` if the lookup fails.
    fn team_of(&self, player: PlayerId) -> Result<Option<HashSet<PlayerId>>, DomainError>;
}

/// Land-claim lookup (towns, protected regions).
pub trait ClaimSource: Send + Sync {
    /// Returns true when the location is not claimed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Collaborator` if the claim system fails.
    fn is_wilderness(&self, location: &Location) -> Result<bool, DomainError>;
}

/// A traveling storm as seen by this engine. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storm {
    /// Storm identity.
    pub id: StormId,
    /// Current centre.
    pub location: Location,
    /// Intensity on a 0 to 100 scale.
    #[serde(default)]
    pub intensity: u8,
}

/// The storm host.
pub trait StormSource: Send + Sync {
    /// Every storm currently active.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Collaborator` if the storm host fails.
    fn active_storms(&self) -> Result<Vec<Storm>, DomainError>;
}

/// The server economy.
pub trait Economy: Send + Sync {
    /// Credits `amount` to the player.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Collaborator` if the deposit is rejected.
    fn deposit(&self, player: PlayerId, amount: u64) -> Result<(), DomainError>;
}

/// Resolves the vertical coordinate of a sampled spawn point.
pub trait SurfaceResolver: Send + Sync {
    /// Height of the highest solid surface at `location`'s column.
    fn surface_y(&self, location: &Location) -> Option<f64>;
}
