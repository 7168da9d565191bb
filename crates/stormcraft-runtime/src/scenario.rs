//! Static worlds described in YAML, for tuning runs of the engine.
//!
//! ```yaml
//! seed: 42
//! players:
//!   - name: alice
//!     party: red
//!     location: { world: overworld, x: 1.0, y: 64.0, z: 0.0 }
//! storms:
//!   - location: { world: overworld, x: 0.0, y: 64.0, z: 0.0 }
//!     intensity: 60
//! towns:
//!   - name: harbor
//!     center: { world: overworld, x: 500.0, y: 64.0, z: 500.0 }
//!     radius: 80.0
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use serde::Deserialize;
use stormcraft_core::error::DomainError;
use stormcraft_core::geometry::{Location, PlayerId, StormId, WorldId};
use stormcraft_core::ports::{ClaimSource, Economy, PartySource, PlayerSource, Storm, StormSource};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioPlayer {
    pub name: String,
    pub location: Location,
    #[serde(default)]
    pub party: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioStorm {
    pub location: Location,
    #[serde(default)]
    pub intensity: u8,
}

/// A claimed disc; everything outside every town is wilderness.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Town {
    pub name: String,
    pub center: Location,
    pub radius: f64,
}

/// A tuning scenario.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    /// RNG seed; a random one is used when absent.
    pub seed: Option<u64>,
    pub players: Vec<ScenarioPlayer>,
    pub storms: Vec<ScenarioStorm>,
    pub towns: Vec<Town>,
}

impl Scenario {
    /// Parses a scenario from YAML.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` if the YAML is malformed.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DomainError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| DomainError::Configuration(format!("invalid scenario: {e}")))
    }

    /// Reads and parses a scenario file.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the file cannot be read, or
    /// `DomainError::Configuration` if it is malformed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            DomainError::Infrastructure(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }
}

/// Every collaborator the engine needs, backed by a fixed [`Scenario`].
/// Deposits accumulate into per-player balances.
#[derive(Debug)]
pub struct ScenarioWorld {
    players: Vec<(PlayerId, ScenarioPlayer)>,
    parties: HashMap<String, HashSet<PlayerId>>,
    storms: Vec<Storm>,
    towns: Vec<Town>,
    balances: Mutex<BTreeMap<PlayerId, u64>>,
}

impl ScenarioWorld {
    /// Assigns every player and storm a fresh identity.
    #[must_use]
    pub fn new(scenario: Scenario) -> Self {
        let players: Vec<(PlayerId, ScenarioPlayer)> = scenario
            .players
            .into_iter()
            .map(|player| (PlayerId::new_v4(), player))
            .collect();
        let mut parties: HashMap<String, HashSet<PlayerId>> = HashMap::new();
        for (id, player) in &players {
            if let Some(party) = &player.party {
                parties.entry(party.clone()).or_default().insert(*id);
            }
        }
        let storms = scenario
            .storms
            .into_iter()
            .map(|storm| Storm {
                id: StormId::new_v4(),
                location: storm.location,
                intensity: storm.intensity,
            })
            .collect();
        Self {
            players,
            parties,
            storms,
            towns: scenario.towns,
            balances: Mutex::new(BTreeMap::new()),
        }
    }

    /// Player identities in scenario order.
    #[must_use]
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|(id, _)| *id).collect()
    }

    #[must_use]
    pub fn name_of(&self, player: PlayerId) -> Option<&str> {
        self.find(player).map(|p| p.name.as_str())
    }

    /// Accumulated deposits keyed by player name. Players who earned
    /// nothing are listed with zero.
    #[must_use]
    pub fn balances_by_name(&self) -> BTreeMap<String, u64> {
        let balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
        self.players
            .iter()
            .map(|(id, player)| (player.name.clone(), balances.get(id).copied().unwrap_or(0)))
            .collect()
    }

    fn find(&self, player: PlayerId) -> Option<&ScenarioPlayer> {
        self.players
            .iter()
            .find(|(id, _)| *id == player)
            .map(|(_, p)| p)
    }
}

impl PlayerSource for ScenarioWorld {
    fn players_near(
        &self,
        world: &WorldId,
        location: &Location,
        radius: f64,
    ) -> Result<Vec<PlayerId>, DomainError> {
        Ok(self
            .players
            .iter()
            .filter(|(_, p)| p.location.world == *world && p.location.is_within(location, radius))
            .map(|(id, _)| *id)
            .collect())
    }

    fn current_location(&self, player: PlayerId) -> Result<Option<Location>, DomainError> {
        Ok(self.find(player).map(|p| p.location.clone()))
    }

    fn is_online(&self, player: PlayerId) -> Result<bool, DomainError> {
        Ok(self.find(player).is_some())
    }
}

impl PartySource for ScenarioWorld {
    fn party_of(&self, player: PlayerId) -> Result<Option<HashSet<PlayerId>>, DomainError> {
        Ok(self
            .find(player)
            .and_then(|p| p.party.as_ref())
            .and_then(|party| self.parties.get(party))
            .cloned())
    }
}

impl ClaimSource for ScenarioWorld {
    fn is_wilderness(&self, location: &Location) -> Result<bool, DomainError> {
        Ok(!self
            .towns
            .iter()
            .any(|town| town.center.is_within(location, town.radius)))
    }
}

impl StormSource for ScenarioWorld {
    fn active_storms(&self) -> Result<Vec<Storm>, DomainError> {
        Ok(self.storms.clone())
    }
}

impl Economy for ScenarioWorld {
    fn deposit(&self, player: PlayerId, amount: u64) -> Result<(), DomainError> {
        if self.find(player).is_none() {
            return Err(DomainError::Collaborator(format!("unknown player {player}")));
        }
        *self
            .balances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(player)
            .or_insert(0) += amount;
        Ok(())
    }
}
