//! Test collaborators: party, team, claim, storm, and economy fakes.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use stormcraft_core::error::DomainError;
use stormcraft_core::geometry::{Location, PlayerId};
use stormcraft_core::ports::{ClaimSource, Economy, PartySource, Storm, StormSource, TeamSource};

fn groups_by_member(groups: &[Vec<PlayerId>]) -> HashMap<PlayerId, HashSet<PlayerId>> {
    let mut by_member = HashMap::new();
    for group in groups {
        let members: HashSet<PlayerId> = group.iter().copied().collect();
        for member in group {
            by_member.insert(*member, members.clone());
        }
    }
    by_member
}

/// A party plugin with fixed parties. Each party includes its own members.
#[derive(Debug, Default)]
pub struct StaticPartySource {
    parties: HashMap<PlayerId, HashSet<PlayerId>>,
    failing: bool,
    calls: Mutex<usize>,
}

impl StaticPartySource {
    /// Create a source with the given parties.
    #[must_use]
    pub fn new(parties: &[Vec<PlayerId>]) -> Self {
        Self {
            parties: groups_by_member(parties),
            failing: false,
            calls: Mutex::new(0),
        }
    }

    /// A party source whose every call fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Number of `party_of` calls served so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl PartySource for StaticPartySource {
    fn party_of(&self, player: PlayerId) -> Result<Option<HashSet<PlayerId>>, DomainError> {
        *self.calls.lock().unwrap() += 1;
        if self.failing {
            return Err(DomainError::Collaborator("party plugin unavailable".into()));
        }
        Ok(self.parties.get(&player).cloned())
    }
}

/// Scoreboard-style teams with fixed membership.
#[derive(Debug, Default)]
pub struct StaticTeamSource {
    teams: HashMap<PlayerId, HashSet<PlayerId>>,
}

impl StaticTeamSource {
    /// Create a source with the given teams.
    #[must_use]
    pub fn new(teams: &[Vec<PlayerId>]) -> Self {
        Self {
            teams: groups_by_member(teams),
        }
    }
}

impl TeamSource for StaticTeamSource {
    fn team_of(&self, player: PlayerId) -> Result<Option<HashSet<PlayerId>>, DomainError> {
        Ok(self.teams.get(&player).cloned())
    }
}

/// Claim lookup returning a fixed answer, or claiming discs around points.
#[derive(Debug)]
pub struct StaticClaims {
    claimed: Vec<(Location, f64)>,
    everywhere: Option<bool>,
    failing: bool,
}

impl StaticClaims {
    /// Every location is wilderness.
    #[must_use]
    pub fn wilderness() -> Self {
        Self {
            claimed: Vec::new(),
            everywhere: Some(true),
            failing: false,
        }
    }

    /// Every location is claimed.
    #[must_use]
    pub fn claimed() -> Self {
        Self {
            everywhere: Some(false),
            ..Self::wilderness()
        }
    }

    /// Locations within `radius` of `center` are claimed; the rest is wilderness.
    #[must_use]
    pub fn town(center: Location, radius: f64) -> Self {
        Self {
            claimed: vec![(center, radius)],
            everywhere: None,
            failing: false,
        }
    }

    /// A claim source whose every call fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::wilderness()
        }
    }
}

impl ClaimSource for StaticClaims {
    fn is_wilderness(&self, location: &Location) -> Result<bool, DomainError> {
        if self.failing {
            return Err(DomainError::Collaborator("claim plugin unavailable".into()));
        }
        if let Some(answer) = self.everywhere {
            return Ok(answer);
        }
        Ok(!self
            .claimed
            .iter()
            .any(|(center, radius)| center.is_within(location, *radius)))
    }
}

/// A storm host with a mutable list of storms.
#[derive(Debug, Default)]
pub struct StaticStorms {
    storms: Mutex<Vec<Storm>>,
    failing: bool,
}

impl StaticStorms {
    /// Create a host with the given storms.
    #[must_use]
    pub fn new(storms: Vec<Storm>) -> Self {
        Self {
            storms: Mutex::new(storms),
            failing: false,
        }
    }

    /// A storm host whose every call fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            storms: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    /// Replace the active storms.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set(&self, storms: Vec<Storm>) {
        *self.storms.lock().unwrap() = storms;
    }
}

impl StormSource for StaticStorms {
    fn active_storms(&self) -> Result<Vec<Storm>, DomainError> {
        if self.failing {
            return Err(DomainError::Collaborator("storm host unavailable".into()));
        }
        Ok(self.storms.lock().unwrap().clone())
    }
}

/// An economy that records every deposit and rejects a chosen set of players.
#[derive(Debug, Default)]
pub struct RecordingEconomy {
    deposits: Mutex<Vec<(PlayerId, u64)>>,
    rejected: HashSet<PlayerId>,
}

impl RecordingEconomy {
    /// Create an economy that accepts every deposit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an economy that rejects deposits for `players`.
    #[must_use]
    pub fn rejecting(players: &[PlayerId]) -> Self {
        Self {
            deposits: Mutex::new(Vec::new()),
            rejected: players.iter().copied().collect(),
        }
    }

    /// Returns a snapshot of all accepted deposits, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn deposits(&self) -> Vec<(PlayerId, u64)> {
        self.deposits.lock().unwrap().clone()
    }

    /// Total amount deposited for `player`.
    #[must_use]
    pub fn total_for(&self, player: PlayerId) -> u64 {
        self.deposits()
            .iter()
            .filter(|(p, _)| *p == player)
            .map(|(_, amount)| amount)
            .sum()
    }
}

impl Economy for RecordingEconomy {
    fn deposit(&self, player: PlayerId, amount: u64) -> Result<(), DomainError> {
        if self.rejected.contains(&player) {
            return Err(DomainError::Collaborator(format!(
                "deposit rejected for {player}"
            )));
        }
        self.deposits.lock().unwrap().push((player, amount));
        Ok(())
    }
}

/// An economy whose every deposit fails.
#[derive(Debug, Default)]
pub struct FailingEconomy;

impl Economy for FailingEconomy {
    fn deposit(&self, _player: PlayerId, _amount: u64) -> Result<(), DomainError> {
        Err(DomainError::Collaborator("economy unavailable".into()))
    }
}
