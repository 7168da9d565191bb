//! Density cache: time-windowed "who is near X" and "who is grouped with P".
//!
//! Nearby-player lists are keyed by world, rounded radius, and a coarse
//! spatial bucket, so queries from points in the same bucket share an entry.
//! Party sets are keyed by player. Both expire after the same TTL; stale
//! entries are dropped on access and by [`DensityCache::sweep`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use stormcraft_core::clock::{Clock, elapsed_ms};
use stormcraft_core::config::DensityConfig;
use stormcraft_core::error::DomainError;
use stormcraft_core::geometry::{Location, PlayerId, WorldId};
use stormcraft_core::ports::{PartySource, PlayerSource, TeamSource};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DensityKey {
    world: WorldId,
    radius: i64,
    bucket: (i64, i64, i64),
}

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    cached_at: DateTime<Utc>,
}

impl<T> Cached<T> {
    fn is_expired(&self, now: DateTime<Utc>, ttl_ms: u64) -> bool {
        elapsed_ms(self.cached_at, now) >= ttl_ms
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheSettings {
    ttl_ms: u64,
    bucket_size: f64,
}

/// Entry counts, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub density_entries: usize,
    pub party_entries: usize,
}

/// Shared cache of player-density and party lookups.
pub struct DensityCache {
    players: Arc<dyn PlayerSource>,
    parties: Option<Arc<dyn PartySource>>,
    teams: Option<Arc<dyn TeamSource>>,
    clock: Arc<dyn Clock>,
    settings: RwLock<CacheSettings>,
    density: Mutex<HashMap<DensityKey, Cached<Vec<PlayerId>>>>,
    party: Mutex<HashMap<PlayerId, Cached<HashSet<PlayerId>>>>,
}

// Entries are inserted and removed whole, so a map behind a poisoned lock is
// still consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DensityCache {
    /// Creates an empty cache over `players`.
    #[must_use]
    pub fn new(
        players: Arc<dyn PlayerSource>,
        clock: Arc<dyn Clock>,
        config: &DensityConfig,
    ) -> Self {
        Self {
            players,
            parties: None,
            teams: None,
            clock,
            settings: RwLock::new(CacheSettings {
                ttl_ms: config.ttl_ms,
                bucket_size: config.bucket_size,
            }),
            density: Mutex::new(HashMap::new()),
            party: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches a party plugin, consulted first for party membership.
    #[must_use]
    pub fn with_party_source(mut self, parties: Arc<dyn PartySource>) -> Self {
        self.parties = Some(parties);
        self
    }

    /// Attaches a team source, consulted when the player has no party.
    #[must_use]
    pub fn with_team_source(mut self, teams: Arc<dyn TeamSource>) -> Self {
        self.teams = Some(teams);
        self
    }

    fn settings(&self) -> CacheSettings {
        *self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current time-to-live in milliseconds.
    #[must_use]
    pub fn ttl_ms(&self) -> u64 {
        self.settings().ttl_ms
    }

    /// Replaces the TTL. Existing entries are judged against the new value.
    pub fn set_ttl(&self, ttl_ms: u64) {
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .ttl_ms = ttl_ms;
    }

    /// Applies reloaded settings. A new bucket size invalidates every
    /// density entry, since their keys no longer line up.
    pub fn reconfigure(&self, config: &DensityConfig) {
        let bucket_changed = {
            let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
            let changed = (settings.bucket_size - config.bucket_size).abs() > f64::EPSILON;
            settings.ttl_ms = config.ttl_ms;
            settings.bucket_size = config.bucket_size;
            changed
        };
        if bucket_changed {
            lock(&self.density).clear();
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn key(location: &Location, radius: f64, bucket_size: f64) -> DensityKey {
        DensityKey {
            world: location.world.clone(),
            radius: radius.round() as i64,
            bucket: location.bucket(bucket_size),
        }
    }

    /// Players within `radius` of `location`, served from cache when a fresh
    /// entry exists for the same bucket.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a negative or non-finite radius,
    /// or `DomainError::Collaborator` if the world query fails.
    pub fn nearby_players(
        &self,
        location: &Location,
        radius: f64,
    ) -> Result<Vec<PlayerId>, DomainError> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(DomainError::Validation(format!(
                "radius must be a finite non-negative number, got {radius}"
            )));
        }
        let settings = self.settings();
        let key = Self::key(location, radius, settings.bucket_size);
        let now = self.clock.now();

        {
            let mut cache = lock(&self.density);
            match cache.get(&key) {
                Some(entry) if !entry.is_expired(now, settings.ttl_ms) => {
                    return Ok(entry.value.clone());
                }
                Some(_) => {
                    cache.remove(&key);
                }
                None => {}
            }
        }

        // The world is queried without holding the lock.
        let players = self.players.players_near(&location.world, location, radius)?;
        debug!(
            world = %location.world,
            radius,
            count = players.len(),
            "density cache miss"
        );
        lock(&self.density).insert(
            key,
            Cached {
                value: players.clone(),
                cached_at: now,
            },
        );
        Ok(players)
    }

    /// Number of players within `radius` of `location`.
    ///
    /// # Errors
    ///
    /// Same as [`DensityCache::nearby_players`].
    pub fn nearby_count(&self, location: &Location, radius: f64) -> Result<usize, DomainError> {
        self.nearby_players(location, radius).map(|players| players.len())
    }

    /// The player's party members, excluding the player.
    ///
    /// Asks the party plugin first, then falls back to team membership
    /// (online members only). No affiliation yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Collaborator` if a party, team, or online lookup
    /// fails. Failures are not cached.
    pub fn party_members_of(&self, player: PlayerId) -> Result<HashSet<PlayerId>, DomainError> {
        let ttl_ms = self.settings().ttl_ms;
        let now = self.clock.now();

        {
            let mut cache = lock(&self.party);
            match cache.get(&player) {
                Some(entry) if !entry.is_expired(now, ttl_ms) => return Ok(entry.value.clone()),
                Some(_) => {
                    cache.remove(&player);
                }
                None => {}
            }
        }

        let members = self.resolve_party(player)?;
        lock(&self.party).insert(
            player,
            Cached {
                value: members.clone(),
                cached_at: now,
            },
        );
        Ok(members)
    }

    fn resolve_party(&self, player: PlayerId) -> Result<HashSet<PlayerId>, DomainError> {
        if let Some(parties) = &self.parties {
            let mut members = parties.party_of(player)?.unwrap_or_default();
            members.remove(&player);
            if !members.is_empty() {
                return Ok(members);
            }
        }

        let Some(teams) = &self.teams else {
            return Ok(HashSet::new());
        };
        let Some(team) = teams.team_of(player)? else {
            return Ok(HashSet::new());
        };
        let mut members = HashSet::new();
        for member in team {
            if member != player && self.players.is_online(member)? {
                members.insert(member);
            }
        }
        Ok(members)
    }

    /// Returns true when the player has at least one party member.
    ///
    /// # Errors
    ///
    /// Same as [`DensityCache::party_members_of`].
    pub fn is_in_party(&self, player: PlayerId) -> Result<bool, DomainError> {
        Ok(!self.party_members_of(player)?.is_empty())
    }

    /// How many of `candidates` are in the player's party, not counting the
    /// player.
    ///
    /// # Errors
    ///
    /// Same as [`DensityCache::party_members_of`].
    pub fn party_member_count(
        &self,
        player: PlayerId,
        candidates: &[PlayerId],
    ) -> Result<usize, DomainError> {
        let members = self.party_members_of(player)?;
        Ok(candidates
            .iter()
            .filter(|c| **c != player && members.contains(c))
            .count())
    }

    /// How many of `candidates` are outside the player's party, not counting
    /// the player.
    ///
    /// # Errors
    ///
    /// Same as [`DensityCache::party_members_of`].
    pub fn non_party_count(
        &self,
        player: PlayerId,
        candidates: &[PlayerId],
    ) -> Result<usize, DomainError> {
        let members = self.party_members_of(player)?;
        Ok(candidates
            .iter()
            .filter(|c| **c != player && !members.contains(c))
            .count())
    }

    /// Purges expired entries from both maps and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let ttl_ms = self.settings().ttl_ms;
        let now = self.clock.now();

        let mut density = lock(&self.density);
        let before = density.len();
        density.retain(|_, entry| !entry.is_expired(now, ttl_ms));
        let mut removed = before - density.len();
        drop(density);

        let mut party = lock(&self.party);
        let before = party.len();
        party.retain(|_, entry| !entry.is_expired(now, ttl_ms));
        removed += before - party.len();

        if removed > 0 {
            debug!(removed, "swept expired density cache entries");
        }
        removed
    }

    /// Drops every entry.
    pub fn clear(&self) {
        lock(&self.density).clear();
        lock(&self.party).clear();
    }

    /// Current entry counts.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            density_entries: lock(&self.density).len(),
            party_entries: lock(&self.party).len(),
        }
    }
}

impl std::fmt::Debug for DensityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DensityCache")
            .field("settings", &self.settings())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
