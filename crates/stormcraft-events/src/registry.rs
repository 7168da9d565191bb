//! Event registry: the single authority over active events.
//!
//! Starting an event stamps the cooldown ledger; ending one runs the body's
//! closing hooks and hands successful completions to the reward engine. No
//! body hook runs under the registry lock, so bodies may call back into the
//! registry. Each active event owns an optional tokio tick timer
//! that is aborted when the event ends or the registry shuts down.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use stormcraft_core::body::{BodyStatus, EventBody};
use stormcraft_core::clock::Clock;
use stormcraft_core::config::MAX_DURATION_SECS;
use stormcraft_core::error::DomainError;
use stormcraft_core::event::{EventDescriptor, EventId, EventState, EventType};
use stormcraft_core::geometry::PlayerId;
use stormcraft_rewards::{PayoutReport, RewardEngine};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::contribution::ContributionTracker;
use crate::ledger::CooldownLedger;
use crate::slot::{BodySlot, Checkout, Closing, context};

struct ActiveEvent {
    descriptor: EventDescriptor,
    state: EventState,
    body: Arc<BodySlot>,
    participants: BTreeSet<PlayerId>,
    contributions: ContributionTracker,
    progress: u32,
    started_at: DateTime<Utc>,
    timer: Option<AbortHandle>,
}

impl ActiveEvent {
    fn snapshot(&self, now: DateTime<Utc>) -> EventSnapshot {
        EventSnapshot {
            descriptor: self.descriptor.clone(),
            state: self.state,
            started_at: self.started_at,
            participants: self.participants.clone(),
            contributions: self.contributions.as_map(),
            progress: self.progress,
            remaining_seconds: self.descriptor.remaining_seconds(now),
        }
    }
}

/// Point-in-time view of an active event.
#[derive(Debug, Clone, Serialize)]
pub struct EventSnapshot {
    pub descriptor: EventDescriptor,
    pub state: EventState,
    pub started_at: DateTime<Utc>,
    pub participants: BTreeSet<PlayerId>,
    pub contributions: BTreeMap<PlayerId, f64>,
    pub progress: u32,
    pub remaining_seconds: u32,
}

/// What happened when an event ended.
#[derive(Debug, Clone, Serialize)]
pub struct EndReport {
    pub event_id: EventId,
    pub event_type: EventType,
    pub success: bool,
    /// `Completed` or `Failed`.
    pub state: EventState,
    pub participants: BTreeSet<PlayerId>,
    /// Computed payouts, empty unless the event succeeded.
    pub payouts: BTreeMap<PlayerId, u64>,
    /// Deposit outcome, present only when a reward engine paid out.
    pub payout: Option<PayoutReport>,
}

/// Holds every active event and drives their lifecycle.
pub struct EventRegistry {
    active: Mutex<HashMap<EventId, ActiveEvent>>,
    ledger: Arc<CooldownLedger>,
    clock: Arc<dyn Clock>,
    rewards: Option<Arc<RewardEngine>>,
    tick_interval: RwLock<Duration>,
    shut_down: AtomicBool,
    this: Weak<EventRegistry>,
}

impl EventRegistry {
    /// Creates an empty registry.
    ///
    /// Per-event timers tick every `tick_interval` and are only spawned when
    /// `start` runs inside a tokio runtime. Without `rewards`, successful
    /// events end without payouts.
    #[must_use]
    pub fn new(
        ledger: Arc<CooldownLedger>,
        clock: Arc<dyn Clock>,
        rewards: Option<Arc<RewardEngine>>,
        tick_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            active: Mutex::new(HashMap::new()),
            ledger,
            clock,
            rewards,
            tick_interval: RwLock::new(tick_interval),
            shut_down: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EventId, ActiveEvent>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The ledger stamped on every start.
    #[must_use]
    pub fn ledger(&self) -> &Arc<CooldownLedger> {
        &self.ledger
    }

    /// Returns true once `shutdown` has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Period used for timers of events started from now on.
    pub fn set_tick_interval(&self, interval: Duration) {
        *self
            .tick_interval
            .write()
            .unwrap_or_else(PoisonError::into_inner) = interval;
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        *self
            .tick_interval
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Activates an event: records it, stamps the per-type and global
    /// cooldowns, runs `on_start`, and starts its tick timer.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ShutDown` after `shutdown`, or
    /// `DomainError::Validation` if an event with the same id is active.
    #[instrument(
        skip_all,
        fields(event_id = %descriptor.id, event_type = %descriptor.event_type)
    )]
    pub fn start(
        &self,
        descriptor: EventDescriptor,
        body: Box<dyn EventBody>,
    ) -> Result<EventId, DomainError> {
        if self.is_shut_down() {
            return Err(DomainError::ShutDown);
        }
        let now = self.clock.now();
        let id = descriptor.id;
        let event_type = descriptor.event_type;
        let location = descriptor.location.clone();
        let duration = descriptor.duration_seconds;
        let slot = Arc::new(BodySlot::new(body));

        {
            let mut active = self.lock();
            // Re-checked under the lock so a concurrent shutdown cannot miss us.
            if self.is_shut_down() {
                return Err(DomainError::ShutDown);
            }
            if active.contains_key(&id) {
                return Err(DomainError::Validation(format!("event {id} is already active")));
            }
            active.insert(
                id,
                ActiveEvent {
                    descriptor: descriptor.clone(),
                    state: EventState::Spawning,
                    body: slot.clone(),
                    participants: BTreeSet::new(),
                    contributions: ContributionTracker::new(),
                    progress: 0,
                    started_at: now,
                    timer: None,
                },
            );
        }
        self.ledger.stamp(event_type, now);

        if let Checkout::Ready(mut body) = slot.checkout() {
            body.on_start(&context(&descriptor, &BTreeSet::new(), now));
            slot.checkin(body);
        }

        let mut active = self.lock();
        // The body may have ended its own event from `on_start`.
        if let Some(event) = active.get_mut(&id) {
            event.state = EventState::Active;
            event.timer = self.spawn_timer(id);
        }
        let count = active.len();
        drop(active);

        info!(
            location = %location,
            duration_secs = duration,
            active = count,
            "event started"
        );
        Ok(id)
    }

    fn spawn_timer(&self, id: EventId) -> Option<AbortHandle> {
        let handle = Handle::try_current().ok()?;
        let registry = self.this.clone();
        let period = self.tick_interval().clamp(
            Duration::from_millis(1),
            Duration::from_secs(MAX_DURATION_SECS),
        );
        let task = handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                match registry.tick(id) {
                    Ok(status) if !status.is_terminal() => {}
                    _ => break,
                }
            }
        });
        Some(task.abort_handle())
    }

    /// Ends an event. Returns `None` if it was not active.
    ///
    /// The timer is aborted, then `on_complete` or `on_fail` runs, then
    /// `cleanup`. Rewards are computed and paid only when `success` is true.
    /// Called from inside one of the event's own hooks, the closing hooks
    /// run as soon as that hook returns.
    pub fn end(&self, id: EventId, success: bool) -> Option<EndReport> {
        let mut event = self.lock().remove(&id)?;
        if let Some(timer) = event.timer.take() {
            timer.abort();
        }

        event.state = if success {
            EventState::Completed
        } else {
            EventState::Failed
        };
        event.body.close(Closing {
            success,
            descriptor: event.descriptor.clone(),
            participants: event.participants.clone(),
            now: self.clock.now(),
        });

        let (payouts, payout) = match (&self.rewards, success) {
            (Some(rewards), true) => {
                let payouts = rewards.distribute(
                    &event.descriptor,
                    &event.participants,
                    &event.contributions.as_map(),
                );
                let report = rewards.pay(&payouts);
                (payouts, Some(report))
            }
            _ => (BTreeMap::new(), None),
        };

        info!(
            event_id = %id,
            event_type = %event.descriptor.event_type,
            success,
            participants = event.participants.len(),
            "event ended"
        );
        Some(EndReport {
            event_id: id,
            event_type: event.descriptor.event_type,
            success,
            state: event.state,
            participants: event.participants,
            payouts,
            payout,
        })
    }

    /// Runs the body's `on_tick`. A terminal status ends the event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EventNotFound` if the event is not active.
    pub fn tick(&self, id: EventId) -> Result<BodyStatus, DomainError> {
        let status = self.with_body(id, |this, body, descriptor, participants| {
            let now = this.clock.now();
            body.on_tick(&context(descriptor, participants, now))
        })?;
        if status.is_terminal() {
            debug!(event_id = %id, status = ?status, "body resolved on tick");
            self.end(id, status == BodyStatus::Completed);
        }
        Ok(status)
    }

    /// Adds objective progress and passes it to the body. A terminal status
    /// ends the event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EventNotFound` if the event is not active.
    pub fn record_progress(&self, id: EventId, amount: u32) -> Result<BodyStatus, DomainError> {
        {
            let mut active = self.lock();
            let event = active.get_mut(&id).ok_or(DomainError::EventNotFound(id))?;
            event.progress = event.progress.saturating_add(amount);
        }
        let status = self.with_body(id, |this, body, descriptor, participants| {
            let now = this.clock.now();
            body.on_progress(&context(descriptor, participants, now), amount)
        })?;
        if status.is_terminal() {
            self.end(id, status == BodyStatus::Completed);
        }
        Ok(status)
    }

    /// Runs one hook with the body checked out and the registry unlocked.
    ///
    /// A hook re-entering its own event on the same thread is skipped and
    /// reported as `Running`.
    fn with_body<F>(&self, id: EventId, hook: F) -> Result<BodyStatus, DomainError>
    where
        F: FnOnce(&Self, &mut dyn EventBody, &EventDescriptor, &BTreeSet<PlayerId>) -> BodyStatus,
    {
        let (slot, descriptor, participants) = {
            let active = self.lock();
            let event = active.get(&id).ok_or(DomainError::EventNotFound(id))?;
            (
                event.body.clone(),
                event.descriptor.clone(),
                event.participants.clone(),
            )
        };
        match slot.checkout() {
            Checkout::Ready(mut body) => {
                let status = hook(self, body.as_mut(), &descriptor, &participants);
                slot.checkin(body);
                Ok(status)
            }
            Checkout::Reentrant => {
                debug!(event_id = %id, "hook skipped on re-entry");
                Ok(BodyStatus::Running)
            }
            Checkout::Closed => Err(DomainError::EventNotFound(id)),
        }
    }

    /// Adds a player to the event. Returns false if they had already joined.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EventNotFound` if the event is not active.
    pub fn add_participant(&self, id: EventId, player: PlayerId) -> Result<bool, DomainError> {
        let mut active = self.lock();
        let event = active.get_mut(&id).ok_or(DomainError::EventNotFound(id))?;
        Ok(event.participants.insert(player))
    }

    /// Records contribution (damage) by a player, who also becomes a
    /// participant.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EventNotFound` if the event is not active, or
    /// `DomainError::Validation` for a negative or non-finite amount.
    pub fn record_contribution(
        &self,
        id: EventId,
        player: PlayerId,
        amount: f64,
    ) -> Result<(), DomainError> {
        let mut active = self.lock();
        let event = active.get_mut(&id).ok_or(DomainError::EventNotFound(id))?;
        if !event.contributions.record(player, amount) {
            warn!(event_id = %id, player = %player, amount, "contribution rejected");
            return Err(DomainError::Validation(format!(
                "contribution must be a non-negative number, got {amount}"
            )));
        }
        event.participants.insert(player);
        Ok(())
    }

    #[must_use]
    pub fn is_active(&self, id: EventId) -> bool {
        self.lock().contains_key(&id)
    }

    #[must_use]
    pub fn get(&self, id: EventId) -> Option<EventSnapshot> {
        let now = self.clock.now();
        self.lock().get(&id).map(|event| event.snapshot(now))
    }

    /// Snapshots of every active event, oldest first.
    #[must_use]
    pub fn list_active(&self) -> Vec<EventSnapshot> {
        let now = self.clock.now();
        let mut events: Vec<EventSnapshot> =
            self.lock().values().map(|event| event.snapshot(now)).collect();
        events.sort_by_key(|event| (event.started_at, event.descriptor.id));
        events
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Whole seconds before the event expires, `None` if it is not active.
    #[must_use]
    pub fn remaining_seconds(&self, id: EventId) -> Option<u32> {
        let now = self.clock.now();
        self.lock()
            .get(&id)
            .map(|event| event.descriptor.remaining_seconds(now))
    }

    /// Returns true once `now - created_at` has reached the duration.
    ///
    /// The registry never expires events on its own; bodies see this flag in
    /// their tick context and decide.
    #[must_use]
    pub fn is_expired(descriptor: &EventDescriptor, now: DateTime<Utc>) -> bool {
        descriptor.is_expired(now)
    }

    /// Aborts every timer, fails every active event without rewards, and
    /// refuses further starts. Returns how many events were torn down.
    pub fn shutdown(&self) -> usize {
        self.shut_down.store(true, Ordering::SeqCst);
        let drained: Vec<ActiveEvent> = self.lock().drain().map(|(_, event)| event).collect();
        for event in &drained {
            if let Some(timer) = &event.timer {
                timer.abort();
            }
        }

        let now = self.clock.now();
        let count = drained.len();
        for event in drained {
            event.body.close(Closing {
                success: false,
                descriptor: event.descriptor,
                participants: event.participants,
                now,
            });
        }
        info!(ended = count, "event registry shut down");
        count
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("active", &self.active_count())
            .field("tick_interval", &self.tick_interval())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use stormcraft_core::body::EventContext;
    use stormcraft_core::config::{DensityConfig, DifficultyConfig};
    use stormcraft_difficulty::{DensityCache, DifficultyEngine, DifficultySettings};
    use stormcraft_rewards::RewardSettings;
    use stormcraft_test_support::{
        BodyCall, BodyLog, ManualClock, RecordingBody, RecordingEconomy, StaticWorld, fixed_time,
        location,
    };

    fn registry(clock: Arc<ManualClock>) -> Arc<EventRegistry> {
        EventRegistry::new(
            Arc::new(CooldownLedger::new()),
            clock,
            None,
            Duration::from_millis(10),
        )
    }

    fn rewarding_registry(
        clock: Arc<ManualClock>,
        economy: Arc<RecordingEconomy>,
    ) -> Arc<EventRegistry> {
        let world = Arc::new(StaticWorld::new());
        let density = DensityCache::new(world.clone(), clock.clone(), &DensityConfig::default());
        let difficulty = Arc::new(DifficultyEngine::new(
            DifficultySettings::from_config(&DifficultyConfig::default(), 50.0).unwrap(),
            Arc::new(density),
            world,
        ));
        let rewards =
            RewardEngine::new(RewardSettings::default(), difficulty).with_economy(economy);
        EventRegistry::new(
            Arc::new(CooldownLedger::new()),
            clock,
            Some(Arc::new(rewards)),
            Duration::from_millis(10),
        )
    }

    fn descriptor(event_type: EventType) -> EventDescriptor {
        EventDescriptor::new(event_type, location(0.0, 64.0, 0.0), fixed_time(), 60)
    }

    #[test]
    fn test_start_activates_and_stamps_cooldowns() {
        // Arrange
        let clock = Arc::new(ManualClock::default());
        let registry = registry(clock);
        let log = BodyLog::new();
        let event = descriptor(EventType::StormRift);

        // Act
        let id = registry
            .start(event, Box::new(RecordingBody::new(log.clone())))
            .unwrap();

        // Assert
        assert!(registry.is_active(id));
        assert_eq!(registry.get(id).unwrap().state, EventState::Active);
        assert_eq!(log.calls(), vec![BodyCall::Start(id)]);
        assert_eq!(registry.ledger().last_spawn(EventType::StormRift), Some(fixed_time()));
        assert_eq!(registry.ledger().last_global(), Some(fixed_time()));
    }

    #[test]
    fn test_start_rejects_duplicate_id() {
        // Arrange
        let registry = registry(Arc::new(ManualClock::default()));
        let event = descriptor(EventType::StormSurge);
        registry
            .start(event.clone(), Box::new(RecordingBody::new(BodyLog::new())))
            .unwrap();

        // Act
        let result = registry.start(event, Box::new(RecordingBody::new(BodyLog::new())));

        // Assert
        match result.unwrap_err() {
            DomainError::Validation(msg) => assert!(msg.contains("already active")),
            other => panic!("expected Validation, got {other:?}"),
        }
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_end_runs_hooks_in_order_and_is_idempotent() {
        // Arrange
        let registry = registry(Arc::new(ManualClock::default()));
        let log = BodyLog::new();
        let id = registry
            .start(
                descriptor(EventType::StormSurge),
                Box::new(RecordingBody::new(log.clone())),
            )
            .unwrap();

        // Act
        let first = registry.end(id, true);
        let second = registry.end(id, true);

        // Assert
        let report = first.unwrap();
        assert_eq!(report.state, EventState::Completed);
        assert!(report.payout.is_none());
        assert!(second.is_none());
        assert!(!registry.is_active(id));
        assert_eq!(
            log.calls(),
            vec![BodyCall::Start(id), BodyCall::Complete(id), BodyCall::Cleanup(id)]
        );
    }

    #[test]
    fn test_failed_end_calls_on_fail() {
        let registry = registry(Arc::new(ManualClock::default()));
        let log = BodyLog::new();
        let id = registry
            .start(
                descriptor(EventType::StormSurge),
                Box::new(RecordingBody::new(log.clone())),
            )
            .unwrap();

        let report = registry.end(id, false).unwrap();

        assert_eq!(report.state, EventState::Failed);
        assert!(log.contains(&BodyCall::Fail(id)));
        assert!(!log.contains(&BodyCall::Complete(id)));
    }

    #[test]
    fn test_tick_of_unknown_event_is_not_found() {
        let registry = registry(Arc::new(ManualClock::default()));
        let missing = EventId::new_v4();

        match registry.tick(missing).unwrap_err() {
            DomainError::EventNotFound(id) => assert_eq!(id, missing),
            other => panic!("expected EventNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_expired_body_fails_on_tick() {
        // Arrange
        let clock = Arc::new(ManualClock::default());
        let registry = registry(clock.clone());
        let log = BodyLog::new();
        let id = registry
            .start(
                descriptor(EventType::StormSurge),
                Box::new(RecordingBody::new(log.clone())),
            )
            .unwrap();

        // Act
        let before = registry.tick(id).unwrap();
        clock.advance(ChronoDuration::seconds(60));
        let after = registry.tick(id).unwrap();

        // Assert
        assert_eq!(before, BodyStatus::Running);
        assert_eq!(after, BodyStatus::Failed);
        assert!(!registry.is_active(id));
        assert!(log.contains(&BodyCall::Fail(id)));
    }

    #[test]
    fn test_is_expired_at_exact_duration() {
        let event = descriptor(EventType::StormSurge);

        assert!(!EventRegistry::is_expired(
            &event,
            fixed_time() + ChronoDuration::seconds(59)
        ));
        assert!(EventRegistry::is_expired(
            &event,
            fixed_time() + ChronoDuration::seconds(60)
        ));
    }

    #[test]
    fn test_record_progress_completes_event() {
        let registry = registry(Arc::new(ManualClock::default()));
        let log = BodyLog::new();
        let body = RecordingBody::new(log.clone()).with_progress_status(BodyStatus::Completed);
        let id = registry
            .start(descriptor(EventType::StormSurge), Box::new(body))
            .unwrap();

        let status = registry.record_progress(id, 3).unwrap();

        assert_eq!(status, BodyStatus::Completed);
        assert!(log.contains(&BodyCall::Progress(id, 3)));
        assert!(log.contains(&BodyCall::Complete(id)));
        assert!(!registry.is_active(id));
    }

    #[test]
    fn test_contribution_adds_participant() {
        // Arrange
        let registry = registry(Arc::new(ManualClock::default()));
        let id = registry
            .start(
                descriptor(EventType::TempestGuardian),
                Box::new(RecordingBody::new(BodyLog::new())),
            )
            .unwrap();
        let player = PlayerId::new_v4();

        // Act
        registry.record_contribution(id, player, 40.0).unwrap();
        registry.record_contribution(id, player, 2.0).unwrap();
        let rejected = registry.record_contribution(id, player, -1.0);

        // Assert
        let snapshot = registry.get(id).unwrap();
        assert!(snapshot.participants.contains(&player));
        assert!((snapshot.contributions[&player] - 42.0).abs() < f64::EPSILON);
        assert!(matches!(rejected, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_successful_end_pays_participants() {
        // Arrange
        let clock = Arc::new(ManualClock::default());
        let economy = Arc::new(RecordingEconomy::new());
        let registry = rewarding_registry(clock, economy.clone());
        let id = registry
            .start(
                descriptor(EventType::StormSurge),
                Box::new(RecordingBody::new(BodyLog::new())),
            )
            .unwrap();
        let (a, b) = (PlayerId::new_v4(), PlayerId::new_v4());
        registry.add_participant(id, a).unwrap();
        registry.add_participant(id, b).unwrap();

        // Act
        let report = registry.end(id, true).unwrap();

        // Assert
        assert_eq!(report.payouts.len(), 2);
        let payout = report.payout.unwrap();
        assert_eq!(payout.paid.len(), 2);
        assert!(economy.total_for(a) > 0);
        assert_eq!(economy.total_for(a), economy.total_for(b));
    }

    #[test]
    fn test_failed_end_pays_nothing() {
        let clock = Arc::new(ManualClock::default());
        let economy = Arc::new(RecordingEconomy::new());
        let registry = rewarding_registry(clock, economy.clone());
        let id = registry
            .start(
                descriptor(EventType::StormSurge),
                Box::new(RecordingBody::new(BodyLog::new())),
            )
            .unwrap();
        registry.add_participant(id, PlayerId::new_v4()).unwrap();

        let report = registry.end(id, false).unwrap();

        assert!(report.payouts.is_empty());
        assert!(report.payout.is_none());
        assert!(economy.deposits().is_empty());
    }

    #[test]
    fn test_shutdown_fails_everything_and_refuses_new_starts() {
        // Arrange
        let registry = registry(Arc::new(ManualClock::default()));
        let log = BodyLog::new();
        let first = registry
            .start(
                descriptor(EventType::StormSurge),
                Box::new(RecordingBody::new(log.clone())),
            )
            .unwrap();
        let second = registry
            .start(
                descriptor(EventType::StormRift),
                Box::new(RecordingBody::new(log.clone())),
            )
            .unwrap();

        // Act
        let ended = registry.shutdown();
        let late = registry.start(
            descriptor(EventType::StormSurge),
            Box::new(RecordingBody::new(BodyLog::new())),
        );

        // Assert
        assert_eq!(ended, 2);
        assert_eq!(registry.active_count(), 0);
        for id in [first, second] {
            assert!(log.contains(&BodyCall::Fail(id)));
            assert!(log.contains(&BodyCall::Cleanup(id)));
            assert!(!log.contains(&BodyCall::Complete(id)));
        }
        assert!(matches!(late, Err(DomainError::ShutDown)));
    }

    #[test]
    fn test_list_active_is_oldest_first() {
        let clock = Arc::new(ManualClock::default());
        let registry = registry(clock.clone());
        let first = registry
            .start(
                descriptor(EventType::StormSurge),
                Box::new(RecordingBody::new(BodyLog::new())),
            )
            .unwrap();
        clock.advance(ChronoDuration::seconds(5));
        let second = registry
            .start(
                descriptor(EventType::StormRift),
                Box::new(RecordingBody::new(BodyLog::new())),
            )
            .unwrap();

        let ids: Vec<EventId> = registry
            .list_active()
            .into_iter()
            .map(|event| event.descriptor.id)
            .collect();

        assert_eq!(ids, vec![first, second]);
        assert_eq!(registry.remaining_seconds(first), Some(55));
    }

    /// Looks itself up and ends its own event from inside `on_tick`.
    struct SelfEndingBody {
        registry: Weak<EventRegistry>,
        inner: RecordingBody,
        observed: Arc<Mutex<Vec<bool>>>,
    }

    impl EventBody for SelfEndingBody {
        fn on_start(&mut self, ctx: &EventContext<'_>) {
            self.inner.on_start(ctx);
        }

        fn on_tick(&mut self, ctx: &EventContext<'_>) -> BodyStatus {
            self.inner.on_tick(ctx);
            let registry = self.registry.upgrade().unwrap();
            let id = ctx.descriptor.id;
            let mut observed = self.observed.lock().unwrap();
            observed.push(registry.get(id).is_some());
            observed.push(registry.end(id, true).is_some());
            BodyStatus::Running
        }

        fn on_complete(&mut self, ctx: &EventContext<'_>) {
            self.inner.on_complete(ctx);
        }

        fn on_fail(&mut self, ctx: &EventContext<'_>) {
            self.inner.on_fail(ctx);
        }

        fn cleanup(&mut self, ctx: &EventContext<'_>) {
            self.inner.cleanup(ctx);
        }
    }

    #[test]
    fn test_body_can_end_its_own_event_from_a_hook() {
        // Arrange
        let economy = Arc::new(RecordingEconomy::new());
        let registry = rewarding_registry(Arc::new(ManualClock::default()), economy.clone());
        let log = BodyLog::new();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let body = SelfEndingBody {
            registry: Arc::downgrade(&registry),
            inner: RecordingBody::new(log.clone()),
            observed: observed.clone(),
        };
        let id = registry
            .start(descriptor(EventType::StormSurge), Box::new(body))
            .unwrap();
        let player = PlayerId::new_v4();
        registry.add_participant(id, player).unwrap();

        // Act
        let (tx, rx) = std::sync::mpsc::channel();
        let worker = {
            let registry = registry.clone();
            std::thread::spawn(move || tx.send(registry.tick(id)).unwrap())
        };
        let status = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("tick did not return")
            .unwrap();
        worker.join().unwrap();

        // Assert
        assert_eq!(status, BodyStatus::Running);
        assert_eq!(*observed.lock().unwrap(), vec![true, true]);
        assert!(!registry.is_active(id));
        assert_eq!(
            log.calls(),
            vec![
                BodyCall::Start(id),
                BodyCall::Tick(id),
                BodyCall::Complete(id),
                BodyCall::Cleanup(id),
            ]
        );
        assert!(economy.total_for(player) > 0);
    }

    #[tokio::test]
    async fn test_timer_ends_event_when_body_resolves() {
        // Arrange
        let registry = registry(Arc::new(ManualClock::default()));
        let log = BodyLog::new();
        let body = RecordingBody::new(log.clone()).with_tick_status(BodyStatus::Completed);

        // Act
        let id = registry
            .start(descriptor(EventType::StormSurge), Box::new(body))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Assert
        assert!(!registry.is_active(id));
        assert!(log.contains(&BodyCall::Tick(id)));
        assert!(log.contains(&BodyCall::Complete(id)));
    }

    #[tokio::test]
    async fn test_shutdown_stops_timers() {
        // Arrange
        let registry = registry(Arc::new(ManualClock::default()));
        let log = BodyLog::new();
        let id = registry
            .start(
                descriptor(EventType::StormSurge),
                Box::new(RecordingBody::new(log.clone())),
            )
            .unwrap();

        // Act
        registry.shutdown();
        let calls_after_shutdown = log.calls().len();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Assert
        assert_eq!(log.calls().len(), calls_after_shutdown);
        assert!(log.contains(&BodyCall::Cleanup(id)));
    }
}
