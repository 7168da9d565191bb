//! Objective bodies: a generic event body that completes once enough
//! progress has been reported and fails when its time runs out.

use std::sync::{Arc, PoisonError, RwLock};

use stormcraft_core::body::{BodyFactory, BodyStatus, EventBody, EventContext};
use stormcraft_core::config::{EventsConfig, ObjectiveKind};
use stormcraft_core::error::DomainError;
use stormcraft_core::event::EventDescriptor;
use tracing::debug;

/// Progress toward a collect, defeat, or survive target.
///
/// For `Survive` each progress unit is one wave held off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectiveBody {
    kind: ObjectiveKind,
    target: u32,
    progress: u32,
}

impl ObjectiveBody {
    /// Creates a body with no progress.
    #[must_use]
    pub fn new(kind: ObjectiveKind, target: u32) -> Self {
        Self {
            kind,
            target,
            progress: 0,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ObjectiveKind {
        self.kind
    }

    #[must_use]
    pub fn target(&self) -> u32 {
        self.target
    }

    #[must_use]
    pub fn progress(&self) -> u32 {
        self.progress
    }

    /// Returns true once progress has reached the target.
    #[must_use]
    pub fn is_met(&self) -> bool {
        self.progress >= self.target
    }
}

impl EventBody for ObjectiveBody {
    fn on_start(&mut self, ctx: &EventContext<'_>) {
        debug!(
            event_id = %ctx.descriptor.id,
            kind = ?self.kind,
            target = self.target,
            "objective started"
        );
    }

    fn on_tick(&mut self, ctx: &EventContext<'_>) -> BodyStatus {
        if self.is_met() {
            BodyStatus::Completed
        } else if ctx.expired {
            BodyStatus::Failed
        } else {
            BodyStatus::Running
        }
    }

    fn on_progress(&mut self, ctx: &EventContext<'_>, amount: u32) -> BodyStatus {
        if ctx.expired && !self.is_met() {
            return BodyStatus::Failed;
        }
        self.progress = self.progress.saturating_add(amount);
        if self.is_met() {
            BodyStatus::Completed
        } else {
            BodyStatus::Running
        }
    }

    fn on_complete(&mut self, ctx: &EventContext<'_>) {
        debug!(event_id = %ctx.descriptor.id, progress = self.progress, "objective met");
    }

    fn on_fail(&mut self, ctx: &EventContext<'_>) {
        debug!(
            event_id = %ctx.descriptor.id,
            progress = self.progress,
            target = self.target,
            "objective failed"
        );
    }

    fn cleanup(&mut self, _ctx: &EventContext<'_>) {}
}

/// Builds [`ObjectiveBody`] instances from the per-type objective settings.
#[derive(Debug)]
pub struct ObjectiveBodyFactory {
    events: RwLock<Arc<EventsConfig>>,
}

impl ObjectiveBodyFactory {
    #[must_use]
    pub fn new(events: EventsConfig) -> Self {
        Self {
            events: RwLock::new(Arc::new(events)),
        }
    }

    /// Swaps in new per-type settings. Bodies already running keep theirs.
    pub fn reload(&self, events: EventsConfig) {
        *self.events.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(events);
    }
}

impl BodyFactory for ObjectiveBodyFactory {
    fn create(&self, descriptor: &EventDescriptor) -> Result<Box<dyn EventBody>, DomainError> {
        let objective = self
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .type_config(descriptor.event_type)
            .objective;
        if objective.target == 0 {
            return Err(DomainError::Validation(format!(
                "{} objective target must be greater than zero",
                descriptor.event_type
            )));
        }
        Ok(Box::new(ObjectiveBody::new(objective.kind, objective.target)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use stormcraft_core::config::{EventTypeConfig, ObjectiveConfig};
    use stormcraft_core::event::EventType;
    use stormcraft_test_support::{fixed_time, location};

    fn descriptor(event_type: EventType) -> EventDescriptor {
        EventDescriptor::new(event_type, location(0.0, 64.0, 0.0), fixed_time(), 60)
    }

    fn context<'a>(
        descriptor: &'a EventDescriptor,
        participants: &'a BTreeSet<stormcraft_core::geometry::PlayerId>,
        expired: bool,
    ) -> EventContext<'a> {
        EventContext {
            descriptor,
            now: fixed_time(),
            expired,
            participants,
        }
    }

    #[test]
    fn test_progress_completes_at_target() {
        // Arrange
        let event = descriptor(EventType::StormSurge);
        let participants = BTreeSet::new();
        let ctx = context(&event, &participants, false);
        let mut body = ObjectiveBody::new(ObjectiveKind::Collect, 10);

        // Act
        let first = body.on_progress(&ctx, 6);
        let second = body.on_progress(&ctx, 4);

        // Assert
        assert_eq!(first, BodyStatus::Running);
        assert_eq!(second, BodyStatus::Completed);
        assert_eq!(body.progress(), 10);
    }

    #[test]
    fn test_tick_fails_once_expired() {
        let event = descriptor(EventType::StormRift);
        let participants = BTreeSet::new();
        let mut body = ObjectiveBody::new(ObjectiveKind::Survive, 3);

        assert_eq!(body.on_tick(&context(&event, &participants, false)), BodyStatus::Running);
        assert_eq!(body.on_tick(&context(&event, &participants, true)), BodyStatus::Failed);
    }

    #[test]
    fn test_progress_after_expiry_fails() {
        let event = descriptor(EventType::StormSurge);
        let participants = BTreeSet::new();
        let mut body = ObjectiveBody::new(ObjectiveKind::Collect, 10);

        let status = body.on_progress(&context(&event, &participants, true), 10);

        assert_eq!(status, BodyStatus::Failed);
        assert_eq!(body.progress(), 0);
    }

    #[test]
    fn test_factory_uses_type_objective() {
        // Arrange
        let factory = ObjectiveBodyFactory::new(EventsConfig::default());
        let event = descriptor(EventType::TempestGuardian);
        let participants = BTreeSet::new();
        let ctx = context(&event, &participants, false);

        // Act
        let mut body = factory.create(&event).unwrap();

        // Assert
        assert_eq!(body.on_progress(&ctx, 1), BodyStatus::Completed);
    }

    #[test]
    fn test_factory_rejects_zero_target() {
        // Arrange
        let mut events = EventsConfig::default();
        events.types.insert(
            EventType::StormSurge,
            EventTypeConfig {
                objective: ObjectiveConfig {
                    kind: ObjectiveKind::Collect,
                    target: 0,
                },
                ..EventTypeConfig::default()
            },
        );
        let factory = ObjectiveBodyFactory::new(events);

        // Act
        let result = factory.create(&descriptor(EventType::StormSurge));

        // Assert
        match result {
            Err(DomainError::Validation(msg)) => assert!(msg.contains("storm_surge")),
            Err(other) => panic!("expected Validation, got {other:?}"),
            Ok(_) => panic!("expected Validation, got a body"),
        }
    }

    #[test]
    fn test_factory_reload_applies_to_new_bodies() {
        let factory = ObjectiveBodyFactory::new(EventsConfig::default());
        let mut events = EventsConfig::default();
        events.types.insert(
            EventType::TempestGuardian,
            EventTypeConfig {
                objective: ObjectiveConfig {
                    kind: ObjectiveKind::Defeat,
                    target: 3,
                },
                ..EventTypeConfig::default()
            },
        );
        factory.reload(events);
        let event = descriptor(EventType::TempestGuardian);
        let participants = BTreeSet::new();
        let ctx = context(&event, &participants, false);

        let mut body = factory.create(&event).unwrap();

        assert_eq!(body.on_progress(&ctx, 2), BodyStatus::Running);
        assert_eq!(body.on_progress(&ctx, 1), BodyStatus::Completed);
    }
}
