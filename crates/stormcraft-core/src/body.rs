//! Event body capability: the per-kind behavior the registry drives.
//!
//! The registry owns the lifecycle; a body only reacts to hooks and reports
//! whether it has resolved.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::error::DomainError;
use crate::event::EventDescriptor;
use crate::geometry::PlayerId;

/// What a body reports after a tick or a progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyStatus {
    /// Keep running.
    Running,
    /// The objective was met; end the event successfully.
    Completed,
    /// The event failed or timed out; end it without rewards.
    Failed,
}

impl BodyStatus {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, BodyStatus::Running)
    }
}

/// Read-only view of an event handed to every hook.
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    /// The event's spawn-time descriptor.
    pub descriptor: &'a EventDescriptor,
    /// Current time from the registry's clock.
    pub now: DateTime<Utc>,
    /// Whether the event's duration has elapsed. Expiry is cooperative: the
    /// body decides what to do with it.
    pub expired: bool,
    /// Players who have joined the event so far.
    pub participants: &'a BTreeSet<PlayerId>,
}

/// Lifecycle hooks of one event instance.
pub trait EventBody: Send {
    /// Called once when the registry activates the event.
    fn on_start(&mut self, ctx: &EventContext<'_>);

    /// Called on every event tick while active.
    fn on_tick(&mut self, ctx: &EventContext<'_>) -> BodyStatus;

    /// Called when the host reports objective progress.
    fn on_progress(&mut self, _ctx: &EventContext<'_>, _amount: u32) -> BodyStatus {
        BodyStatus::Running
    }

    /// Called when the event ends successfully.
    fn on_complete(&mut self, ctx: &EventContext<'_>);

    /// Called when the event fails, expires, or is torn down.
    fn on_fail(&mut self, ctx: &EventContext<'_>);

    /// Called last, after `on_complete` or `on_fail`.
    fn cleanup(&mut self, ctx: &EventContext<'_>);
}

/// Creates the body for a freshly spawned event.
pub trait BodyFactory: Send + Sync {
    /// Builds a body for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if no body can be built for the
    /// descriptor's event type.
    fn create(&self, descriptor: &EventDescriptor) -> Result<Box<dyn EventBody>, DomainError>;
}
