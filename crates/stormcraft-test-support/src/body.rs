//! Test event bodies: a `RecordingBody` that logs every hook it receives.

use std::sync::{Arc, Mutex};

use stormcraft_core::body::{BodyFactory, BodyStatus, EventBody, EventContext};
use stormcraft_core::error::DomainError;
use stormcraft_core::event::{EventDescriptor, EventId};

/// One hook invocation observed by a [`RecordingBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyCall {
    Start(EventId),
    Tick(EventId),
    Progress(EventId, u32),
    Complete(EventId),
    Fail(EventId),
    Cleanup(EventId),
}

/// Shared call log. Clone it before moving the body into a registry.
#[derive(Debug, Clone, Default)]
pub struct BodyLog(Arc<Mutex<Vec<BodyCall>>>);

impl BodyLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all calls, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<BodyCall> {
        self.0.lock().unwrap().clone()
    }

    /// Returns true if `call` was recorded.
    #[must_use]
    pub fn contains(&self, call: &BodyCall) -> bool {
        self.calls().contains(call)
    }

    fn push(&self, call: BodyCall) {
        self.0.lock().unwrap().push(call);
    }
}

/// An event body that records its hooks and reports a configurable status.
///
/// Once the context reports the event as expired, `on_tick` returns
/// `Failed` regardless of the configured status.
#[derive(Debug)]
pub struct RecordingBody {
    log: BodyLog,
    tick_status: BodyStatus,
    progress_status: BodyStatus,
}

impl RecordingBody {
    /// Create a body that keeps running until it expires.
    #[must_use]
    pub fn new(log: BodyLog) -> Self {
        Self {
            log,
            tick_status: BodyStatus::Running,
            progress_status: BodyStatus::Running,
        }
    }

    /// Status returned from every non-expired tick.
    #[must_use]
    pub fn with_tick_status(mut self, status: BodyStatus) -> Self {
        self.tick_status = status;
        self
    }

    /// Status returned from every progress update.
    #[must_use]
    pub fn with_progress_status(mut self, status: BodyStatus) -> Self {
        self.progress_status = status;
        self
    }
}

impl EventBody for RecordingBody {
    fn on_start(&mut self, ctx: &EventContext<'_>) {
        self.log.push(BodyCall::Start(ctx.descriptor.id));
    }

    fn on_tick(&mut self, ctx: &EventContext<'_>) -> BodyStatus {
        self.log.push(BodyCall::Tick(ctx.descriptor.id));
        if ctx.expired {
            BodyStatus::Failed
        } else {
            self.tick_status
        }
    }

    fn on_progress(&mut self, ctx: &EventContext<'_>, amount: u32) -> BodyStatus {
        self.log.push(BodyCall::Progress(ctx.descriptor.id, amount));
        self.progress_status
    }

    fn on_complete(&mut self, ctx: &EventContext<'_>) {
        self.log.push(BodyCall::Complete(ctx.descriptor.id));
    }

    fn on_fail(&mut self, ctx: &EventContext<'_>) {
        self.log.push(BodyCall::Fail(ctx.descriptor.id));
    }

    fn cleanup(&mut self, ctx: &EventContext<'_>) {
        self.log.push(BodyCall::Cleanup(ctx.descriptor.id));
    }
}

/// A factory producing [`RecordingBody`] instances that share one log.
#[derive(Debug, Default)]
pub struct RecordingBodyFactory {
    log: BodyLog,
    created: Mutex<Vec<EventDescriptor>>,
    failing: bool,
}

impl RecordingBodyFactory {
    /// Create a factory writing into `log`.
    #[must_use]
    pub fn new(log: BodyLog) -> Self {
        Self {
            log,
            created: Mutex::new(Vec::new()),
            failing: false,
        }
    }

    /// A factory that refuses to build any body.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Descriptors a body was created for, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn created(&self) -> Vec<EventDescriptor> {
        self.created.lock().unwrap().clone()
    }
}

impl BodyFactory for RecordingBodyFactory {
    fn create(&self, descriptor: &EventDescriptor) -> Result<Box<dyn EventBody>, DomainError> {
        if self.failing {
            return Err(DomainError::Validation(format!(
                "no body for {}",
                descriptor.event_type
            )));
        }
        self.created.lock().unwrap().push(descriptor.clone());
        Ok(Box::new(RecordingBody::new(self.log.clone())))
    }
}
