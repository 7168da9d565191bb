//! Per-event body slot.
//!
//! Hooks run with the body checked out of its slot and no registry lock
//! held, so a body may call back into the registry (including `end` on its
//! own event). Closing hooks requested while the body is out are deferred
//! to the hook's return on the same thread, or wait for it on another.

use std::collections::BTreeSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use chrono::{DateTime, Utc};
use stormcraft_core::body::{EventBody, EventContext};
use stormcraft_core::event::EventDescriptor;
use stormcraft_core::geometry::PlayerId;

pub(crate) fn context<'a>(
    descriptor: &'a EventDescriptor,
    participants: &'a BTreeSet<PlayerId>,
    now: DateTime<Utc>,
) -> EventContext<'a> {
    EventContext {
        descriptor,
        now,
        expired: descriptor.is_expired(now),
        participants,
    }
}

/// The closing hooks of an ended event, with the view they run against.
pub(crate) struct Closing {
    pub(crate) success: bool,
    pub(crate) descriptor: EventDescriptor,
    pub(crate) participants: BTreeSet<PlayerId>,
    pub(crate) now: DateTime<Utc>,
}

impl Closing {
    fn run(&self, body: &mut dyn EventBody) {
        let ctx = context(&self.descriptor, &self.participants, self.now);
        if self.success {
            body.on_complete(&ctx);
        } else {
            body.on_fail(&ctx);
        }
        body.cleanup(&ctx);
    }
}

/// Result of asking for the body.
pub(crate) enum Checkout {
    Ready(Box<dyn EventBody>),
    /// This thread is already inside one of the body's hooks.
    Reentrant,
    /// The event has ended.
    Closed,
}

struct Cell {
    body: Option<Box<dyn EventBody>>,
    runner: Option<ThreadId>,
    closed: bool,
    deferred: Option<Closing>,
}

pub(crate) struct BodySlot {
    cell: Mutex<Cell>,
    returned: Condvar,
}

impl BodySlot {
    pub(crate) fn new(body: Box<dyn EventBody>) -> Self {
        Self {
            cell: Mutex::new(Cell {
                body: Some(body),
                runner: None,
                closed: false,
                deferred: None,
            }),
            returned: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cell> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, cell: MutexGuard<'a, Cell>) -> MutexGuard<'a, Cell> {
        self.returned
            .wait(cell)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the body for one hook, waiting while another thread has it.
    pub(crate) fn checkout(&self) -> Checkout {
        let me = thread::current().id();
        let mut cell = self.lock();
        loop {
            if cell.closed {
                return Checkout::Closed;
            }
            if let Some(body) = cell.body.take() {
                cell.runner = Some(me);
                return Checkout::Ready(body);
            }
            if cell.runner == Some(me) {
                return Checkout::Reentrant;
            }
            cell = self.wait(cell);
        }
    }

    /// Returns the body after a hook, running any closing deferred meanwhile.
    pub(crate) fn checkin(&self, mut body: Box<dyn EventBody>) {
        let mut cell = self.lock();
        cell.runner = None;
        if let Some(closing) = cell.deferred.take() {
            drop(cell);
            closing.run(body.as_mut());
        } else {
            cell.body = Some(body);
            drop(cell);
        }
        self.returned.notify_all();
    }

    /// Runs the closing hooks exactly once. Further checkouts see `Closed`.
    ///
    /// If another thread is inside a hook this waits for it to return; if
    /// this thread is, the closing runs when that hook returns.
    pub(crate) fn close(&self, closing: Closing) {
        let me = thread::current().id();
        let mut cell = self.lock();
        if cell.closed {
            return;
        }
        cell.closed = true;
        loop {
            if let Some(mut body) = cell.body.take() {
                drop(cell);
                closing.run(body.as_mut());
                self.returned.notify_all();
                return;
            }
            if cell.runner == Some(me) {
                cell.deferred = Some(closing);
                return;
            }
            cell = self.wait(cell);
        }
    }
}
