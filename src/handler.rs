//! Result handlers: one FIFO entry per in-flight logical operation.
//!
//! The connection's reader forwards every non-sync result to the handler at
//! the head of the queue and pops it once it reports completion, so queue
//! position always mirrors wire order. A handler whose awaiting operation
//! goes away is never removed from the middle of the queue; it is converted
//! to a dummy that swallows the results still owed to it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tokio::sync::Notify;

use crate::result::QueryResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandlerStatus {
    Waiting,
    Completed,
    Cancelled,
}

#[derive(Debug)]
enum HandlerShape {
    /// Stores exactly one result; completes on the first `handle`.
    Single(Option<QueryResult>),
    /// Fills one slot per pushed query; completes when all arrived.
    Pipeline {
        results: Vec<QueryResult>,
        expected: usize,
    },
    /// Discards the given number of further results, then completes.
    Dummy { remaining: usize },
}

/// One entry of the result-handler FIFO.
#[derive(Debug)]
pub(crate) struct ResultHandler {
    status: Cell<HandlerStatus>,
    shape: RefCell<HandlerShape>,
    event: Notify,
}

impl ResultHandler {
    pub fn single() -> Self {
        Self::with_shape(HandlerShape::Single(None))
    }

    pub fn pipeline(expected: usize) -> Self {
        Self::with_shape(HandlerShape::Pipeline {
            results: Vec::with_capacity(expected),
            expected,
        })
    }

    fn with_shape(shape: HandlerShape) -> Self {
        Self {
            status: Cell::new(HandlerStatus::Waiting),
            shape: RefCell::new(shape),
            event: Notify::new(),
        }
    }

    pub fn status(&self) -> HandlerStatus {
        self.status.get()
    }

    /// Deliver one result. Invoked by the reader in arrival order.
    pub fn handle(&self, result: QueryResult) {
        debug_assert_eq!(self.status.get(), HandlerStatus::Waiting);
        let completed = {
            let mut shape = self.shape.borrow_mut();
            match &mut *shape {
                HandlerShape::Single(slot) => {
                    *slot = Some(result);
                    true
                }
                HandlerShape::Pipeline { results, expected } => {
                    results.push(result);
                    results.len() == *expected
                }
                HandlerShape::Dummy { remaining } => {
                    *remaining -= 1;
                    *remaining == 0
                }
            }
        };
        if completed {
            self.complete();
        }
    }

    /// Detach from the awaiting operation: count how many results are still
    /// owed and swallow them instead of storing them.
    pub fn dumify(&self) {
        let remaining = {
            let shape = self.shape.borrow();
            match &*shape {
                HandlerShape::Single(slot) => usize::from(slot.is_none()),
                HandlerShape::Pipeline { results, expected } => expected - results.len(),
                HandlerShape::Dummy { remaining } => *remaining,
            }
        };
        if remaining == 0 {
            self.complete();
        } else {
            *self.shape.borrow_mut() = HandlerShape::Dummy { remaining };
        }
    }

    /// Mark cancelled and wake the waiter. Used at connection teardown.
    pub fn cancel(&self) {
        if self.status.get() == HandlerStatus::Waiting {
            self.status.set(HandlerStatus::Cancelled);
            self.event.notify_one();
        }
    }

    fn complete(&self) {
        self.status.set(HandlerStatus::Completed);
        self.event.notify_one();
    }

    /// Wait until this handler leaves the `Waiting` state.
    pub async fn wait(&self) {
        while self.status.get() == HandlerStatus::Waiting {
            self.event.notified().await;
        }
    }

    /// Take the stored result out of a completed single-query handler.
    pub fn take_single(&self) -> Option<QueryResult> {
        match &mut *self.shape.borrow_mut() {
            HandlerShape::Single(slot) => slot.take(),
            _ => None,
        }
    }

    /// Take the stored results out of a completed pipeline handler.
    pub fn take_pipeline(&self) -> Vec<QueryResult> {
        match &mut *self.shape.borrow_mut() {
            HandlerShape::Pipeline { results, .. } => std::mem::take(results),
            _ => Vec::new(),
        }
    }
}

/// Converts a handler to dummy mode when the awaiting operation is dropped
/// before its results arrived, keeping the FIFO aligned with the wire.
pub(crate) struct DumifyGuard {
    handler: Rc<ResultHandler>,
    armed: bool,
}

impl DumifyGuard {
    pub fn new(handler: Rc<ResultHandler>) -> Self {
        Self {
            handler,
            armed: true,
        }
    }

    /// The operation observed its completion; no conversion needed.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DumifyGuard {
    fn drop(&mut self) {
        if self.armed && self.handler.status() == HandlerStatus::Waiting {
            self.handler.dumify();
        }
    }
}
