//! Pending-call table for request-response correlation.
//!
//! # Architecture
//!
//! ```text
//! Call Flow:
//!   1. Allocate request id
//!   2. Insert PendingCall (oneshot::Sender) into the table
//!   3. Send request over the channel
//!   4. Spawn timeout task, attach its handle to the entry
//!   5. Caller awaits the oneshot::Receiver
//!
//! Reply Flow:
//!   6. Reply arrives, lookup by id
//!   7. Remove entry, abort its timer
//!   8. Fire the oneshot with the result or the remote error
//!
//! Timeout Flow:
//!   6. Timer elapses
//!   7. Remove entry if still present, otherwise nothing happens
//!   8. Fire the oneshot with RpcError::Timeout
//! ```
//!
//! An entry is settled by whichever path removes it from the table first.
//! Settling consumes the entry, so a second settlement cannot happen.

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::envelope::RequestId;
use crate::error::RpcError;

/// What a pending call settles with.
pub(crate) type CallOutcome = Result<Value, RpcError>;

/// State of one outstanding call.
pub(crate) struct PendingCall {
    /// Method path, kept for diagnostics.
    method: String,

    /// Delivers the outcome to the waiting caller.
    sender: oneshot::Sender<CallOutcome>,

    /// Scheduled timeout, if timeouts are enabled.
    timer: Option<JoinHandle<()>>,

    /// When the call was registered.
    start_time: Instant,
}

impl PendingCall {
    pub(crate) fn new(method: String, sender: oneshot::Sender<CallOutcome>) -> Self {
        Self {
            method,
            sender,
            timer: None,
            start_time: Instant::now(),
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Deliver the outcome, cancelling the timer.
    fn settle(mut self, outcome: CallOutcome) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if self.sender.send(outcome).is_err() {
            tracing::debug!(method = %self.method, "Caller dropped before settlement");
        }
    }
}

/// Table of outstanding calls owned by one router.
///
/// Uses `RefCell` for interior mutability (single-threaded). No borrow is
/// held while an outcome is delivered.
#[derive(Default)]
pub(crate) struct PendingCalls {
    entries: RefCell<HashMap<RequestId, PendingCall>>,
}

impl PendingCalls {
    pub(crate) fn register(&self, id: RequestId, call: PendingCall) {
        self.entries.borrow_mut().insert(id, call);
    }

    /// Attach a timer to a still pending entry.
    ///
    /// Aborts the timer when the entry was already settled.
    pub(crate) fn attach_timer(&self, id: RequestId, timer: JoinHandle<()>) {
        match self.entries.borrow_mut().get_mut(&id) {
            Some(call) => call.timer = Some(timer),
            None => timer.abort(),
        }
    }

    /// Settle the entry for `id` with a reply.
    ///
    /// Returns `false` when no entry exists (late or foreign reply).
    pub(crate) fn complete(&self, id: RequestId, outcome: CallOutcome) -> bool {
        let call = self.entries.borrow_mut().remove(&id);
        match call {
            Some(call) => {
                tracing::trace!(%id, elapsed = ?call.elapsed(), "Settling call");
                call.settle(outcome);
                true
            }
            None => false,
        }
    }

    /// Reject the entry for `id` with a timeout, if it is still pending.
    ///
    /// Called from the timer task itself, so the timer handle is dropped
    /// instead of aborted.
    pub(crate) fn expire(&self, id: RequestId) -> bool {
        let call = self.entries.borrow_mut().remove(&id);
        match call {
            Some(mut call) => {
                call.timer = None;
                tracing::debug!(%id, method = %call.method, elapsed = ?call.elapsed(), "Call timed out");
                call.settle(Err(RpcError::Timeout { id }));
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}
