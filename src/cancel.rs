//! Cooperative cancellation for blocking executions.
//!
//! The ODBC execute is synchronous; [`crate::Statement`] therefore runs it on
//! a worker thread and waits for whichever happens first: the worker posting
//! its completion, or a [`CancelToken`] firing. The token is the caller's
//! side of that race. Timeouts are realised by the caller cancelling the
//! token; the driver has no internal timers.

use crate::error::Error;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::SyncSender,
    Arc, Mutex,
};

/// Events observed by an execution waiting on its completion channel. The
/// worker thread posts `Completed`, cancellation posts `Cancelled`; the first
/// event to arrive wins.
#[derive(Debug, Clone)]
pub(crate) enum ExecEvent {
    Completed(Result<(), Error>),
    Cancelled,
}

/// A cancellation signal shared between the task driving a statement and any
/// task which may want to abort it.
///
/// The token is monotonic: once cancelled it stays cancelled, and every
/// waiter registered before or after the fact is woken.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    waiters: Mutex<Vec<SyncSender<ExecEvent>>>,
}

impl CancelToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once [`CancelToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Fire the signal. Idempotent; all registered waiters are woken.
    pub fn cancel(&self) {
        let mut waiters = self.inner.waiters.lock().unwrap();
        self.inner.cancelled.store(true, Ordering::SeqCst);
        for waiter in waiters.drain(..) {
            // A waiter whose execution already completed has dropped its
            // receiver. Nothing to wake there.
            let _ = waiter.try_send(ExecEvent::Cancelled);
        }
    }

    /// Register a channel to be signalled on cancellation. If the token has
    /// already fired the channel is signalled immediately.
    pub(crate) fn register(&self, waiter: SyncSender<ExecEvent>) {
        let mut waiters = self.inner.waiters.lock().unwrap();
        if self.inner.cancelled.load(Ordering::SeqCst) {
            let _ = waiter.try_send(ExecEvent::Cancelled);
        } else {
            waiters.push(waiter);
        }
    }
}
