//! Process wide handle counters.
//!
//! Every allocation and release of an environment, connection or statement
//! handle is recorded here. Tests and leak detection compare snapshots taken
//! before and after a scenario; a balanced sequence of operations must leave
//! the counters unchanged.

use odbc_sys::HandleType;
use std::sync::atomic::{AtomicIsize, Ordering};

static ENVIRONMENT_COUNT: AtomicIsize = AtomicIsize::new(0);
static CONNECTION_COUNT: AtomicIsize = AtomicIsize::new(0);
static STATEMENT_COUNT: AtomicIsize = AtomicIsize::new(0);

/// A point in time copy of the handle counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleStats {
    /// Number of live environment handles. At most one after driver init.
    pub environments: isize,
    /// Number of live connection handles.
    pub connections: isize,
    /// Number of live statement handles.
    pub statements: isize,
}

/// Returns the current handle counts.
pub fn handle_stats() -> HandleStats {
    HandleStats {
        environments: ENVIRONMENT_COUNT.load(Ordering::SeqCst),
        connections: CONNECTION_COUNT.load(Ordering::SeqCst),
        statements: STATEMENT_COUNT.load(Ordering::SeqCst),
    }
}

pub(crate) fn record_allocation(handle_type: HandleType) {
    counter(handle_type).fetch_add(1, Ordering::SeqCst);
}

pub(crate) fn record_release(handle_type: HandleType) {
    counter(handle_type).fetch_sub(1, Ordering::SeqCst);
}

fn counter(handle_type: HandleType) -> &'static AtomicIsize {
    match handle_type {
        HandleType::Env => &ENVIRONMENT_COUNT,
        HandleType::Dbc => &CONNECTION_COUNT,
        HandleType::Stmt => &STATEMENT_COUNT,
        other => panic!("no counter for handle type {:?}", other),
    }
}
