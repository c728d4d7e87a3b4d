//! Thin abstractions over valid (i.e. successfully allocated) ODBC handles.
//!
//! Calls in this module stay as close to the raw ODBC API as possible and
//! report their outcome as [`SqlResult`]. Interpreting diagnostics and turning
//! them into crate level errors happens one layer up, in [`crate::error`].

mod as_handle;
mod buffer;
mod connection;
mod diagnostics;
mod environment;
mod logging;
mod sql_char;
mod sql_result;
mod statement;

pub use {
    as_handle::AsHandle,
    connection::Connection,
    diagnostics::{collect_diagnostics, DiagnosticRecord},
    environment::Environment,
    logging::log_diagnostics,
    sql_char::{sql_chars_to_string, utf16_to_string, SqlChar, SqlText},
    sql_result::{ExtSqlReturn, SqlResult},
    statement::{ColumnDescription, ParameterDescription, Statement},
};

use crate::{error::Error, stats};
use odbc_sys::{Handle, HandleType, SQLFreeHandle, SqlReturn};

/// Free `handle` with `SQLFreeHandle` and keep the process wide handle
/// counters in sync.
///
/// # Safety
///
/// `handle` must be a valid ODBC handle of type `handle_type` which has not
/// been freed before.
unsafe fn free_handle(handle: Handle, handle_type: HandleType) -> Result<(), Error> {
    match SQLFreeHandle(handle_type, handle) {
        SqlReturn::SUCCESS => {
            stats::record_release(handle_type);
            Ok(())
        }
        SqlReturn::INVALID_HANDLE => Err(Error::InvalidHandle {
            function: "SQLFreeHandle",
        }),
        _ => Err(Error::NoDiagnostics {
            function: "SQLFreeHandle",
        }),
    }
}
