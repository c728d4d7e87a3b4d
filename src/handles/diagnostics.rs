use super::{
    as_handle::AsHandle,
    buffer::{clamp_small_int, mut_buf_ptr},
    sql_char::{sql_chars_to_string, SqlChar},
};
use odbc_sys::{SqlReturn, SQLSTATE_SIZE};
use std::fmt;

#[cfg(not(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows"))))]
use odbc_sys::SQLGetDiagRec as sql_get_diag_rec;
#[cfg(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows")))]
use odbc_sys::SQLGetDiagRecW as sql_get_diag_rec;

/// Maximum length of diagnostic messages we retrieve. Longer messages are
/// truncated by the driver manager.
const MAX_MESSAGE_LENGTH: usize = 1024;

/// SQLSTATE signalling a communication link failure. The authoritative sign
/// that the connection to the data source is dead.
pub const STATE_COMMUNICATION_LINK_FAILURE: &str = "08S01";

/// SQLSTATE signalling truncated data, the expected companion of streamed
/// long data reads via `SQLGetData`.
pub const STATE_DATA_TRUNCATED: &str = "01004";

/// A single ODBC diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    /// Five character SQLSTATE code. The first two characters indicate the
    /// class, the next three the subclass.
    pub state: String,
    /// Error code specific to the data source.
    pub native_error: i32,
    /// Message text emitted by the driver or the driver manager.
    pub message: String,
}

impl DiagnosticRecord {
    /// `true` if this record reports that the wire to the data source died.
    pub fn is_communication_link_failure(&self) -> bool {
        self.state == STATE_COMMUNICATION_LINK_FAILURE
    }

    /// `true` if this record reports truncated data (state 01004).
    pub fn is_data_truncated(&self) -> bool {
        self.state == STATE_DATA_TRUNCATED
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}} {}", self.state, self.message)
    }
}

/// Retrieve all diagnostic records associated with the last call on `handle`.
///
/// Loops `SQLGetDiagRec` starting at record one until the driver manager
/// reports no more data. Records which can not be retrieved terminate the
/// loop; everything collected so far is returned.
pub fn collect_diagnostics(handle: &dyn AsHandle) -> Vec<DiagnosticRecord> {
    let mut records = Vec::new();
    let mut state = [0 as SqlChar; SQLSTATE_SIZE + 1];
    let mut message = vec![0 as SqlChar; MAX_MESSAGE_LENGTH];
    for rec_number in 1..=i16::MAX {
        let mut native_error = 0;
        let mut text_length = 0;
        let ret = unsafe {
            sql_get_diag_rec(
                handle.handle_type(),
                handle.as_handle(),
                rec_number,
                state.as_mut_ptr(),
                &mut native_error,
                mut_buf_ptr(&mut message),
                clamp_small_int(message.len()),
                &mut text_length,
            )
        };
        match ret {
            SqlReturn::SUCCESS | SqlReturn::SUCCESS_WITH_INFO => {
                let end = (text_length as usize).min(message.len());
                records.push(DiagnosticRecord {
                    state: sql_chars_to_string(&state),
                    native_error,
                    message: sql_chars_to_string(&message[..end]),
                });
            }
            _ => break,
        }
    }
    records
}
