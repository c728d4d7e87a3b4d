use crate::handles::{collect_diagnostics, log_diagnostics, AsHandle, DiagnosticRecord, SqlResult};
use thiserror::Error as ThisError;

/// Error type of this crate.
///
/// Retrying is never attempted here; it is the business of the pool in the
/// host SQL layer, which relies on [`Error::BadConnection`] to learn which
/// connections to discard.
#[derive(Debug, Clone, ThisError)]
pub enum Error {
    /// The wire to the data source is dead. Emitted for SQLSTATE 08S01, for
    /// any failure while beginning or ending a transaction and after a
    /// cancelled execution. A pooling host must discard the connection.
    #[error("bad connection")]
    BadConnection,
    /// A low level ODBC call failed and left one or more diagnostic records.
    #[error("{}", render_diagnostics(function, records))]
    Diagnostics {
        /// ODBC API call which produced the records.
        function: &'static str,
        /// All records associated with the failing call, in order.
        records: Vec<DiagnosticRecord>,
    },
    /// An ODBC call failed, yet neither the driver nor the driver manager
    /// left a diagnostic record explaining why.
    #[error(
        "the ODBC function call to {function} returned an error, but no diagnostic record is \
         available"
    )]
    NoDiagnostics {
        /// ODBC API call which failed silently.
        function: &'static str,
    },
    /// An ODBC call reported `SQL_INVALID_HANDLE`. This always hints at a
    /// bug in handle lifetime management.
    #[error("{function} returned SQL_INVALID_HANDLE")]
    InvalidHandle {
        /// ODBC API call which rejected the handle.
        function: &'static str,
    },
    /// A value or column type the driver does not know how to transport.
    #[error("{0}")]
    Unsupported(String),
    /// The driver and the application disagree about the state of the
    /// conversation, e.g. a query which did not create a result set, or a
    /// truncated read which can not make progress.
    #[error("{0}")]
    ProtocolViolation(String),
    /// The caller supplied cancellation signal fired and the statement was
    /// cancelled.
    #[error("query execution was cancelled")]
    Cancelled,
}

fn render_diagnostics(function: &str, records: &[DiagnosticRecord]) -> String {
    let rendered: Vec<String> = records.iter().map(|r| r.to_string()).collect();
    format!("{}: {}", function, rendered.join("\n"))
}

/// Build an error from the diagnostics currently associated with `handle`.
///
/// Any record carrying SQLSTATE 08S01 (communication link failure) collapses
/// the whole outcome into [`Error::BadConnection`], the sentinel the host
/// pool keys eviction on.
pub(crate) fn new_error(function: &'static str, handle: &dyn AsHandle) -> Error {
    let records = collect_diagnostics(handle);
    if records.is_empty() {
        return Error::NoDiagnostics { function };
    }
    if records.iter().any(|r| r.is_communication_link_failure()) {
        return Error::BadConnection;
    }
    Error::Diagnostics { function, records }
}

impl<T> SqlResult<T> {
    /// Map `Success` and `SuccessWithInfo` to `Ok`, logging any diagnostics
    /// attached to the latter. `NoData` is considered a bug of the caller,
    /// which should have used [`SqlResult::into_result_bool`] instead.
    pub fn into_result(self, handle: &dyn AsHandle) -> Result<T, Error> {
        match self {
            SqlResult::Success(value) => Ok(value),
            SqlResult::SuccessWithInfo(value) => {
                log_diagnostics(handle);
                Ok(value)
            }
            SqlResult::NoData => panic!("unexpected SQL_NO_DATA returned by ODBC function"),
            SqlResult::Error { function } => Err(new_error(function, handle)),
            SqlResult::InvalidHandle { function } => Err(Error::InvalidHandle { function }),
        }
    }
}

impl SqlResult<()> {
    /// Like [`SqlResult::into_result`], but `NoData` is a valid outcome and
    /// maps to `Ok(false)`; every other success maps to `Ok(true)`.
    pub fn into_result_bool(self, handle: &dyn AsHandle) -> Result<bool, Error> {
        match self {
            SqlResult::NoData => Ok(false),
            other => other.on_success(|| true).into_result(handle),
        }
    }
}

/// Map an `SqlResult` produced without any allocated handle (e.g. while
/// setting process wide environment attributes) into a `Result`. With no
/// handle there is nothing to query diagnostics from.
pub(crate) fn into_result_without_handle<T>(result: SqlResult<T>) -> Result<T, Error> {
    match result {
        SqlResult::Success(value) | SqlResult::SuccessWithInfo(value) => Ok(value),
        SqlResult::NoData => panic!("unexpected SQL_NO_DATA returned by ODBC function"),
        SqlResult::Error { function } => Err(Error::NoDiagnostics { function }),
        SqlResult::InvalidHandle { function } => Err(Error::InvalidHandle { function }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_render_as_api_name_and_joined_records() {
        let error = Error::Diagnostics {
            function: "SQLExecute",
            records: vec![
                DiagnosticRecord {
                    state: "42000".to_string(),
                    native_error: 102,
                    message: "Incorrect syntax near 'slect'.".to_string(),
                },
                DiagnosticRecord {
                    state: "42000".to_string(),
                    native_error: 8180,
                    message: "Statement(s) could not be prepared.".to_string(),
                },
            ],
        };
        assert_eq!(
            error.to_string(),
            "SQLExecute: {42000} Incorrect syntax near 'slect'.\n\
             {42000} Statement(s) could not be prepared."
        );
    }

    #[test]
    fn communication_link_failure_is_recognised() {
        let record = DiagnosticRecord {
            state: "08S01".to_string(),
            native_error: 0,
            message: "TCP Provider: An existing connection was forcibly closed.".to_string(),
        };
        assert!(record.is_communication_link_failure());
    }
}
