use odbc_sys::SqlReturn;

/// Outcome of a raw ODBC function call. Variants carry the same meaning as
/// the constants associated with [`SqlReturn`]. Extracting and interpreting
/// diagnostic records remains the responsibility of the caller.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SqlResult<T> {
    /// The function executed successfully.
    Success(T),
    /// The function executed successfully, but left diagnostic records with
    /// additional information (e.g. truncation during streamed reads).
    SuccessWithInfo(T),
    /// No more data is available.
    NoData,
    /// The function failed. Check diagnostics.
    Error {
        /// Name of the ODBC API call which failed. Used to give context to
        /// diagnostics once the error reaches the user.
        function: &'static str,
    },
    /// The handle passed to the function was not valid. A bug shaped
    /// condition, no diagnostics are available.
    InvalidHandle {
        /// Name of the ODBC API call which reported the invalid handle.
        function: &'static str,
    },
}

impl SqlResult<()> {
    /// Append a return value to a successful result.
    pub fn on_success<F, T>(self, f: F) -> SqlResult<T>
    where
        F: FnOnce() -> T,
    {
        self.map(|()| f())
    }
}

impl<T> SqlResult<T> {
    /// `true` if the variant is [`SqlResult::Error`] or
    /// [`SqlResult::InvalidHandle`].
    pub fn is_err(&self) -> bool {
        matches!(
            self,
            SqlResult::Error { .. } | SqlResult::InvalidHandle { .. }
        )
    }

    /// Applies `f` to any value wrapped in `Success` or `SuccessWithInfo`.
    pub fn map<U, F>(self, f: F) -> SqlResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            SqlResult::Success(v) => SqlResult::Success(f(v)),
            SqlResult::SuccessWithInfo(v) => SqlResult::SuccessWithInfo(f(v)),
            SqlResult::NoData => SqlResult::NoData,
            SqlResult::Error { function } => SqlResult::Error { function },
            SqlResult::InvalidHandle { function } => SqlResult::InvalidHandle { function },
        }
    }
}

/// Conversion from the raw return codes into [`SqlResult`].
pub trait ExtSqlReturn {
    fn into_sql_result(self, function_name: &'static str) -> SqlResult<()>;
}

impl ExtSqlReturn for SqlReturn {
    fn into_sql_result(self, function: &'static str) -> SqlResult<()> {
        match self {
            SqlReturn::SUCCESS => SqlResult::Success(()),
            SqlReturn::SUCCESS_WITH_INFO => SqlResult::SuccessWithInfo(()),
            SqlReturn::NO_DATA => SqlResult::NoData,
            SqlReturn::ERROR => SqlResult::Error { function },
            SqlReturn::INVALID_HANDLE => SqlResult::InvalidHandle { function },
            r => panic!(
                "Unexpected return value '{:?}' for ODBC function '{}'",
                r, function
            ),
        }
    }
}
