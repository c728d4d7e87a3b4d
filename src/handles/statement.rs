use super::{
    as_handle::AsHandle,
    buffer::{clamp_small_int, mut_buf_ptr},
    free_handle,
    sql_char::{SqlChar, SqlText},
    sql_result::{ExtSqlReturn, SqlResult},
};
use odbc_sys::{
    CDataType, HStmt, Handle, HandleType, Len, Nullability, ParamType, Pointer, SQLBindCol,
    SQLBindParameter, SQLCancel, SQLCloseCursor, SQLDescribeParam, SQLExecute, SQLFetch,
    SQLGetData, SQLMoreResults, SQLNumParams, SQLNumResultCols, SQLRowCount, SmallInt,
    SqlDataType, ULen, USmallInt,
};
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(not(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows"))))]
use odbc_sys::{SQLDescribeCol as sql_describe_col, SQLPrepare as sql_prepare};
#[cfg(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows")))]
use odbc_sys::{SQLDescribeColW as sql_describe_col, SQLPrepareW as sql_prepare};

/// Description of a result set column as reported by `SQLDescribeCol`. The
/// column name is written into the caller supplied buffer.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDescription {
    /// Length of the column name in characters, excluding the terminating
    /// zero. May exceed the buffer length, in which case the name has been
    /// truncated and the call should be repeated with a larger buffer.
    pub name_length: SmallInt,
    /// SQL type of the column.
    pub data_type: SqlDataType,
    /// Size of the column. For variable width types the maximum length in
    /// characters (or bytes for binary types). Zero if unknown or unbounded.
    pub size: ULen,
    /// Number of decimal digits for exact numeric types, fractional second
    /// precision for temporal types.
    pub decimal_digits: SmallInt,
}

/// Description of a parameter marker as reported by `SQLDescribeParam`.
#[derive(Debug, Clone, Copy)]
pub struct ParameterDescription {
    /// SQL type the data source expects for this parameter.
    pub data_type: SqlDataType,
    /// Column size of the parameter. Zero for "MAX" style unbounded types.
    pub size: ULen,
    /// Decimal digits of the parameter.
    pub decimal_digits: SmallInt,
}

/// An allocated ODBC statement handle.
pub struct Statement {
    handle: HStmt,
    released: AtomicBool,
}

/// The cancellation bridge calls `SQLCancel` and the final release from a
/// different thread than the one blocked inside `SQLExecute`. ODBC requires
/// drivers to support exactly this.
unsafe impl Send for Statement {}
unsafe impl Sync for Statement {}

unsafe impl AsHandle for Statement {
    fn as_handle(&self) -> Handle {
        self.handle as Handle
    }

    fn handle_type(&self) -> HandleType {
        HandleType::Stmt
    }
}

impl Statement {
    /// # Safety
    ///
    /// `handle` must be a valid (successfully allocated) ODBC statement
    /// handle.
    pub unsafe fn new(handle: HStmt) -> Self {
        Self {
            handle,
            released: AtomicBool::new(false),
        }
    }

    /// Prepare the statement for later execution.
    pub fn prepare(&self, statement_text: &SqlText) -> SqlResult<()> {
        unsafe {
            sql_prepare(
                self.handle,
                statement_text.ptr(),
                statement_text.len_char().try_into().unwrap(),
            )
        }
        .into_sql_result("SQLPrepare")
    }

    /// Execute the prepared statement using the currently bound parameter
    /// buffers. Blocks until the data source responds. [`SqlResult::NoData`]
    /// signals a successful execution which affected no rows.
    pub fn execute(&self) -> SqlResult<()> {
        unsafe { SQLExecute(self.handle) }.into_sql_result("SQLExecute")
    }

    /// Advance the cursor to the next row. [`SqlResult::NoData`] signals the
    /// end of the result set.
    pub fn fetch(&self) -> SqlResult<()> {
        unsafe { SQLFetch(self.handle) }.into_sql_result("SQLFetch")
    }

    /// Retrieve (part of) the value of the given column of the current row
    /// into `buffer`. The indicator receives the length of the data still
    /// available, `NULL_DATA` or `NO_TOTAL`.
    pub fn get_data(
        &self,
        column_number: USmallInt,
        target_type: CDataType,
        buffer: &mut [u8],
        indicator: &mut Len,
    ) -> SqlResult<()> {
        unsafe {
            SQLGetData(
                self.handle,
                column_number,
                target_type,
                mut_buf_ptr(buffer) as Pointer,
                buffer.len().try_into().unwrap(),
                indicator as *mut Len,
            )
        }
        .into_sql_result("SQLGetData")
    }

    /// Bind a column of the result set to `buffer`. Every subsequent fetch
    /// writes the column value into the buffer and its length into the
    /// indicator.
    ///
    /// # Safety
    ///
    /// `buffer` and `indicator` must stay valid and must not move until the
    /// binding is released, either by freeing this handle or by closing the
    /// cursor and rebinding.
    pub unsafe fn bind_col(
        &self,
        column_number: USmallInt,
        target_type: CDataType,
        buffer: &mut [u8],
        indicator: &mut Len,
    ) -> SqlResult<()> {
        SQLBindCol(
            self.handle,
            column_number,
            target_type,
            mut_buf_ptr(buffer) as Pointer,
            buffer.len().try_into().unwrap(),
            indicator as *mut Len,
        )
        .into_sql_result("SQLBindCol")
    }

    /// Bind an input buffer to a parameter marker.
    ///
    /// # Safety
    ///
    /// The value buffer and the indicator cell must stay valid and must not
    /// move until execution completes or the parameter is rebound.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn bind_input_parameter(
        &self,
        parameter_number: USmallInt,
        value_type: CDataType,
        parameter_type: SqlDataType,
        column_size: ULen,
        decimal_digits: SmallInt,
        value: Pointer,
        buffer_length: Len,
        indicator: *mut Len,
    ) -> SqlResult<()> {
        SQLBindParameter(
            self.handle,
            parameter_number,
            ParamType::Input,
            value_type,
            parameter_type,
            column_size,
            decimal_digits,
            value,
            buffer_length,
            indicator,
        )
        .into_sql_result("SQLBindParameter")
    }

    /// Number of columns in the bound result set. Zero if the statement did
    /// not create one.
    pub fn num_result_cols(&self) -> SqlResult<SmallInt> {
        let mut out = 0;
        unsafe { SQLNumResultCols(self.handle, &mut out) }
            .into_sql_result("SQLNumResultCols")
            .on_success(|| out)
    }

    /// Number of parameter markers in the prepared statement.
    pub fn num_params(&self) -> SqlResult<SmallInt> {
        let mut out = 0;
        unsafe { SQLNumParams(self.handle, &mut out) }
            .into_sql_result("SQLNumParams")
            .on_success(|| out)
    }

    /// Describe the column at `column_number` (one based). The name is
    /// written into `name_buffer`; compare [`ColumnDescription::name_length`]
    /// against the buffer length to detect truncation.
    pub fn describe_col(
        &self,
        column_number: USmallInt,
        name_buffer: &mut [SqlChar],
    ) -> SqlResult<ColumnDescription> {
        let mut description = ColumnDescription {
            name_length: 0,
            data_type: SqlDataType::UNKNOWN_TYPE,
            size: 0,
            decimal_digits: 0,
        };
        let mut nullability = Nullability::UNKNOWN;
        unsafe {
            sql_describe_col(
                self.handle,
                column_number,
                name_buffer.as_mut_ptr(),
                clamp_small_int(name_buffer.len()),
                &mut description.name_length,
                &mut description.data_type,
                &mut description.size,
                &mut description.decimal_digits,
                &mut nullability,
            )
        }
        .into_sql_result("SQLDescribeCol")
        .on_success(|| description)
    }

    /// Describe the parameter marker at `parameter_number` (one based). Not
    /// implemented by every driver manager; callers are expected to cope
    /// with failure.
    pub fn describe_param(&self, parameter_number: USmallInt) -> SqlResult<ParameterDescription> {
        let mut data_type = SqlDataType::UNKNOWN_TYPE;
        let mut size = 0;
        let mut decimal_digits = 0;
        let mut nullability = Nullability::UNKNOWN;
        unsafe {
            SQLDescribeParam(
                self.handle,
                parameter_number,
                &mut data_type,
                &mut size,
                &mut decimal_digits,
                &mut nullability,
            )
        }
        .into_sql_result("SQLDescribeParam")
        .on_success(|| ParameterDescription {
            data_type,
            size,
            decimal_digits,
        })
    }

    /// Number of rows affected by the last execution. May be `-1` if the
    /// driver can not tell (e.g. for statements which create a result set).
    pub fn row_count(&self) -> SqlResult<Len> {
        let mut out = 0;
        unsafe { SQLRowCount(self.handle, &mut out) }
            .into_sql_result("SQLRowCount")
            .on_success(|| out)
    }

    /// Advance to the next result set produced by the execution.
    /// [`SqlResult::NoData`] signals that all result sets are consumed.
    pub fn more_results(&self) -> SqlResult<()> {
        unsafe { SQLMoreResults(self.handle) }.into_sql_result("SQLMoreResults")
    }

    /// Close the open cursor, discarding pending rows. The statement returns
    /// to its prepared state.
    pub fn close_cursor(&self) -> SqlResult<()> {
        unsafe { SQLCloseCursor(self.handle) }.into_sql_result("SQLCloseCursor")
    }

    /// Ask the driver to cancel the function currently executing on this
    /// statement. Safe to call from another thread while `execute` blocks.
    pub fn cancel(&self) -> SqlResult<()> {
        unsafe { SQLCancel(self.handle) }.into_sql_result("SQLCancel")
    }

    /// Free the statement handle. Further calls are no-ops, making the
    /// release safe to attempt from both the owner and the background
    /// cancellation task.
    pub fn release(&self) -> Result<(), crate::error::Error> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        unsafe { free_handle(self.handle as Handle, HandleType::Stmt) }
    }
}
