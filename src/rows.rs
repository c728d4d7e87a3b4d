//! Iteration over the result sets of an executed statement.

use crate::{error::Error, statement::Statement, value::Value};
use std::sync::{atomic::Ordering, Arc};

/// A cursor over the current result set of a statement.
///
/// The rows borrow their statement for the duration of the iteration;
/// closing them (or dropping them) closes the cursor and returns the
/// statement to its prepared state without freeing the statement handle.
pub struct Rows<'s, 'c> {
    stmt: &'s mut Statement<'c>,
    closed: bool,
}

impl<'s, 'c> Rows<'s, 'c> {
    pub(crate) fn new(stmt: &'s mut Statement<'c>) -> Self {
        Rows { stmt, closed: false }
    }

    /// Names of the columns of the current result set, in order.
    pub fn columns(&self) -> Vec<&str> {
        self.stmt.columns.iter().map(|c| c.name()).collect()
    }

    /// Fetch the next row and read its values into `dest`. Returns `false`
    /// once the result set is exhausted; `dest` is untouched then.
    pub fn next(&mut self, dest: &mut [Value]) -> Result<bool, Error> {
        let result = self.next_impl(dest);
        result.map_err(|e| self.stmt.connection().inner.note_if_bad(e))
    }

    fn next_impl(&mut self, dest: &mut [Value]) -> Result<bool, Error> {
        let handle = Arc::clone(self.stmt.stmt_handle()?);
        if !handle.fetch().into_result_bool(handle.as_ref())? {
            return Ok(false);
        }
        if dest.len() > self.stmt.columns.len() {
            return Err(Error::ProtocolViolation(format!(
                "destination holds {} slots, result set has {} columns",
                dest.len(),
                self.stmt.columns.len()
            )));
        }
        for (index, slot) in dest.iter_mut().enumerate() {
            *slot = self.stmt.columns[index].value(&handle, index)?;
        }
        Ok(true)
    }

    /// Advance to the next result set of the execution, describing and
    /// binding its columns. Returns `false` when all result sets are
    /// consumed.
    pub fn next_result_set(&mut self) -> Result<bool, Error> {
        let handle = Arc::clone(self.stmt.stmt_handle()?);
        if !handle.more_results().into_result_bool(handle.as_ref())? {
            return Ok(false);
        }
        self.stmt.bind_columns()?;
        Ok(true)
    }

    /// Uppercase C type name the column at `index` is transported as, e.g.
    /// `SQL_C_SBIGINT`.
    pub fn column_type_database_name(&self, index: usize) -> &'static str {
        self.stmt
            .columns
            .get(index)
            .map(|c| c.c_type_name())
            .unwrap_or("")
    }

    /// Close the cursor. The statement stays prepared and can be executed
    /// again.
    pub fn close(mut self) -> Result<(), Error> {
        self.close_cursor()
    }

    fn close_cursor(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stmt.cursor_open = false;
        if self
            .stmt
            .connection()
            .inner
            .closing_in_background
            .load(Ordering::SeqCst)
        {
            // A background task owns the handles now.
            return Ok(());
        }
        let handle = Arc::clone(self.stmt.stmt_handle()?);
        handle.close_cursor().into_result(handle.as_ref())
    }
}

impl Drop for Rows<'_, '_> {
    fn drop(&mut self) {
        let _ = self.close_cursor();
    }
}
