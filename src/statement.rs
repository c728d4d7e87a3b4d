//! Prepared statements and their cursor state machine.
//!
//! A statement moves between two states: *prepared* (handle allocated,
//! parameters described, no cursor) and *has cursor* (a result set is being
//! iterated). Closing the cursor via [`crate::Rows`] returns it to
//! *prepared*. Executing while a cursor is somehow still open (a failed or
//! skipped cursor close) silently re-prepares the same query on a fresh
//! handle, because ODBC allows only one open cursor per statement.

use crate::{
    cancel::{CancelToken, ExecEvent},
    column::Column,
    connection::Connection,
    error::Error,
    handles::{self, SqlResult},
    parameter::Parameter,
    rows::Rows,
    value::Value,
};
use std::sync::{atomic::Ordering, mpsc::sync_channel, Arc};
use std::thread;

/// A prepared statement, bound to the connection which prepared it.
pub struct Statement<'c> {
    conn: &'c Connection,
    /// The original query text. Needed to re-prepare when a reused statement
    /// still has an open cursor.
    query: String,
    /// `None` after close.
    handle: Option<Arc<handles::Statement>>,
    parameters: Vec<Parameter>,
    pub(crate) columns: Vec<Column>,
    pub(crate) cursor_open: bool,
}

impl<'c> Statement<'c> {
    pub(crate) fn new(
        conn: &'c Connection,
        query: String,
        handle: Arc<handles::Statement>,
        parameters: Vec<Parameter>,
    ) -> Self {
        Statement {
            conn,
            query,
            handle: Some(handle),
            parameters,
            columns: Vec::new(),
            cursor_open: false,
        }
    }

    /// Number of parameter markers in the prepared query.
    pub fn num_input(&self) -> usize {
        self.parameters.len()
    }

    pub(crate) fn stmt_handle(&self) -> Result<&Arc<handles::Statement>, Error> {
        self.handle
            .as_ref()
            .ok_or_else(|| Error::ProtocolViolation("statement is closed".to_string()))
    }

    /// Execute the statement and report the number of affected rows, summed
    /// over all result sets the execution produced.
    pub fn exec(&mut self, args: &[Value]) -> Result<i64, Error> {
        self.exec_cancellable(args, None)
    }

    /// Like [`Statement::exec`], but aborts with [`Error::Cancelled`] when
    /// `cancel` fires while the execution blocks. Cancellation poisons the
    /// connection.
    pub fn exec_cancellable(
        &mut self,
        args: &[Value],
        cancel: Option<&CancelToken>,
    ) -> Result<i64, Error> {
        let result = self.exec_impl(args, cancel);
        result.map_err(|e| self.conn.inner.note_if_bad(e))
    }

    fn exec_impl(&mut self, args: &[Value], cancel: Option<&CancelToken>) -> Result<i64, Error> {
        self.execute(args, cancel)?;
        let stmt = self.stmt_handle()?;
        let mut affected = 0;
        loop {
            let count = stmt.row_count().into_result(stmt.as_ref())?;
            affected += count as i64;
            if !stmt.more_results().into_result_bool(stmt.as_ref())? {
                break;
            }
        }
        Ok(affected)
    }

    /// Execute the statement and iterate the rows of its (first) result set.
    pub fn query(&mut self, args: &[Value]) -> Result<Rows<'_, 'c>, Error> {
        self.query_cancellable(args, None)
    }

    /// Like [`Statement::query`], but aborts with [`Error::Cancelled`] when
    /// `cancel` fires while the execution blocks. Cancellation poisons the
    /// connection; no rows of the cancelled query are ever observed.
    pub fn query_cancellable(
        &mut self,
        args: &[Value],
        cancel: Option<&CancelToken>,
    ) -> Result<Rows<'_, 'c>, Error> {
        if let Err(e) = self.execute(args, cancel) {
            return Err(self.conn.inner.note_if_bad(e));
        }
        if let Err(e) = self.bind_columns() {
            return Err(self.conn.inner.note_if_bad(e));
        }
        self.cursor_open = true;
        Ok(Rows::new(self))
    }

    /// Free the statement handle. Closing twice is an error. A no-op when a
    /// cancellation already handed disposal to a background task.
    pub fn close(&mut self) -> Result<(), Error> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| Error::ProtocolViolation("statement is already closed".to_string()))?;
        self.columns.clear();
        if self
            .conn
            .inner
            .closing_in_background
            .load(Ordering::SeqCst)
        {
            return Ok(());
        }
        handle.release()
    }

    pub(crate) fn connection(&self) -> &Connection {
        self.conn
    }

    /// Bind all arguments and run `SQLExecute`, honouring cancellation.
    fn execute(&mut self, args: &[Value], cancel: Option<&CancelToken>) -> Result<(), Error> {
        if self.conn.is_bad() {
            return Err(Error::BadConnection);
        }
        self.stmt_handle()?;
        if self.cursor_open {
            // The previous cursor was never closed. Only one cursor may live
            // per statement, so continue on a fresh handle prepared with the
            // same query.
            if let Some(old) = self.handle.take() {
                let _ = old.release();
            }
            let (handle, parameters) = self.conn.inner.prepare_handle(&self.query)?;
            self.handle = Some(handle);
            self.parameters = parameters;
            self.columns.clear();
            self.cursor_open = false;
        }
        if args.len() != self.parameters.len() {
            return Err(Error::ProtocolViolation(format!(
                "wrong number of arguments {}, {} expected",
                args.len(),
                self.parameters.len()
            )));
        }
        let stmt = Arc::clone(self.stmt_handle()?);
        for (index, (parameter, value)) in self.parameters.iter_mut().zip(args).enumerate() {
            parameter.bind_value(&stmt, index, value, self.conn.inner.access_driver)?;
        }
        match cancel {
            None => execute_directly(&stmt),
            Some(token) => self.execute_on_worker(&stmt, token),
        }
    }

    /// Run the blocking `SQLExecute` on a worker thread and wait for either
    /// its completion or the cancellation signal, whichever comes first.
    ///
    /// On cancellation the connection is poisoned and a background task
    /// becomes the sole owner of teardown: it fires `SQLCancel`, waits for
    /// the worker to come back out of the driver and only then releases the
    /// statement and connection handles, each exactly once. The caller
    /// returns immediately; subsequent close calls on the statement or the
    /// connection are no-ops.
    fn execute_on_worker(
        &self,
        stmt: &Arc<handles::Statement>,
        token: &CancelToken,
    ) -> Result<(), Error> {
        let (sender, receiver) = sync_channel(2);
        let worker_stmt = Arc::clone(stmt);
        let worker_sender = sender.clone();
        thread::spawn(move || {
            let result = execute_directly(&worker_stmt);
            let _ = worker_sender.try_send(ExecEvent::Completed(result));
        });
        token.register(sender);
        match receiver.recv() {
            Ok(ExecEvent::Completed(result)) => result,
            Ok(ExecEvent::Cancelled) => {
                let inner = Arc::clone(&self.conn.inner);
                inner.mark_bad();
                inner.closing_in_background.store(true, Ordering::SeqCst);
                let background_stmt = Arc::clone(stmt);
                thread::spawn(move || {
                    let _ = background_stmt.cancel();
                    // The worker may still sit inside the driver. Wait for
                    // it before releasing anything, swallowing its outcome.
                    while let Ok(event) = receiver.recv() {
                        if matches!(event, ExecEvent::Completed(_)) {
                            break;
                        }
                    }
                    let _ = background_stmt.release();
                    let _ = inner.handle.disconnect();
                    let _ = inner.handle.release();
                });
                Err(Error::Cancelled)
            }
            Err(_) => Err(Error::ProtocolViolation(
                "execute worker terminated without reporting a result".to_string(),
            )),
        }
    }

    /// Describe all columns of the pending result set and bind buffers for
    /// the bindable prefix. The first non-bindable column stops binding for
    /// every column to its right; those are streamed via `SQLGetData`.
    pub(crate) fn bind_columns(&mut self) -> Result<(), Error> {
        let stmt = Arc::clone(self.stmt_handle()?);
        let count = stmt.num_result_cols().into_result(stmt.as_ref())?;
        if count < 1 {
            return Err(Error::ProtocolViolation(
                "statement did not create a result set".to_string(),
            ));
        }
        self.columns = Vec::with_capacity(count as usize);
        let mut binding = true;
        for index in 0..count as usize {
            let mut column = Column::describe(&stmt, index)?;
            if binding && !column.bind(&stmt, index)? {
                binding = false;
            }
            self.columns.push(column);
        }
        Ok(())
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !self
                .conn
                .inner
                .closing_in_background
                .load(Ordering::SeqCst)
            {
                let _ = handle.release();
            }
        }
    }
}

/// `SQLExecute` with `SQL_NO_DATA` treated as success: the statement ran
/// fine, it just affected no rows.
fn execute_directly(stmt: &handles::Statement) -> Result<(), Error> {
    match stmt.execute() {
        SqlResult::NoData => Ok(()),
        other => other.into_result(stmt),
    }
}
