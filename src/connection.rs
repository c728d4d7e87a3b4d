//! Connections to a data source and their health flags.

use crate::{
    driver::driver,
    error::Error,
    handles::{self, SqlText},
    parameter::{extract_parameters, Parameter},
    statement::Statement,
    transaction::{Transaction, TransactionOptions},
};
use lazy_static::lazy_static;
use log::debug;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

lazy_static! {
    /// Serialises `SQLDriverConnect`. Some driver managers race two
    /// concurrent connection attempts with different connection strings.
    static ref OPEN_LOCK: Mutex<()> = Mutex::new(());
}

/// Shared state of one connection. Kept behind an `Arc` because after a
/// cancellation a background task outlives the [`Connection`] value and owns
/// the final disposal of the handles.
pub(crate) struct ConnectionInner {
    pub(crate) handle: handles::Connection,
    /// Set when any call reveals that the wire is dead. Once set, every
    /// operation fails with [`Error::BadConnection`] so a pooling host
    /// evicts the connection.
    pub(crate) bad: AtomicBool,
    /// Set when a cancellation handed disposal of the handles to a
    /// background task; close calls then become no-ops.
    pub(crate) closing_in_background: AtomicBool,
    /// Guards against nested transactions.
    in_transaction: AtomicBool,
    /// The Microsoft Access driver needs long text SQL types for string
    /// parameters.
    pub(crate) access_driver: bool,
}

impl ConnectionInner {
    /// Allocate a statement handle, prepare `query` on it and describe its
    /// parameter markers. The handle is released again if any step fails.
    pub(crate) fn prepare_handle(
        &self,
        query: &str,
    ) -> Result<(Arc<handles::Statement>, Vec<Parameter>), Error> {
        let stmt = self.handle.allocate_statement().into_result(&self.handle)?;
        let text = SqlText::new(query);
        if let Err(error) = stmt.prepare(&text).into_result(&stmt) {
            let _ = stmt.release();
            return Err(error);
        }
        match extract_parameters(&stmt) {
            Ok(parameters) => Ok((Arc::new(stmt), parameters)),
            Err(error) => {
                let _ = stmt.release();
                Err(error)
            }
        }
    }

    pub(crate) fn mark_bad(&self) {
        self.bad.store(true, Ordering::SeqCst);
    }

    /// Poison the connection when an operation surfaced the bad-connection
    /// sentinel, so every later operation refuses early.
    pub(crate) fn note_if_bad(&self, error: Error) -> Error {
        if matches!(error, Error::BadConnection) {
            self.mark_bad();
        }
        error
    }
}

/// A connection to a data source, created from an opaque ODBC connection
/// string.
pub struct Connection {
    pub(crate) inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Allocate a connection handle and connect to the data source described
    /// by `connection_string`. The string is passed to the driver manager
    /// verbatim, no dialog is prompted to complete it.
    pub fn open(connection_string: &str) -> Result<Connection, Error> {
        let driver = driver()?;
        let _serialised = OPEN_LOCK.lock().unwrap();
        let handle = driver
            .environment()
            .allocate_connection()
            .into_result(driver.environment())?;
        let text = SqlText::new(connection_string);
        if let Err(error) = handle.driver_connect(&text).into_result(&handle) {
            let _ = handle.release();
            return Err(error);
        }
        debug!("connected to data source");
        let access_driver = connection_string
            .to_uppercase()
            .contains("MICROSOFT ACCESS DRIVER");
        Ok(Connection {
            inner: Arc::new(ConnectionInner {
                handle,
                bad: AtomicBool::new(false),
                closing_in_background: AtomicBool::new(false),
                in_transaction: AtomicBool::new(false),
                access_driver,
            }),
        })
    }

    /// `true` once the connection observed a fatal failure. A pooling host
    /// should discard it and open a fresh one.
    pub fn is_bad(&self) -> bool {
        self.inner.bad.load(Ordering::SeqCst)
    }

    fn check_usable(&self) -> Result<(), Error> {
        if self.is_bad() {
            Err(Error::BadConnection)
        } else {
            Ok(())
        }
    }

    /// Prepare `query` for execution. The statement borrows this connection.
    pub fn prepare(&self, query: &str) -> Result<Statement<'_>, Error> {
        self.check_usable()?;
        let (handle, parameters) = self
            .inner
            .prepare_handle(query)
            .map_err(|e| self.inner.note_if_bad(e))?;
        Ok(Statement::new(self, query.to_string(), handle, parameters))
    }

    /// Check that the data source still answers. Any failure reports
    /// [`Error::BadConnection`].
    pub fn ping(&self) -> Result<(), Error> {
        self.check_usable()?;
        let outcome = (|| {
            let mut stmt = self.prepare(";")?;
            stmt.exec(&[])?;
            stmt.close()
        })();
        outcome.map_err(|_| Error::BadConnection)
    }

    /// Hook for pooling hosts which hand out connections for new sessions.
    /// Reports [`Error::BadConnection`] for poisoned connections so the pool
    /// discards them instead of reusing.
    pub fn reset_session(&self) -> Result<(), Error> {
        self.check_usable()
    }

    /// Begin a transaction by switching the connection to manual-commit
    /// mode. Refused while another transaction is open.
    pub fn begin(&self, options: TransactionOptions) -> Result<Transaction<'_>, Error> {
        self.check_usable()?;
        if self.inner.in_transaction.swap(true, Ordering::SeqCst) {
            return Err(Error::ProtocolViolation(
                "already in a transaction".to_string(),
            ));
        }
        let attributes: Result<(), Error> = (|| {
            self.inner
                .handle
                .set_autocommit(false)
                .into_result(&self.inner.handle)?;
            if let Some(isolation) = options.isolation {
                self.inner
                    .handle
                    .set_transaction_isolation(isolation.attribute_mask())
                    .into_result(&self.inner.handle)?;
            }
            if options.read_only {
                self.inner
                    .handle
                    .set_access_mode(true)
                    .into_result(&self.inner.handle)?;
            }
            Ok(())
        })();
        if let Err(error) = attributes {
            // Driver state is unknown now; poison the connection.
            debug!("failed to begin transaction: {error}");
            self.inner.in_transaction.store(false, Ordering::SeqCst);
            self.inner.mark_bad();
            return Err(Error::BadConnection);
        }
        Ok(Transaction::new(self, options.read_only))
    }

    /// Finish the open transaction and restore auto-commit (and access mode,
    /// if a read only transaction changed it). Called via
    /// [`Transaction::commit`] and [`Transaction::rollback`].
    pub(crate) fn end_transaction(&self, commit: bool, read_only: bool) -> Result<(), Error> {
        self.inner.in_transaction.store(false, Ordering::SeqCst);
        let completion = if commit {
            odbc_sys::CompletionType::Commit
        } else {
            odbc_sys::CompletionType::Rollback
        };
        let outcome: Result<(), Error> = (|| {
            self.inner
                .handle
                .end_transaction(completion)
                .into_result(&self.inner.handle)?;
            self.inner
                .handle
                .set_autocommit(true)
                .into_result(&self.inner.handle)?;
            if read_only {
                self.inner
                    .handle
                    .set_access_mode(false)
                    .into_result(&self.inner.handle)?;
            }
            Ok(())
        })();
        outcome.map_err(|error| {
            // An interrupted end-transaction leaves the session state
            // unpredictable. Poison the connection so the pool rebuilds it.
            debug!("failed to end transaction: {error}");
            self.inner.mark_bad();
            Error::BadConnection
        })
    }

    /// Disconnect from the data source and free the connection handle. A
    /// no-op when a cancellation already handed disposal to a background
    /// task.
    pub fn close(self) -> Result<(), Error> {
        if self.inner.closing_in_background.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.inner.in_transaction.swap(false, Ordering::SeqCst) {
            // A leaked transaction guard. Best effort rollback before the
            // disconnect, the connection is going away either way.
            let _ = self
                .inner
                .handle
                .end_transaction(odbc_sys::CompletionType::Rollback);
            let _ = self.inner.handle.set_autocommit(true);
        }
        self.inner.handle.disconnect().into_result(&self.inner.handle)?;
        self.inner.handle.release()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.inner.closing_in_background.load(Ordering::SeqCst) {
            return;
        }
        if !self.inner.handle.is_released() {
            let _ = self.inner.handle.disconnect();
            let _ = self.inner.handle.release();
        }
    }
}
