use super::{
    as_handle::AsHandle,
    free_handle,
    sql_char::SqlText,
    sql_result::{ExtSqlReturn, SqlResult},
    statement::Statement,
};
use crate::stats;
use log::debug;
use odbc_sys::{
    CompletionType, ConnectionAttribute, DriverConnectOption, HDbc, HStmt, Handle, HandleType,
    Pointer, SQLAllocHandle, SQLDisconnect, SQLEndTran,
};
use std::{
    ptr::null_mut,
    sync::atomic::{AtomicBool, Ordering},
};

#[cfg(not(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows"))))]
use odbc_sys::{SQLDriverConnect as sql_driver_connect, SQLSetConnectAttr as sql_set_connect_attr};
#[cfg(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows")))]
use odbc_sys::{
    SQLDriverConnectW as sql_driver_connect, SQLSetConnectAttrW as sql_set_connect_attr,
};

const AUTOCOMMIT_OFF: u32 = 0;
const AUTOCOMMIT_ON: u32 = 1;
const MODE_READ_WRITE: u32 = 0;
const MODE_READ_ONLY: u32 = 1;

/// An allocated ODBC connection handle. References storage of all information
/// about the connection to the data source, including status, transaction
/// state and error information.
pub struct Connection {
    handle: HDbc,
    released: AtomicBool,
}

/// The driver manager synchronises access to the connection handle, and the
/// cancellation bridge relies on issuing `SQLCancel` and the final release
/// from a different thread than the one blocked in `SQLExecute`.
unsafe impl Send for Connection {}
unsafe impl Sync for Connection {}

unsafe impl AsHandle for Connection {
    fn as_handle(&self) -> Handle {
        self.handle as Handle
    }

    fn handle_type(&self) -> HandleType {
        HandleType::Dbc
    }
}

impl Connection {
    /// # Safety
    ///
    /// `handle` must be a valid (successfully allocated) ODBC connection
    /// handle.
    pub unsafe fn new(handle: HDbc) -> Self {
        Self {
            handle,
            released: AtomicBool::new(false),
        }
    }

    /// Establish a connection to a data source using an opaque connection
    /// string. No dialog is ever prompted to complete it.
    pub fn driver_connect(&self, connection_string: &SqlText) -> SqlResult<()> {
        unsafe {
            sql_driver_connect(
                self.handle,
                null_mut(),
                connection_string.ptr(),
                connection_string.len_char().try_into().unwrap(),
                null_mut(),
                0,
                null_mut(),
                DriverConnectOption::NoPrompt,
            )
        }
        .into_sql_result("SQLDriverConnect")
    }

    /// Disconnect from the data source.
    pub fn disconnect(&self) -> SqlResult<()> {
        unsafe { SQLDisconnect(self.handle) }.into_sql_result("SQLDisconnect")
    }

    /// Allocate a new statement handle on this connection.
    pub fn allocate_statement(&self) -> SqlResult<Statement> {
        let mut handle = null_mut();
        unsafe { SQLAllocHandle(HandleType::Stmt, self.as_handle(), &mut handle) }
            .into_sql_result("SQLAllocHandle")
            .on_success(|| {
                stats::record_allocation(HandleType::Stmt);
                debug!("SQLAllocHandle allocated statement (Stmt) handle '{handle:?}'");
                unsafe { Statement::new(handle as HStmt) }
            })
    }

    /// Switch the connection between auto-commit (the ODBC default) and
    /// manual-commit mode. Switching from manual to auto commits any open
    /// transaction on the connection.
    pub fn set_autocommit(&self, enabled: bool) -> SqlResult<()> {
        let value = if enabled { AUTOCOMMIT_ON } else { AUTOCOMMIT_OFF };
        self.set_uinteger_attribute(ConnectionAttribute::AutoCommit, value)
    }

    /// Set the transaction isolation level for subsequent transactions. The
    /// mask must be one of the `SQL_TXN_*` bits.
    pub fn set_transaction_isolation(&self, mask: u32) -> SqlResult<()> {
        self.set_uinteger_attribute(ConnectionAttribute::TxnIsolation, mask)
    }

    /// Declare whether the connection is used for reads only. A driver may
    /// use this as a hint to enable optimisations.
    pub fn set_access_mode(&self, read_only: bool) -> SqlResult<()> {
        let value = if read_only {
            MODE_READ_ONLY
        } else {
            MODE_READ_WRITE
        };
        self.set_uinteger_attribute(ConnectionAttribute::AccessMode, value)
    }

    /// Commit or roll back the transaction open on this connection.
    pub fn end_transaction(&self, completion: CompletionType) -> SqlResult<()> {
        unsafe { SQLEndTran(HandleType::Dbc, self.as_handle(), completion) }
            .into_sql_result("SQLEndTran")
    }

    fn set_uinteger_attribute(&self, attribute: ConnectionAttribute, value: u32) -> SqlResult<()> {
        unsafe {
            sql_set_connect_attr(
                self.handle,
                attribute,
                value as usize as Pointer,
                odbc_sys::IS_UINTEGER,
            )
        }
        .into_sql_result("SQLSetConnectAttr")
    }

    /// `true` once the handle has been freed.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Free the connection handle. Further calls are no-ops, making the
    /// release safe to attempt from both the owner and the background
    /// cancellation task.
    pub fn release(&self) -> Result<(), crate::error::Error> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        unsafe { free_handle(self.handle as Handle, HandleType::Dbc) }
    }
}
