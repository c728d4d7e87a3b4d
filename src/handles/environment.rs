use super::{
    as_handle::AsHandle,
    connection::Connection,
    free_handle,
    sql_result::{ExtSqlReturn, SqlResult},
};
use crate::stats;
use log::debug;
use odbc_sys::{
    AttrConnectionPooling, AttrCpMatch, AttrOdbcVersion, EnvironmentAttribute, HEnv, Handle,
    HandleType, SQLAllocHandle, SQLSetEnvAttr,
};
use std::{ptr::null_mut, sync::atomic::{AtomicBool, Ordering}};

/// An allocated ODBC environment handle. The global context in which
/// connections to data sources are created.
pub struct Environment {
    /// Invariant: always points to a valid ODBC environment.
    handle: HEnv,
    released: AtomicBool,
}

/// See: <https://docs.microsoft.com/en-us/sql/odbc/reference/develop-app/multithreading>
unsafe impl Send for Environment {}
unsafe impl Sync for Environment {}

unsafe impl AsHandle for Environment {
    fn as_handle(&self) -> Handle {
        self.handle as Handle
    }

    fn handle_type(&self) -> HandleType {
        HandleType::Env
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

impl Environment {
    /// Enable connection pooling in the driver manager. Must be called before
    /// the environment the pooled connections live on is allocated.
    ///
    /// # Safety
    ///
    /// Pooling requires the loaded ODBC drivers to be fully thread safe, with
    /// connections free of thread affinity.
    pub unsafe fn set_connection_pooling(scheme: AttrConnectionPooling) -> SqlResult<()> {
        SQLSetEnvAttr(
            null_mut(),
            EnvironmentAttribute::ConnectionPooling,
            scheme.into(),
            odbc_sys::IS_INTEGER,
        )
        .into_sql_result("SQLSetEnvAttr")
    }

    /// Allocate a new ODBC environment handle.
    pub fn new() -> SqlResult<Self> {
        let mut handle = null_mut();
        let result = unsafe { SQLAllocHandle(HandleType::Env, null_mut(), &mut handle) }
            .into_sql_result("SQLAllocHandle");
        result.on_success(|| {
            stats::record_allocation(HandleType::Env);
            Environment {
                handle: handle as HEnv,
                released: AtomicBool::new(false),
            }
        })
    }

    /// Declare which version of the ODBC API the application speaks. The
    /// first thing to be done with any fresh environment.
    pub fn declare_odbc_version(&self, version: AttrOdbcVersion) -> SqlResult<()> {
        unsafe {
            SQLSetEnvAttr(
                self.handle,
                EnvironmentAttribute::OdbcVersion,
                version.into(),
                0,
            )
        }
        .into_sql_result("SQLSetEnvAttr")
    }

    /// Determine how the driver manager matches pooled connections against
    /// connection requests.
    pub fn set_connection_pooling_matching(&self, matching: AttrCpMatch) -> SqlResult<()> {
        unsafe {
            SQLSetEnvAttr(
                self.handle,
                EnvironmentAttribute::CpMatch,
                matching.into(),
                odbc_sys::IS_INTEGER,
            )
        }
        .into_sql_result("SQLSetEnvAttr")
    }

    /// Allocate a new connection handle. The returned `Connection` must not
    /// outlive this environment.
    pub fn allocate_connection(&self) -> SqlResult<Connection> {
        let mut handle = null_mut();
        unsafe { SQLAllocHandle(HandleType::Dbc, self.as_handle(), &mut handle) }
            .into_sql_result("SQLAllocHandle")
            .on_success(|| {
                stats::record_allocation(HandleType::Dbc);
                debug!("SQLAllocHandle allocated connection (Dbc) handle '{handle:?}'");
                unsafe { Connection::new(handle as odbc_sys::HDbc) }
            })
    }

    /// Free the environment handle. Further calls are no-ops.
    pub fn release(&self) -> Result<(), crate::error::Error> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        unsafe { free_handle(self.handle as Handle, HandleType::Env) }
    }
}
