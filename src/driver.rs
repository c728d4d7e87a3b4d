//! The process wide driver state: one lazily initialised ODBC environment.
//!
//! The environment must be allocated exactly once and before any connection.
//! Connection pooling is enabled in the driver manager prior to allocation,
//! as the attribute only affects environments created afterwards. A failure
//! during initialisation is remembered and surfaced from every subsequent
//! [`crate::Connection::open`] call.

use crate::{
    error::{into_result_without_handle, Error},
    handles,
};
use lazy_static::lazy_static;
use odbc_sys::{AttrConnectionPooling, AttrCpMatch, AttrOdbcVersion};

lazy_static! {
    static ref DRIVER: Result<Driver, Error> = Driver::initialize();
}

pub(crate) struct Driver {
    environment: handles::Environment,
}

impl Driver {
    fn initialize() -> Result<Self, Error> {
        // Safety: pooled connections are handed out one per environment and
        // the driver manager serialises access to them.
        let pooling = unsafe {
            handles::Environment::set_connection_pooling(AttrConnectionPooling::OnePerHenv)
        };
        into_result_without_handle(pooling)?;

        let environment = into_result_without_handle(handles::Environment::new())?;
        environment
            .declare_odbc_version(AttrOdbcVersion::Odbc3)
            .into_result(&environment)?;
        environment
            .set_connection_pooling_matching(AttrCpMatch::Relaxed)
            .into_result(&environment)?;
        Ok(Driver { environment })
    }

    pub(crate) fn environment(&self) -> &handles::Environment {
        &self.environment
    }
}

/// Access the process wide driver, initialising it on first use. A remembered
/// initialisation failure is returned from every call.
pub(crate) fn driver() -> Result<&'static Driver, Error> {
    DRIVER.as_ref().map_err(Error::clone)
}
