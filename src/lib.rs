//! # About
//!
//! `odbc-driver` exposes a generic, row oriented SQL client API while
//! delegating all wire level work to an installed ODBC driver manager. It is
//! the adapter between a host SQL layer (connection pool, prepared
//! statements, row iteration, transactions) and the ODBC C ABI: it orders
//! the ODBC calls correctly, tracks cursor ownership across
//! prepare/execute/fetch/close, translates typed values across the mixed
//! bound/unbound column model, bridges blocking executions with cooperative
//! cancellation and signals dead connections so an upstream pool can evict
//! and rebuild them.
//!
//! ```no_run
//! use odbc_driver::{Connection, Value};
//!
//! let conn = Connection::open(
//!     "Driver={ODBC Driver 17 for SQL Server};Server=localhost;UID=SA;PWD=<YourStrong@Passw0rd>;",
//! )?;
//! let mut stmt = conn.prepare("SELECT name FROM users WHERE id = ?")?;
//! let mut rows = stmt.query(&[Value::Int64(42)])?;
//! let mut row = vec![Value::Null; rows.columns().len()];
//! while rows.next(&mut row)? {
//!     println!("{:?}", row[0]);
//! }
//! # Ok::<(), odbc_driver::Error>(())
//! ```

mod cancel;
mod column;
mod connection;
mod driver;
mod error;
mod parameter;
mod rows;
mod statement;
mod stats;
mod transaction;
mod value;

pub mod handles;

pub use self::{
    cancel::CancelToken,
    connection::Connection,
    error::Error,
    handles::DiagnosticRecord,
    rows::Rows,
    statement::Statement,
    stats::{handle_stats, HandleStats},
    transaction::{IsolationLevel, Transaction, TransactionOptions},
    value::Value,
};

// Reexport `odbc-sys` so applications can match the version of this crate.
pub use odbc_sys as sys;
