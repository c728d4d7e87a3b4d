//! Explicit transactions on top of ODBC manual-commit mode.
//!
//! ODBC has no begin statement: a transaction starts implicitly with the
//! first operation after auto-commit is switched off and ends with
//! `SQLEndTran`. Beginning a transaction therefore turns auto-commit off
//! (plus isolation and access mode attributes if requested); ending it
//! restores the defaults.

use crate::{connection::Connection, error::Error};

/// Transaction isolation levels the driver can request from the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// The `SQL_TXN_*` bit communicated via `SQL_ATTR_TXN_ISOLATION`.
    pub(crate) fn attribute_mask(self) -> u32 {
        match self {
            IsolationLevel::ReadUncommitted => 0x1,
            IsolationLevel::ReadCommitted => 0x2,
            IsolationLevel::RepeatableRead => 0x4,
            IsolationLevel::Serializable => 0x8,
        }
    }
}

/// Options for [`Connection::begin`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionOptions {
    /// Isolation level to request, or `None` to keep the session default.
    pub isolation: Option<IsolationLevel>,
    /// Ask the data source to treat the transaction as read only.
    pub read_only: bool,
}

/// An open transaction. Obtained from [`Connection::begin`].
///
/// Committing and rolling back consume the transaction; a transaction
/// dropped without either is rolled back.
pub struct Transaction<'c> {
    conn: &'c Connection,
    read_only: bool,
    completed: bool,
}

impl<'c> Transaction<'c> {
    pub(crate) fn new(conn: &'c Connection, read_only: bool) -> Self {
        Transaction {
            conn,
            read_only,
            completed: false,
        }
    }

    /// Make all changes of the transaction permanent.
    pub fn commit(mut self) -> Result<(), Error> {
        self.completed = true;
        self.conn.end_transaction(true, self.read_only)
    }

    /// Undo all changes of the transaction.
    pub fn rollback(mut self) -> Result<(), Error> {
        self.completed = true;
        self.conn.end_transaction(false, self.read_only)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let _ = self.conn.end_transaction(false, self.read_only);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IsolationLevel;

    #[test]
    fn isolation_levels_map_to_odbc_masks() {
        assert_eq!(0x1, IsolationLevel::ReadUncommitted.attribute_mask());
        assert_eq!(0x2, IsolationLevel::ReadCommitted.attribute_mask());
        assert_eq!(0x4, IsolationLevel::RepeatableRead.attribute_mask());
        assert_eq!(0x8, IsolationLevel::Serializable.attribute_mask());
    }
}
