//! Integration tests against a live data source.
//!
//! The connection string is taken from the `ODBC_DRIVER_CONNECTION_STRING`
//! environment variable, e.g.
//!
//! ```text
//! ODBC_DRIVER_CONNECTION_STRING="Driver={ODBC Driver 17 for SQL Server};\
//!     Server=localhost;UID=SA;PWD=<YourStrong@Passw0rd>;"
//! ```
//!
//! Without it every test in this file passes vacuously, so the suite stays
//! green on machines without a database.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use odbc_driver::{handle_stats, CancelToken, Connection, TransactionOptions, Value};
use std::{
    env,
    sync::{Arc, Barrier, Mutex},
    thread,
    time::{Duration, Instant},
};

lazy_static! {
    static ref CONNECTION_STRING: Option<String> = {
        let _ = env_logger::builder().is_test(true).try_init();
        env::var("ODBC_DRIVER_CONNECTION_STRING").ok()
    };
    /// Tests asserting on the process wide handle counters must not overlap.
    static ref HANDLE_COUNT_LOCK: Mutex<()> = Mutex::new(());
}

macro_rules! require_connection {
    () => {
        match CONNECTION_STRING.as_deref() {
            Some(connection_string) => Connection::open(connection_string).unwrap(),
            None => return,
        }
    };
}

/// Drop and recreate a test table with the given column declarations named
/// a, b, c, ...
fn setup_empty_table(conn: &Connection, table_name: &str, column_types: &[&str]) {
    let drop = format!("DROP TABLE IF EXISTS {};", table_name);
    let names = ["a", "b", "c", "d", "e"];
    let cols = column_types
        .iter()
        .zip(&names)
        .map(|(ty, name)| format!("{} {}", name, ty))
        .collect::<Vec<_>>()
        .join(", ");
    let create = format!("CREATE TABLE {} (id int IDENTITY(1,1), {});", table_name, cols);
    for sql in [drop, create] {
        let mut stmt = conn.prepare(&sql).unwrap();
        stmt.exec(&[]).unwrap();
        stmt.close().unwrap();
    }
}

/// Run a query without parameters and collect the first column of every row.
fn select_first_column(conn: &Connection, sql: &str) -> Vec<Value> {
    let mut stmt = conn.prepare(sql).unwrap();
    let mut out = Vec::new();
    {
        let mut rows = stmt.query(&[]).unwrap();
        let width = rows.columns().len();
        let mut row = vec![Value::Null; width];
        while rows.next(&mut row).unwrap() {
            out.push(row[0].clone());
        }
        rows.close().unwrap();
    }
    stmt.close().unwrap();
    out
}

#[test]
fn select_int_comes_back_as_int32() {
    let conn = require_connection!();
    let values = select_first_column(&conn, "SELECT CAST(123 AS int);");
    assert_eq!(vec![Value::Int32(123)], values);
    conn.close().unwrap();
}

#[test]
fn select_bigint_max_comes_back_as_int64() {
    let conn = require_connection!();
    let values =
        select_first_column(&conn, "SELECT CAST(9223372036854775807 AS bigint);");
    assert_eq!(vec![Value::Int64(i64::MAX)], values);
    conn.close().unwrap();
}

#[test]
fn select_varchar_max_streams_long_data() {
    let conn = require_connection!();

    let values = select_first_column(&conn, "SELECT CAST('abc' AS varchar(max));");
    assert_eq!(vec![Value::Bytes(b"abc".to_vec())], values);

    // 1030 bytes exceed the 1024 byte scratch buffer and exercise the
    // streamed read with its truncation rounds.
    let long = "x".repeat(1030);
    let sql = format!("SELECT CAST('{}' AS varchar(max));", long);
    match &select_first_column(&conn, &sql)[..] {
        [Value::Bytes(bytes)] => assert_eq!(long.as_bytes(), &bytes[..]),
        other => panic!("expected one byte string, got {:?}", other),
    }
    conn.close().unwrap();
}

#[test]
fn select_datetime_comes_back_as_timestamp() {
    let conn = require_connection!();
    let values = select_first_column(&conn, "SELECT CAST('20151225' AS datetime);");
    let expected = NaiveDate::from_ymd_opt(2015, 12, 25)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert_eq!(vec![Value::Timestamp(expected)], values);
    conn.close().unwrap();
}

#[test]
fn decimal_round_trips_through_insert_and_select() {
    let conn = require_connection!();
    setup_empty_table(&conn, "OdbcDriverDecimals", &["decimal(5,2)"]);

    let mut insert = conn
        .prepare("INSERT INTO OdbcDriverDecimals (a) VALUES (?);")
        .unwrap();
    assert_eq!(1, insert.exec(&[Value::Double(15.5)]).unwrap());
    insert.close().unwrap();
    drop(insert);

    let values = select_first_column(&conn, "SELECT a FROM OdbcDriverDecimals;");
    assert_eq!(vec![Value::Double(15.5)], values);
    conn.close().unwrap();
}

#[test]
fn null_and_text_and_bytes_round_trip() {
    let conn = require_connection!();
    setup_empty_table(
        &conn,
        "OdbcDriverValues",
        &["nvarchar(50)", "varbinary(50)", "bit"],
    );

    let mut insert = conn
        .prepare("INSERT INTO OdbcDriverValues (a, b, c) VALUES (?, ?, ?);")
        .unwrap();
    insert
        .exec(&[
            Value::Text("grüße".to_string()),
            Value::Bytes(vec![1, 2, 3]),
            Value::Bool(true),
        ])
        .unwrap();
    insert.exec(&[Value::Null, Value::Null, Value::Null]).unwrap();
    insert.close().unwrap();
    drop(insert);

    let mut stmt = conn
        .prepare("SELECT a, b, c FROM OdbcDriverValues ORDER BY id;")
        .unwrap();
    {
        let mut rows = stmt.query(&[]).unwrap();
        assert_eq!(vec!["a", "b", "c"], rows.columns());
        let mut row = vec![Value::Null; 3];

        assert!(rows.next(&mut row).unwrap());
        assert_eq!(Value::Text("grüße".to_string()), row[0]);
        assert_eq!(Value::Bytes(vec![1, 2, 3]), row[1]);
        assert_eq!(Value::Bool(true), row[2]);

        assert!(rows.next(&mut row).unwrap());
        assert!(row.iter().all(Value::is_null));

        assert!(!rows.next(&mut row).unwrap());
        rows.close().unwrap();
    }
    stmt.close().unwrap();
    drop(stmt);
    conn.close().unwrap();
}

#[test]
fn column_type_names_are_c_type_constants() {
    let conn = require_connection!();
    let mut stmt = conn
        .prepare("SELECT CAST(1 AS bigint), CAST(N'x' AS nvarchar(10));")
        .unwrap();
    {
        let mut rows = stmt.query(&[]).unwrap();
        assert_eq!("SQL_C_SBIGINT", rows.column_type_database_name(0));
        assert_eq!("SQL_C_WCHAR", rows.column_type_database_name(1));
        rows.close().unwrap();
    }
    stmt.close().unwrap();
    drop(stmt);
    conn.close().unwrap();
}

#[test]
fn ping_succeeds_on_healthy_connection() {
    let conn = require_connection!();
    conn.ping().unwrap();
    conn.close().unwrap();
}

#[test]
fn transaction_commit_and_rollback() {
    let conn = require_connection!();
    setup_empty_table(&conn, "OdbcDriverTx", &["int"]);

    let tx = conn.begin(TransactionOptions::default()).unwrap();
    let mut insert = conn.prepare("INSERT INTO OdbcDriverTx (a) VALUES (?);").unwrap();
    insert.exec(&[Value::Int32(1)]).unwrap();
    insert.close().unwrap();
    drop(insert);
    tx.commit().unwrap();

    let tx = conn.begin(TransactionOptions::default()).unwrap();
    let mut insert = conn.prepare("INSERT INTO OdbcDriverTx (a) VALUES (?);").unwrap();
    insert.exec(&[Value::Int32(2)]).unwrap();
    insert.close().unwrap();
    drop(insert);
    tx.rollback().unwrap();

    let values = select_first_column(&conn, "SELECT a FROM OdbcDriverTx ORDER BY id;");
    assert_eq!(vec![Value::Int32(1)], values);
    conn.close().unwrap();
}

#[test]
fn nested_transactions_are_refused() {
    let conn = require_connection!();
    let tx = conn.begin(TransactionOptions::default()).unwrap();
    assert!(conn.begin(TransactionOptions::default()).is_err());
    tx.rollback().unwrap();
    conn.close().unwrap();
}

/// A full open → prepare → execute → close → close sequence leaves the
/// handle counters exactly where they started.
#[test]
fn handle_counts_return_to_baseline() {
    let _serialised = HANDLE_COUNT_LOCK.lock().unwrap();
    let conn = require_connection!();
    setup_empty_table(&conn, "OdbcDriverCounts", &["int"]);
    conn.close().unwrap();

    let before = handle_stats();
    let conn = require_connection!();
    let mut stmt = conn
        .prepare("INSERT INTO OdbcDriverCounts (a) VALUES (?);")
        .unwrap();
    stmt.exec(&[Value::Int32(7)]).unwrap();
    stmt.close().unwrap();
    drop(stmt);
    conn.close().unwrap();
    assert_eq!(before, handle_stats());
}

/// Two tasks, one insert statement each, synchronised on a barrier, a
/// hundred inserts per task. Afterwards the handle counters are back at
/// their starting value.
#[test]
fn concurrent_inserts_leak_no_handles() {
    let _serialised = HANDLE_COUNT_LOCK.lock().unwrap();
    let conn = require_connection!();
    setup_empty_table(&conn, "OdbcDriverConcurrent", &["int"]);
    conn.close().unwrap();

    let connection_string = match CONNECTION_STRING.as_deref() {
        Some(s) => s.to_string(),
        None => return,
    };
    let before = handle_stats();
    let barrier = Arc::new(Barrier::new(2));
    let workers: Vec<_> = (0..2)
        .map(|task| {
            let barrier = Arc::clone(&barrier);
            let connection_string = connection_string.clone();
            thread::spawn(move || {
                let conn = Connection::open(&connection_string).unwrap();
                let mut stmt = conn
                    .prepare("INSERT INTO OdbcDriverConcurrent (a) VALUES (?);")
                    .unwrap();
                barrier.wait();
                for i in 0..100 {
                    stmt.exec(&[Value::Int32(task * 100 + i)]).unwrap();
                }
                stmt.close().unwrap();
                drop(stmt);
                conn.close().unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(before, handle_stats());

    let conn = require_connection!();
    let values = select_first_column(&conn, "SELECT COUNT(*) FROM OdbcDriverConcurrent;");
    assert_eq!(vec![Value::Int32(200)], values);
    conn.close().unwrap();
}

/// Cancelling a long running query returns promptly with a cancellation
/// error, and the background teardown settles the handle counters.
#[test]
fn cancellation_aborts_a_blocking_execute() {
    let _serialised = HANDLE_COUNT_LOCK.lock().unwrap();
    let conn = require_connection!();
    let before = handle_stats();
    let mut stmt = conn.prepare("WAITFOR DELAY '00:00:10';").unwrap();

    let token = CancelToken::new();
    let trigger = token.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        trigger.cancel();
    });

    let started = Instant::now();
    let result = stmt.exec_cancellable(&[], Some(&token));
    assert!(matches!(result, Err(odbc_driver::Error::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(conn.is_bad());

    // Close calls are no-ops now; the background task owns disposal.
    stmt.close().unwrap();
    drop(stmt);
    conn.close().unwrap();

    // Give the background task a moment to drain the worker and release the
    // statement and connection handles.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let now = handle_stats();
        if now.connections == before.connections - 1 && now.statements == before.statements {
            break;
        }
        assert!(Instant::now() < deadline, "handles did not settle: {:?}", now);
        thread::sleep(Duration::from_millis(50));
    }
}

/// Leaking the rows (instead of closing them) leaves the cursor open; the
/// next execution must recover by re-preparing on a fresh handle.
#[test]
fn execute_with_open_cursor_re_prepares() {
    let conn = require_connection!();
    setup_empty_table(&conn, "OdbcDriverReuse", &["int"]);
    {
        let mut stmt = conn.prepare("INSERT INTO OdbcDriverReuse (a) VALUES (?);").unwrap();
        stmt.exec(&[Value::Int32(1)]).unwrap();
        stmt.close().unwrap();
    }

    let mut stmt = conn.prepare("SELECT a FROM OdbcDriverReuse;").unwrap();
    {
        let mut rows = stmt.query(&[]).unwrap();
        let mut row = vec![Value::Null];
        assert!(rows.next(&mut row).unwrap());
        // Keep the cursor open on purpose.
        std::mem::forget(rows);
    }
    // The statement silently continues on a fresh handle.
    let mut rows = stmt.query(&[]).unwrap();
    let mut row = vec![Value::Null];
    assert!(rows.next(&mut row).unwrap());
    assert_eq!(Value::Int32(1), row[0]);
    rows.close().unwrap();
    stmt.close().unwrap();
    drop(stmt);
    conn.close().unwrap();
}

#[test]
fn closing_a_statement_twice_is_an_error() {
    let conn = require_connection!();
    let mut stmt = conn.prepare("SELECT 1;").unwrap();
    stmt.close().unwrap();
    assert!(stmt.close().is_err());
    drop(stmt);
    conn.close().unwrap();
}

#[test]
fn wrong_argument_count_is_rejected() {
    let conn = require_connection!();
    let mut stmt = conn.prepare("SELECT ?;").unwrap();
    assert!(stmt.exec(&[]).is_err());
    stmt.close().unwrap();
    drop(stmt);
    conn.close().unwrap();
}
