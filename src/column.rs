//! The result set column model.
//!
//! After execution every column is described and classified as either
//! *bindable* or *non-bindable*. Bindable columns have a known, reasonably
//! small width; a buffer and a length indicator are bound once via
//! `SQLBindCol` and filled by every fetch. Non-bindable columns (unbounded
//! character, binary or XML data) are read on demand with a `SQLGetData`
//! loop. ODBC driver managers commonly restrict `SQLGetData` to columns to
//! the right of the last bound one, so the first non-bindable column also
//! stops binding for every column after it.

use crate::{
    error::Error,
    handles::{self, collect_diagnostics, utf16_to_string, SqlChar, SqlResult},
    value::Value,
};
use chrono::NaiveDate;
use odbc_sys::{CDataType, Len, SqlDataType, NO_TOTAL, NULL_DATA};
use std::{mem::size_of, ptr};

/// Widest column (in characters for text, bytes for binary) we are willing
/// to bind a fixed buffer for. Reported sizes of zero or above this bound
/// mean the column is read via `SQLGetData` instead.
const MAX_BINDABLE_WIDTH: usize = 1024;

/// Scratch buffer size for each `SQLGetData` round while streaming long
/// columns.
const LONG_DATA_CHUNK: usize = 1024;

/// Initial capacity of the column name buffer, in characters. Grown once if
/// the driver reports a longer name.
const COLUMN_NAME_CAPACITY: usize = 150;

/// SQL Server specific time type with fractional seconds. Not part of the
/// ODBC standard, transported as a binary struct.
const SS_TIME2: SqlDataType = SqlDataType(-154);

/// SQL Server XML columns. Unbounded, always streamed.
const SS_XML: SqlDataType = SqlDataType(-152);

/// `SQL_SS_TIME2_STRUCT`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct SsTime2 {
    hour: u16,
    minute: u16,
    second: u16,
    fraction: u32,
}

/// `SQLGUID`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct SqlGuid {
    d1: u32,
    d2: u16,
    d3: u16,
    d4: [u8; 8],
}

/// Interpretation of a length-or-indicator cell after a fetch or get-data
/// call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Indicator {
    /// The value is NULL.
    Null,
    /// The driver does not know how much data is left.
    NoTotal,
    /// Length of the value in bytes.
    Length(usize),
}

impl Indicator {
    /// Interpret a raw indicator value.
    pub(crate) fn from_len(len: Len) -> Self {
        if len == NULL_DATA {
            return Indicator::Null;
        }
        // 32 bit drivers behind a 64 bit driver manager may only write the
        // low word of the 8 byte cell, leaving `-1` zero extended instead of
        // sign extended.
        #[cfg(target_pointer_width = "64")]
        if len as u64 == u32::MAX as u64 {
            return Indicator::Null;
        }
        if len == NO_TOTAL {
            return Indicator::NoTotal;
        }
        Indicator::Length(len.try_into().unwrap())
    }

    /// `true` if the cell marks the value as NULL.
    pub(crate) fn is_null(len: Len) -> bool {
        matches!(Indicator::from_len(len), Indicator::Null)
    }
}

/// How the value of a column reaches the application.
enum ColumnKind {
    /// A pre-allocated buffer filled directly by each fetch (or by a single
    /// get-data call if the column ended up unbound because a non-bindable
    /// column precedes it).
    Bindable {
        buffer: Vec<u8>,
        indicator: Box<Len>,
        /// Expected width for fixed size types; for variable width columns
        /// the upper bound of the data length.
        size: usize,
        variable_width: bool,
        bound: bool,
    },
    /// Unbounded data, streamed with a `SQLGetData` loop on every row.
    NonBindable,
}

/// A described column of the current result set.
pub(crate) struct Column {
    name: String,
    sql_type: SqlDataType,
    c_type: CDataType,
    kind: ColumnKind,
}

impl Column {
    /// Describe the column at `index` (zero based) and choose its transport
    /// strategy.
    pub(crate) fn describe(stmt: &handles::Statement, index: usize) -> Result<Column, Error> {
        let column_number = (index + 1) as u16;
        let mut name_buffer = vec![0 as SqlChar; COLUMN_NAME_CAPACITY];
        let description = match stmt.describe_col(column_number, &mut name_buffer) {
            SqlResult::SuccessWithInfo(d) if d.name_length as usize > name_buffer.len() => {
                // The first buffer was too short for the column name; retry
                // once with the reported length.
                name_buffer = vec![0 as SqlChar; d.name_length as usize];
                stmt.describe_col(column_number, &mut name_buffer)
                    .into_result(stmt)?
            }
            other => other.into_result(stmt)?,
        };
        if description.name_length as usize > name_buffer.len() {
            return Err(Error::ProtocolViolation(format!(
                "driver keeps reporting a column name of {} characters as truncated",
                description.name_length
            )));
        }
        let name = handles::sql_chars_to_string(&name_buffer[..description.name_length as usize]);

        let sql_type = description.data_type;
        let column = match sql_type {
            SqlDataType::EXT_BIT => Self::fixed(name, sql_type, CDataType::Bit, 1),
            SqlDataType::EXT_TINY_INT | SqlDataType::SMALLINT | SqlDataType::INTEGER => {
                Self::fixed(name, sql_type, CDataType::SLong, 4)
            }
            SqlDataType::EXT_BIG_INT => Self::fixed(name, sql_type, CDataType::SBigInt, 8),
            SqlDataType::NUMERIC
            | SqlDataType::DECIMAL
            | SqlDataType::FLOAT
            | SqlDataType::REAL
            | SqlDataType::DOUBLE => Self::fixed(name, sql_type, CDataType::Double, 8),
            SqlDataType::TIMESTAMP => Self::fixed(
                name,
                sql_type,
                CDataType::TypeTimestamp,
                size_of::<odbc_sys::Timestamp>(),
            ),
            SqlDataType::DATE => Self::fixed(
                name,
                sql_type,
                CDataType::TypeDate,
                size_of::<odbc_sys::Date>(),
            ),
            SqlDataType::TIME => Self::fixed(
                name,
                sql_type,
                CDataType::TypeTime,
                size_of::<odbc_sys::Time>(),
            ),
            SS_TIME2 => Self::fixed(name, sql_type, CDataType::Binary, size_of::<SsTime2>()),
            SqlDataType::EXT_GUID => {
                Self::fixed(name, sql_type, CDataType::Guid, size_of::<SqlGuid>())
            }
            SqlDataType::CHAR | SqlDataType::VARCHAR => {
                Self::variable(name, sql_type, CDataType::Char, description.size)?
            }
            SqlDataType::EXT_W_CHAR | SqlDataType::EXT_W_VARCHAR => {
                Self::variable(name, sql_type, CDataType::WChar, description.size)?
            }
            SqlDataType::EXT_BINARY | SqlDataType::EXT_VAR_BINARY => {
                Self::variable(name, sql_type, CDataType::Binary, description.size)?
            }
            SqlDataType::EXT_LONG_VARCHAR => Self::variable(name, sql_type, CDataType::Char, 0)?,
            SqlDataType::EXT_W_LONG_VARCHAR => {
                Self::variable(name, sql_type, CDataType::WChar, 0)?
            }
            SS_XML => Self::variable(name, sql_type, CDataType::WChar, 0)?,
            SqlDataType::EXT_LONG_VAR_BINARY => {
                Self::variable(name, sql_type, CDataType::Binary, 0)?
            }
            other => {
                return Err(Error::Unsupported(format!(
                    "unsupported column type {}",
                    other.0
                )))
            }
        };
        Ok(column)
    }

    /// A fixed width column, always bindable.
    fn fixed(name: String, sql_type: SqlDataType, c_type: CDataType, size: usize) -> Column {
        // A small floor keeps the buffer usable as a get-data target even
        // for the shortest types.
        let len = size.max(8);
        Column {
            name,
            sql_type,
            c_type,
            kind: ColumnKind::Bindable {
                buffer: vec![0; len],
                indicator: Box::new(0),
                size,
                variable_width: false,
                bound: false,
            },
        }
    }

    /// A variable width column. Bindable if the driver reports a usable
    /// upper bound, streamed otherwise.
    fn variable(
        name: String,
        sql_type: SqlDataType,
        c_type: CDataType,
        width: usize,
    ) -> Result<Column, Error> {
        if width == 0 || width > MAX_BINDABLE_WIDTH {
            return Ok(Column {
                name,
                sql_type,
                c_type,
                kind: ColumnKind::NonBindable,
            });
        }
        let byte_len = match c_type {
            // Wide characters take two bytes each, plus a terminating zero.
            CDataType::WChar => (width + 1) * 2,
            CDataType::Char => width + 1,
            CDataType::Binary => width,
            other => {
                return Err(Error::Unsupported(format!(
                    "do not know how wide a column of C type {:?} is",
                    other
                )))
            }
        };
        let mut column = Self::fixed(name, sql_type, c_type, byte_len);
        if let ColumnKind::Bindable { variable_width, .. } = &mut column.kind {
            *variable_width = true;
        }
        Ok(column)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Uppercase name of the C type this column is transported as, e.g.
    /// `SQL_C_WCHAR`.
    pub(crate) fn c_type_name(&self) -> &'static str {
        c_type_name(self.c_type)
    }

    /// Bind the column buffer to the statement so fetches fill it directly.
    /// Returns `false` for columns that can not be bound.
    pub(crate) fn bind(&mut self, stmt: &handles::Statement, index: usize) -> Result<bool, Error> {
        match &mut self.kind {
            ColumnKind::NonBindable => Ok(false),
            ColumnKind::Bindable {
                buffer,
                indicator,
                bound,
                ..
            } => {
                // Safety: buffer and indicator live in this column, which the
                // statement keeps alive until the handle is released or the
                // statement is re-prepared on a fresh handle.
                unsafe {
                    stmt.bind_col((index + 1) as u16, self.c_type, buffer, indicator.as_mut())
                }
                .into_result(stmt)?;
                *bound = true;
                Ok(true)
            }
        }
    }

    /// Read the value of this column for the current row.
    pub(crate) fn value(&mut self, stmt: &handles::Statement, index: usize) -> Result<Value, Error> {
        match &mut self.kind {
            ColumnKind::Bindable {
                buffer,
                indicator,
                size,
                variable_width,
                bound,
            } => {
                if !*bound {
                    stmt.get_data((index + 1) as u16, self.c_type, buffer, indicator.as_mut())
                        .into_result(stmt)?;
                }
                let len = **indicator;
                if Indicator::is_null(len) {
                    return Ok(Value::Null);
                }
                let len: usize = len.try_into().map_err(|_| {
                    Error::ProtocolViolation(format!(
                        "negative length {} returned for column #{}",
                        **indicator, index
                    ))
                })?;
                if !*variable_width && len != *size {
                    return Err(Error::ProtocolViolation(format!(
                        "wrong column #{} length {} returned, {} expected",
                        index, len, size
                    )));
                }
                let len = len.min(buffer.len());
                decode_value(self.c_type, self.sql_type, &buffer[..len])
            }
            ColumnKind::NonBindable => {
                let column_number = (index + 1) as u16;
                let payload = drain_long_data(self.c_type, |chunk, indicator| {
                    match stmt.get_data(column_number, self.c_type, chunk, indicator) {
                        SqlResult::Success(()) => Ok(LongChunk::Final),
                        SqlResult::SuccessWithInfo(()) => {
                            let records = collect_diagnostics(stmt);
                            match records.first() {
                                // Data truncated: the expected state while
                                // streaming, another round is required.
                                Some(r) if r.is_data_truncated() => Ok(LongChunk::Truncated),
                                None => Ok(LongChunk::Truncated),
                                Some(_) => {
                                    if records.iter().any(|r| r.is_communication_link_failure()) {
                                        Err(Error::BadConnection)
                                    } else {
                                        Err(Error::Diagnostics {
                                            function: "SQLGetData",
                                            records,
                                        })
                                    }
                                }
                            }
                        }
                        other => other.into_result(stmt).map(|()| LongChunk::Final),
                    }
                })?;
                match payload {
                    None => Ok(Value::Null),
                    Some(bytes) => decode_value(self.c_type, self.sql_type, &bytes),
                }
            }
        }
    }
}

/// Outcome of one `SQLGetData` round while draining a long column.
enum LongChunk {
    /// The buffer holds the (remainder of the) value completely.
    Final,
    /// The buffer was filled up to its capacity (minus a terminating zero
    /// for character data); more rounds are needed.
    Truncated,
}

/// Accumulate the full value of a non-bindable column out of repeated
/// `SQLGetData` rounds. `fill` writes one chunk into the provided buffer and
/// reports whether the driver signalled truncation. Returns `None` for NULL.
fn drain_long_data<F>(c_type: CDataType, mut fill: F) -> Result<Option<Vec<u8>>, Error>
where
    F: FnMut(&mut [u8], &mut Len) -> Result<LongChunk, Error>,
{
    let mut buffer = vec![0u8; LONG_DATA_CHUNK];
    let mut total = Vec::new();
    loop {
        let mut raw_indicator: Len = 0;
        match fill(&mut buffer, &mut raw_indicator)? {
            LongChunk::Final => match Indicator::from_len(raw_indicator) {
                Indicator::Null => return Ok(None),
                Indicator::NoTotal => {
                    return Err(Error::ProtocolViolation(
                        "driver reported no total length for a complete read".to_string(),
                    ))
                }
                Indicator::Length(n) => {
                    if n > buffer.len() {
                        return Err(Error::ProtocolViolation(format!(
                            "too much data returned: {} bytes reported for a {} byte buffer",
                            n,
                            buffer.len()
                        )));
                    }
                    total.extend_from_slice(&buffer[..n]);
                    return Ok(Some(total));
                }
            },
            LongChunk::Truncated => {
                let keep = buffer.len() - terminator_width(c_type);
                total.extend_from_slice(&buffer[..keep]);
                if let Indicator::Length(remaining) = Indicator::from_len(raw_indicator) {
                    // The indicator reports how much data was left before
                    // this round. Enlarge the buffer so the rest arrives in
                    // a single round trip, with room for the widest
                    // terminating zero.
                    let needed = remaining.saturating_sub(keep) + 2;
                    if buffer.len() < needed {
                        buffer = vec![0; needed];
                    }
                }
            }
        }
    }
}

/// Number of bytes `SQLGetData` spends on a terminating zero for the given
/// transport type.
fn terminator_width(c_type: CDataType) -> usize {
    match c_type {
        CDataType::WChar => 2,
        CDataType::Char => 1,
        _ => 0,
    }
}

/// Decode a value out of a buffer filled by the driver, according to the C
/// type it was requested as.
fn decode_value(c_type: CDataType, sql_type: SqlDataType, data: &[u8]) -> Result<Value, Error> {
    let value = match c_type {
        CDataType::Bit => Value::Bool(data[0] != 0),
        CDataType::SLong => Value::Int32(i32::from_ne_bytes(data[..4].try_into().unwrap())),
        CDataType::SBigInt => Value::Int64(i64::from_ne_bytes(data[..8].try_into().unwrap())),
        CDataType::Double => Value::Double(f64::from_ne_bytes(data[..8].try_into().unwrap())),
        CDataType::Char => Value::Bytes(data.to_vec()),
        CDataType::WChar => {
            let units: Vec<u16> = data
                .chunks_exact(2)
                .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
                .collect();
            Value::Text(utf16_to_string(&units))
        }
        CDataType::TypeTimestamp => {
            // Safety: the buffer was filled by the driver as a timestamp
            // struct of at least this size.
            let ts: odbc_sys::Timestamp = unsafe { ptr::read_unaligned(data.as_ptr().cast()) };
            let datetime = NaiveDate::from_ymd_opt(ts.year as i32, ts.month as u32, ts.day as u32)
                .and_then(|d| {
                    d.and_hms_nano_opt(
                        ts.hour as u32,
                        ts.minute as u32,
                        ts.second as u32,
                        ts.fraction,
                    )
                })
                .ok_or_else(|| out_of_range_timestamp(&ts))?;
            Value::Timestamp(datetime)
        }
        CDataType::TypeDate => {
            let date: odbc_sys::Date = unsafe { ptr::read_unaligned(data.as_ptr().cast()) };
            let datetime =
                NaiveDate::from_ymd_opt(date.year as i32, date.month as u32, date.day as u32)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .ok_or_else(|| {
                        Error::ProtocolViolation(format!(
                            "driver returned the impossible date {}-{}-{}",
                            date.year, date.month, date.day
                        ))
                    })?;
            Value::Timestamp(datetime)
        }
        CDataType::TypeTime => {
            let time: odbc_sys::Time = unsafe { ptr::read_unaligned(data.as_ptr().cast()) };
            let datetime = time_of_day(time.hour, time.minute, time.second, 0)?;
            Value::Timestamp(datetime)
        }
        CDataType::Guid => {
            let guid: SqlGuid = unsafe { ptr::read_unaligned(data.as_ptr().cast()) };
            Value::Text(format_guid(&guid))
        }
        CDataType::Binary => {
            if sql_type == SS_TIME2 {
                let time: SsTime2 = unsafe { ptr::read_unaligned(data.as_ptr().cast()) };
                let datetime = time_of_day(time.hour, time.minute, time.second, time.fraction)?;
                Value::Timestamp(datetime)
            } else {
                Value::Bytes(data.to_vec())
            }
        }
        other => {
            return Err(Error::Unsupported(format!(
                "unsupported column C type {:?}",
                other
            )))
        }
    };
    Ok(value)
}

/// Times of day are reported on the first day of the calendar.
fn time_of_day(
    hour: u16,
    minute: u16,
    second: u16,
    nanoseconds: u32,
) -> Result<chrono::NaiveDateTime, Error> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| {
            d.and_hms_nano_opt(hour as u32, minute as u32, second as u32, nanoseconds)
        })
        .ok_or_else(|| {
            Error::ProtocolViolation(format!(
                "driver returned the impossible time of day {}:{}:{}.{}",
                hour, minute, second, nanoseconds
            ))
        })
}

fn out_of_range_timestamp(ts: &odbc_sys::Timestamp) -> Error {
    Error::ProtocolViolation(format!(
        "driver returned the impossible timestamp {}-{}-{} {}:{}:{}.{}",
        ts.year, ts.month, ts.day, ts.hour, ts.minute, ts.second, ts.fraction
    ))
}

/// Canonical lowercase GUID rendering.
fn format_guid(guid: &SqlGuid) -> String {
    format!(
        "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        guid.d1,
        guid.d2,
        guid.d3,
        guid.d4[0],
        guid.d4[1],
        guid.d4[2],
        guid.d4[3],
        guid.d4[4],
        guid.d4[5],
        guid.d4[6],
        guid.d4[7],
    )
}

/// Uppercase `SQL_C_*` name of a transport type, as exposed to hosts asking
/// for a column's database type name.
pub(crate) fn c_type_name(c_type: CDataType) -> &'static str {
    match c_type {
        CDataType::Char => "SQL_C_CHAR",
        CDataType::SLong => "SQL_C_LONG",
        CDataType::SShort => "SQL_C_SHORT",
        CDataType::Float => "SQL_C_FLOAT",
        CDataType::Double => "SQL_C_DOUBLE",
        CDataType::Numeric => "SQL_C_NUMERIC",
        CDataType::Date | CDataType::TypeDate => "SQL_C_DATE",
        CDataType::Time | CDataType::TypeTime => "SQL_C_TIME",
        CDataType::TypeTimestamp => "SQL_C_TYPE_TIMESTAMP",
        CDataType::TimeStamp => "SQL_C_TIMESTAMP",
        CDataType::Binary => "SQL_C_BINARY",
        CDataType::Bit => "SQL_C_BIT",
        CDataType::WChar => "SQL_C_WCHAR",
        CDataType::Default => "SQL_C_DEFAULT",
        CDataType::SBigInt => "SQL_C_SBIGINT",
        CDataType::UBigInt => "SQL_C_UBIGINT",
        CDataType::Guid => "SQL_C_GUID",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use odbc_sys::Timestamp;

    fn struct_bytes<T>(value: &T) -> Vec<u8> {
        let ptr = value as *const T as *const u8;
        unsafe { std::slice::from_raw_parts(ptr, size_of::<T>()) }.to_vec()
    }

    /// Simulates a driver answering `SQLGetData` rounds for a value of
    /// `payload` bytes, spending `terminator` bytes of every full buffer on
    /// a trailing zero. With `report_total` unset the driver answers
    /// truncated rounds with `NO_TOTAL` instead of the remaining length.
    fn fake_get_data(
        payload: &[u8],
        terminator: usize,
        report_total: bool,
    ) -> impl FnMut(&mut [u8], &mut Len) -> Result<LongChunk, Error> + '_ {
        let mut offset = 0;
        move |buffer, indicator| {
            let remaining = payload.len() - offset;
            let capacity = buffer.len() - terminator;
            if remaining > capacity {
                buffer[..capacity].copy_from_slice(&payload[offset..offset + capacity]);
                offset += capacity;
                *indicator = if report_total {
                    remaining as Len
                } else {
                    NO_TOTAL
                };
                Ok(LongChunk::Truncated)
            } else {
                buffer[..remaining].copy_from_slice(&payload[offset..offset + remaining]);
                offset += remaining;
                *indicator = remaining as Len;
                Ok(LongChunk::Final)
            }
        }
    }

    #[test]
    fn indicator_null_and_no_total() {
        assert_eq!(Indicator::Null, Indicator::from_len(NULL_DATA));
        assert_eq!(Indicator::NoTotal, Indicator::from_len(NO_TOTAL));
        assert_eq!(Indicator::Length(42), Indicator::from_len(42));
    }

    /// A 32 bit driver may write `-1` into only the low half of the 8 byte
    /// indicator cell, leaving it zero instead of sign extended.
    #[test]
    #[cfg(target_pointer_width = "64")]
    fn indicator_null_with_zero_extended_minus_one() {
        assert_eq!(Indicator::Null, Indicator::from_len(0x0000_0000_FFFF_FFFF));
    }

    #[test]
    fn guid_renders_canonical_lowercase() {
        let guid = SqlGuid {
            d1: 0x0123_4567,
            d2: 0x89ab,
            d3: 0xcdef,
            d4: [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef],
        };
        assert_eq!(
            "01234567-89ab-cdef-0123-456789abcdef",
            format_guid(&guid)
        );
    }

    #[test]
    fn decode_fixed_width_primitives() {
        let int = decode_value(CDataType::SLong, SqlDataType::INTEGER, &123i32.to_ne_bytes());
        assert_eq!(Value::Int32(123), int.unwrap());

        let big = decode_value(
            CDataType::SBigInt,
            SqlDataType::EXT_BIG_INT,
            &i64::MAX.to_ne_bytes(),
        );
        assert_eq!(Value::Int64(i64::MAX), big.unwrap());

        let double = decode_value(CDataType::Double, SqlDataType::DOUBLE, &15.5f64.to_ne_bytes());
        assert_eq!(Value::Double(15.5), double.unwrap());

        let bit = decode_value(CDataType::Bit, SqlDataType::EXT_BIT, &[1]);
        assert_eq!(Value::Bool(true), bit.unwrap());
    }

    #[test]
    fn decode_wide_text_to_utf8() {
        let units: Vec<u16> = "grüße".encode_utf16().collect();
        let bytes: Vec<u8> = units.iter().flat_map(|u| u.to_ne_bytes()).collect();
        let value = decode_value(CDataType::WChar, SqlDataType::EXT_W_VARCHAR, &bytes).unwrap();
        assert_eq!(Value::Text("grüße".to_string()), value);
    }

    #[test]
    fn decode_narrow_text_stays_bytes() {
        let value = decode_value(CDataType::Char, SqlDataType::VARCHAR, b"abc").unwrap();
        assert_eq!(Value::Bytes(b"abc".to_vec()), value);
    }

    #[test]
    fn decode_timestamp_struct() {
        let ts = Timestamp {
            year: 2015,
            month: 12,
            day: 25,
            hour: 0,
            minute: 0,
            second: 0,
            fraction: 0,
        };
        let value =
            decode_value(CDataType::TypeTimestamp, SqlDataType::TIMESTAMP, &struct_bytes(&ts))
                .unwrap();
        let expected = NaiveDate::from_ymd_opt(2015, 12, 25)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(Value::Timestamp(expected), value);
    }

    #[test]
    fn decode_time_lands_on_first_day_of_calendar() {
        let time = odbc_sys::Time {
            hour: 13,
            minute: 37,
            second: 42,
        };
        let value =
            decode_value(CDataType::TypeTime, SqlDataType::TIME, &struct_bytes(&time)).unwrap();
        let expected = NaiveDate::from_ymd_opt(1, 1, 1)
            .unwrap()
            .and_hms_opt(13, 37, 42)
            .unwrap();
        assert_eq!(Value::Timestamp(expected), value);
    }

    #[test]
    fn decode_ss_time2_keeps_fraction() {
        let time = SsTime2 {
            hour: 1,
            minute: 2,
            second: 3,
            fraction: 500_000_000,
        };
        let value = decode_value(CDataType::Binary, SS_TIME2, &struct_bytes(&time)).unwrap();
        let expected = NaiveDate::from_ymd_opt(1, 1, 1)
            .unwrap()
            .and_hms_nano_opt(1, 2, 3, 500_000_000)
            .unwrap();
        assert_eq!(Value::Timestamp(expected), value);
    }

    #[test]
    fn decode_impossible_timestamp_is_an_error() {
        let ts = Timestamp {
            year: 2015,
            month: 13,
            day: 32,
            hour: 0,
            minute: 0,
            second: 0,
            fraction: 0,
        };
        let result =
            decode_value(CDataType::TypeTimestamp, SqlDataType::TIMESTAMP, &struct_bytes(&ts));
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn variable_width_classification() {
        // A known small upper bound makes the column bindable, with room for
        // wide characters and a terminating zero.
        let column = Column::variable(
            "a".to_string(),
            SqlDataType::EXT_W_VARCHAR,
            CDataType::WChar,
            10,
        )
        .unwrap();
        match column.kind {
            ColumnKind::Bindable {
                size,
                variable_width,
                ..
            } => {
                assert_eq!(22, size);
                assert!(variable_width);
            }
            ColumnKind::NonBindable => panic!("short wide column must be bindable"),
        }

        // Zero means the driver does not know an upper bound.
        let column = Column::variable(
            "b".to_string(),
            SqlDataType::EXT_W_LONG_VARCHAR,
            CDataType::WChar,
            0,
        )
        .unwrap();
        assert!(matches!(column.kind, ColumnKind::NonBindable));

        // Large bounds are not worth a per-row buffer either.
        let column = Column::variable(
            "c".to_string(),
            SqlDataType::VARCHAR,
            CDataType::Char,
            2000,
        )
        .unwrap();
        assert!(matches!(column.kind, ColumnKind::NonBindable));
    }

    #[test]
    fn drain_single_chunk_value() {
        let payload = b"abc";
        let result = drain_long_data(CDataType::Char, fake_get_data(payload, 1, true)).unwrap();
        assert_eq!(Some(payload.to_vec()), result);
    }

    #[test]
    fn drain_null_value() {
        let fill = |_buffer: &mut [u8], indicator: &mut Len| {
            *indicator = NULL_DATA;
            Ok(LongChunk::Final)
        };
        assert_eq!(None, drain_long_data(CDataType::Char, fill).unwrap());
    }

    /// The concatenated payload of a streamed narrow text column has exactly
    /// the length of the value, the per-chunk terminators are stripped.
    #[test]
    fn drain_long_narrow_text() {
        let payload: Vec<u8> = (0..1500u32).map(|i| b'a' + (i % 23) as u8).collect();
        let result =
            drain_long_data(CDataType::Char, fake_get_data(&payload, 1, true)).unwrap();
        assert_eq!(Some(payload), result);
    }

    #[test]
    fn drain_long_wide_text() {
        let payload: Vec<u8> = (0..2060u32).map(|i| (i % 251) as u8).collect();
        let result =
            drain_long_data(CDataType::WChar, fake_get_data(&payload, 2, true)).unwrap();
        assert_eq!(Some(payload), result);
    }

    #[test]
    fn drain_long_binary_is_exact() {
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let result =
            drain_long_data(CDataType::Binary, fake_get_data(&payload, 0, true)).unwrap();
        assert_eq!(Some(payload), result);
    }

    /// Without a remaining-total hint the loop keeps going with the original
    /// scratch buffer until the driver reports the final chunk.
    #[test]
    fn drain_without_total_hint_keeps_looping() {
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let result =
            drain_long_data(CDataType::Char, fake_get_data(&payload, 1, false)).unwrap();
        assert_eq!(Some(payload), result);
    }

    #[test]
    fn drain_rejects_oversized_final_chunk() {
        let fill = |_buffer: &mut [u8], indicator: &mut Len| {
            *indicator = (LONG_DATA_CHUNK + 1) as Len;
            Ok(LongChunk::Final)
        };
        let result = drain_long_data(CDataType::Binary, fill);
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn c_type_names_are_uppercase_sql_constants() {
        assert_eq!("SQL_C_WCHAR", c_type_name(CDataType::WChar));
        assert_eq!("SQL_C_SBIGINT", c_type_name(CDataType::SBigInt));
        assert_eq!("SQL_C_GUID", c_type_name(CDataType::Guid));
    }
}
