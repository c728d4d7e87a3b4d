//! Binding of host values to statement parameter markers.
//!
//! Each prepared statement owns one [`Parameter`] per marker. A slot keeps
//! whatever metadata `SQLDescribeParam` produced (not every driver manager
//! implements it; failure just means type inference falls back to the value's
//! runtime type) and retains the most recently bound buffer together with its
//! length-or-indicator cell, both of which ODBC dereferences at execute time.
//! Rebinding on every execution keeps the logic simple and is cheap compared
//! to the round trip.

use crate::{
    error::Error,
    handles::{self, log_diagnostics, ParameterDescription, SqlResult},
    value::Value,
};
use chrono::{Datelike, Timelike};
use log::debug;
use odbc_sys::{CDataType, Len, Pointer, SmallInt, SqlDataType, ULen, NULL_DATA};

/// Text parameters at least this many characters long are declared as
/// `SQL_WLONGVARCHAR`, so they survive drivers which cap plain `WCHAR`.
const LONG_TEXT_THRESHOLD: usize = 4000;

/// Byte string parameters at least this long are declared as
/// `SQL_LONGVARBINARY`.
const LONG_BINARY_THRESHOLD: usize = 8000;

/// A parameter marker of a prepared statement.
pub(crate) struct Parameter {
    described: Option<ParameterDescription>,
    /// Retains the bound buffer. ODBC reads it during `SQLExecute`, so it
    /// must stay alive and in place from bind until execution completed.
    buffer: ParamBuffer,
    /// The length-or-indicator cell, addressable on its own because the
    /// driver reads it separately from the buffer.
    indicator: Box<Len>,
}

/// Owned storage for a bound parameter value.
enum ParamBuffer {
    /// Nothing bound yet.
    Unbound,
    Bytes(Vec<u8>),
    Wide(Vec<u16>),
    Int32(Box<i32>),
    Int64(Box<i64>),
    Double(Box<f64>),
    Bit(Box<u8>),
    Timestamp(Box<odbc_sys::Timestamp>),
}

impl ParamBuffer {
    fn value_ptr(&self) -> Pointer {
        match self {
            ParamBuffer::Unbound => std::ptr::null_mut(),
            ParamBuffer::Bytes(v) => v.as_ptr() as Pointer,
            ParamBuffer::Wide(v) => v.as_ptr() as Pointer,
            ParamBuffer::Int32(v) => v.as_ref() as *const i32 as Pointer,
            ParamBuffer::Int64(v) => v.as_ref() as *const i64 as Pointer,
            ParamBuffer::Double(v) => v.as_ref() as *const f64 as Pointer,
            ParamBuffer::Bit(v) => v.as_ref() as *const u8 as Pointer,
            ParamBuffer::Timestamp(v) => v.as_ref() as *const odbc_sys::Timestamp as Pointer,
        }
    }
}

/// Everything `SQLBindParameter` needs for one marker, decided from the
/// runtime type of the value and the described metadata.
struct BindPlan {
    value_type: CDataType,
    parameter_type: SqlDataType,
    column_size: ULen,
    decimal_digits: SmallInt,
    buffer: ParamBuffer,
    buffer_length: Len,
    indicator: Len,
}

impl Parameter {
    fn new(described: Option<ParameterDescription>) -> Self {
        Parameter {
            described,
            buffer: ParamBuffer::Unbound,
            indicator: Box::new(0),
        }
    }

    /// Bind `value` to the marker at `index` (zero based). The previous
    /// buffer is replaced; the new one stays alive until the next bind or
    /// until the statement handle is released.
    pub(crate) fn bind_value(
        &mut self,
        stmt: &handles::Statement,
        index: usize,
        value: &Value,
        access_driver: bool,
    ) -> Result<(), Error> {
        let plan = plan_bind(value, self.described.as_ref(), access_driver)?;
        self.buffer = plan.buffer;
        *self.indicator = plan.indicator;
        // Safety: buffer and indicator live in this parameter, which the
        // statement keeps alive across the execution.
        unsafe {
            stmt.bind_input_parameter(
                (index + 1) as u16,
                plan.value_type,
                plan.parameter_type,
                plan.column_size,
                plan.decimal_digits,
                self.buffer.value_ptr(),
                plan.buffer_length,
                self.indicator.as_mut() as *mut Len,
            )
        }
        .into_result(stmt)
    }
}

/// Decide C type, SQL type, sizes and buffer content for one value.
fn plan_bind(
    value: &Value,
    described: Option<&ParameterDescription>,
    access_driver: bool,
) -> Result<BindPlan, Error> {
    let plan = match value {
        Value::Null => {
            let (parameter_type, column_size, decimal_digits) =
                described_or(described, SqlDataType::EXT_W_CHAR, 1, 0);
            BindPlan {
                value_type: CDataType::WChar,
                parameter_type,
                column_size,
                decimal_digits,
                // A one character phantom buffer; the indicator alone marks
                // the value as NULL.
                buffer: ParamBuffer::Wide(vec![0]),
                buffer_length: 0,
                indicator: NULL_DATA,
            }
        }
        Value::Text(text) => {
            let mut units: Vec<u16> = text.encode_utf16().collect();
            let characters = units.len();
            units.push(0);
            let bytes = (characters * 2) as Len;
            let default_type = if access_driver {
                // The Access driver rejects plain wide char parameters of
                // non trivial length; long text always works.
                SqlDataType::EXT_W_LONG_VARCHAR
            } else if characters >= LONG_TEXT_THRESHOLD {
                SqlDataType::EXT_W_LONG_VARCHAR
            } else if characters <= 1 {
                SqlDataType::EXT_W_VARCHAR
            } else {
                SqlDataType::EXT_W_CHAR
            };
            let (parameter_type, column_size, decimal_digits) = if access_driver {
                (default_type, characters as ULen, 0)
            } else {
                described_or(described, default_type, characters as ULen, 0)
            };
            BindPlan {
                value_type: CDataType::WChar,
                parameter_type,
                column_size,
                decimal_digits,
                buffer: ParamBuffer::Wide(units),
                buffer_length: bytes,
                indicator: bytes,
            }
        }
        Value::Int32(v) => int32_plan(*v, described),
        Value::Int64(v) => {
            // Narrow to 32 bit where the value allows it; some driver
            // managers reject BIGINT parameters outright.
            if let Ok(small) = i32::try_from(*v) {
                int32_plan(small, described)
            } else {
                let (parameter_type, column_size, decimal_digits) =
                    described_or(described, SqlDataType::EXT_BIG_INT, 0, 0);
                BindPlan {
                    value_type: CDataType::SBigInt,
                    parameter_type,
                    column_size,
                    decimal_digits,
                    buffer: ParamBuffer::Int64(Box::new(*v)),
                    buffer_length: 0,
                    indicator: 0,
                }
            }
        }
        Value::Bool(v) => {
            let (parameter_type, column_size, decimal_digits) =
                described_or(described, SqlDataType::EXT_BIT, 0, 0);
            BindPlan {
                value_type: CDataType::Bit,
                parameter_type,
                column_size,
                decimal_digits,
                buffer: ParamBuffer::Bit(Box::new(u8::from(*v))),
                buffer_length: 0,
                indicator: 0,
            }
        }
        Value::Double(v) => {
            let (parameter_type, column_size, decimal_digits) =
                described_or(described, SqlDataType::DOUBLE, 0, 0);
            BindPlan {
                value_type: CDataType::Double,
                parameter_type,
                column_size,
                decimal_digits,
                buffer: ParamBuffer::Double(Box::new(*v)),
                buffer_length: 0,
                indicator: 0,
            }
        }
        Value::Timestamp(ts) => {
            let decimal_digits = described.map(|d| d.decimal_digits).unwrap_or(3);
            // Characters in yyyy-mm-dd hh:mm:ss[.fff...]: twenty plus the
            // fractional digits.
            let column_size = (20 + decimal_digits.max(0) as usize) as ULen;
            let parameter_type = described
                .map(|d| d.data_type)
                .unwrap_or(SqlDataType::TIMESTAMP);
            let odbc_ts = odbc_sys::Timestamp {
                year: ts.year() as i16,
                month: ts.month() as u16,
                day: ts.day() as u16,
                hour: ts.hour() as u16,
                minute: ts.minute() as u16,
                second: ts.second() as u16,
                fraction: ts.nanosecond(),
            };
            BindPlan {
                value_type: CDataType::TypeTimestamp,
                parameter_type,
                column_size,
                decimal_digits,
                buffer: ParamBuffer::Timestamp(Box::new(odbc_ts)),
                buffer_length: 0,
                indicator: 0,
            }
        }
        Value::Bytes(bytes) => {
            let len = bytes.len();
            let default_type = if len >= LONG_BINARY_THRESHOLD || len == 0 {
                SqlDataType::EXT_LONG_VAR_BINARY
            } else {
                SqlDataType::EXT_BINARY
            };
            let (parameter_type, column_size, decimal_digits) =
                described_or(described, default_type, len as ULen, 0);
            BindPlan {
                value_type: CDataType::Binary,
                parameter_type,
                column_size,
                decimal_digits,
                buffer: ParamBuffer::Bytes(bytes.clone()),
                buffer_length: len as Len,
                indicator: len as Len,
            }
        }
    };
    Ok(plan)
}

fn int32_plan(value: i32, described: Option<&ParameterDescription>) -> BindPlan {
    let (parameter_type, column_size, decimal_digits) =
        described_or(described, SqlDataType::INTEGER, 0, 0);
    BindPlan {
        value_type: CDataType::SLong,
        parameter_type,
        column_size,
        decimal_digits,
        buffer: ParamBuffer::Int32(Box::new(value)),
        buffer_length: 0,
        indicator: 0,
    }
}

/// Described metadata wins over inferred defaults, like the driver asked.
fn described_or(
    described: Option<&ParameterDescription>,
    default_type: SqlDataType,
    default_size: ULen,
    default_decimal: SmallInt,
) -> (SqlDataType, ULen, SmallInt) {
    match described {
        Some(d) => (d.data_type, d.size, d.decimal_digits),
        None => (default_type, default_size, default_decimal),
    }
}

/// Described parameters of size zero are the "MAX" flavours of their
/// variable width types; rewrite them so the binder declares them unbounded.
fn rewrite_max_type(mut description: ParameterDescription) -> ParameterDescription {
    if description.size == 0 {
        description.data_type = match description.data_type {
            SqlDataType::EXT_VAR_BINARY => SqlDataType::EXT_LONG_VAR_BINARY,
            SqlDataType::VARCHAR => SqlDataType::EXT_LONG_VARCHAR,
            SqlDataType::EXT_W_VARCHAR => SqlDataType::EXT_W_LONG_VARCHAR,
            other => other,
        };
    }
    description
}

/// Count the parameter markers of a freshly prepared statement and try to
/// describe each of them. `SQLDescribeParam` failures are swallowed: the
/// affected slot simply stays undescribed and the binder infers types from
/// the values at execution time.
pub(crate) fn extract_parameters(stmt: &handles::Statement) -> Result<Vec<Parameter>, Error> {
    let count = stmt.num_params().into_result(stmt)?;
    if count <= 0 {
        return Ok(Vec::new());
    }
    let mut parameters = Vec::with_capacity(count as usize);
    for number in 1..=count as u16 {
        let described = match stmt.describe_param(number) {
            SqlResult::Success(d) => Some(d),
            SqlResult::SuccessWithInfo(d) => {
                log_diagnostics(stmt);
                Some(d)
            }
            _ => {
                // Not implemented by every driver manager.
                debug!("SQLDescribeParam gave no metadata for parameter {number}");
                None
            }
        };
        parameters.push(Parameter::new(described.map(rewrite_max_type)));
    }
    Ok(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn described(data_type: SqlDataType, size: ULen, decimal_digits: SmallInt) -> ParameterDescription {
        ParameterDescription {
            data_type,
            size,
            decimal_digits,
        }
    }

    #[test]
    fn null_binds_a_phantom_wide_char() {
        let plan = plan_bind(&Value::Null, None, false).unwrap();
        assert_eq!(CDataType::WChar, plan.value_type);
        assert_eq!(SqlDataType::EXT_W_CHAR, plan.parameter_type);
        assert_eq!(1, plan.column_size);
        assert_eq!(NULL_DATA, plan.indicator);
        assert!(matches!(plan.buffer, ParamBuffer::Wide(ref v) if v.len() == 1));
    }

    #[test]
    fn text_counts_characters_and_bytes_separately() {
        let plan = plan_bind(&Value::Text("grüße".to_string()), None, false).unwrap();
        // Five UTF-16 units, terminator excluded from the declared size.
        assert_eq!(5, plan.column_size);
        assert_eq!(10, plan.buffer_length);
        assert_eq!(10, plan.indicator);
        assert_eq!(SqlDataType::EXT_W_CHAR, plan.parameter_type);
        // The retained buffer keeps the terminator.
        assert!(matches!(plan.buffer, ParamBuffer::Wide(ref v) if v.len() == 6));
    }

    #[test]
    fn tiny_text_binds_as_wvarchar() {
        let plan = plan_bind(&Value::Text("x".to_string()), None, false).unwrap();
        assert_eq!(SqlDataType::EXT_W_VARCHAR, plan.parameter_type);
        let plan = plan_bind(&Value::Text(String::new()), None, false).unwrap();
        assert_eq!(SqlDataType::EXT_W_VARCHAR, plan.parameter_type);
    }

    #[test]
    fn long_text_binds_as_wlongvarchar() {
        let text = "a".repeat(4000);
        let plan = plan_bind(&Value::Text(text), None, false).unwrap();
        assert_eq!(SqlDataType::EXT_W_LONG_VARCHAR, plan.parameter_type);
    }

    #[test]
    fn access_driver_forces_long_text() {
        let plan = plan_bind(&Value::Text("ab".to_string()), None, true).unwrap();
        assert_eq!(SqlDataType::EXT_W_LONG_VARCHAR, plan.parameter_type);
    }

    #[test]
    fn described_text_type_wins() {
        let d = described(SqlDataType::EXT_W_LONG_VARCHAR, 0, 0);
        let plan = plan_bind(&Value::Text("ab".to_string()), Some(&d), false).unwrap();
        assert_eq!(SqlDataType::EXT_W_LONG_VARCHAR, plan.parameter_type);
        assert_eq!(0, plan.column_size);
    }

    #[test]
    fn small_int64_narrows_to_long() {
        let plan = plan_bind(&Value::Int64(123), None, false).unwrap();
        assert_eq!(CDataType::SLong, plan.value_type);
        assert_eq!(SqlDataType::INTEGER, plan.parameter_type);
    }

    #[test]
    fn large_int64_binds_as_bigint() {
        let plan = plan_bind(&Value::Int64(i64::MAX), None, false).unwrap();
        assert_eq!(CDataType::SBigInt, plan.value_type);
        assert_eq!(SqlDataType::EXT_BIG_INT, plan.parameter_type);
    }

    #[test]
    fn bool_binds_as_bit() {
        let plan = plan_bind(&Value::Bool(true), None, false).unwrap();
        assert_eq!(CDataType::Bit, plan.value_type);
        assert_eq!(SqlDataType::EXT_BIT, plan.parameter_type);
        assert!(matches!(plan.buffer, ParamBuffer::Bit(ref b) if **b == 1));
    }

    #[test]
    fn double_binds_as_double() {
        let plan = plan_bind(&Value::Double(15.5), None, false).unwrap();
        assert_eq!(CDataType::Double, plan.value_type);
        assert_eq!(SqlDataType::DOUBLE, plan.parameter_type);
    }

    #[test]
    fn timestamp_defaults_to_three_fractional_digits() {
        let ts = NaiveDate::from_ymd_opt(2015, 12, 25)
            .unwrap()
            .and_hms_nano_opt(1, 2, 3, 400_000_000)
            .unwrap();
        let plan = plan_bind(&Value::Timestamp(ts), None, false).unwrap();
        assert_eq!(CDataType::TypeTimestamp, plan.value_type);
        assert_eq!(SqlDataType::TIMESTAMP, plan.parameter_type);
        assert_eq!(3, plan.decimal_digits);
        assert_eq!(23, plan.column_size);
        match plan.buffer {
            ParamBuffer::Timestamp(ref t) => {
                assert_eq!(2015, t.year);
                assert_eq!(400_000_000, t.fraction);
            }
            _ => panic!("timestamp parameter must retain a timestamp struct"),
        }
    }

    #[test]
    fn timestamp_uses_described_decimal_digits() {
        let ts = NaiveDate::from_ymd_opt(2015, 12, 25)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let d = described(SqlDataType::TIMESTAMP, 27, 7);
        let plan = plan_bind(&Value::Timestamp(ts), Some(&d), false).unwrap();
        assert_eq!(7, plan.decimal_digits);
        assert_eq!(27, plan.column_size);
    }

    #[test]
    fn small_bytes_bind_as_binary() {
        let plan = plan_bind(&Value::Bytes(vec![1, 2, 3]), None, false).unwrap();
        assert_eq!(CDataType::Binary, plan.value_type);
        assert_eq!(SqlDataType::EXT_BINARY, plan.parameter_type);
        assert_eq!(3, plan.column_size);
        assert_eq!(3, plan.indicator);
    }

    #[test]
    fn large_or_empty_bytes_bind_as_long_binary() {
        let plan = plan_bind(&Value::Bytes(vec![0; 8000]), None, false).unwrap();
        assert_eq!(SqlDataType::EXT_LONG_VAR_BINARY, plan.parameter_type);
        let plan = plan_bind(&Value::Bytes(Vec::new()), None, false).unwrap();
        assert_eq!(SqlDataType::EXT_LONG_VAR_BINARY, plan.parameter_type);
    }

    #[test]
    fn zero_sized_descriptions_rewrite_to_max_types() {
        let d = rewrite_max_type(described(SqlDataType::EXT_W_VARCHAR, 0, 0));
        assert_eq!(SqlDataType::EXT_W_LONG_VARCHAR, d.data_type);
        let d = rewrite_max_type(described(SqlDataType::VARCHAR, 0, 0));
        assert_eq!(SqlDataType::EXT_LONG_VARCHAR, d.data_type);
        let d = rewrite_max_type(described(SqlDataType::EXT_VAR_BINARY, 0, 0));
        assert_eq!(SqlDataType::EXT_LONG_VAR_BINARY, d.data_type);
        // Non zero sizes keep their described type.
        let d = rewrite_max_type(described(SqlDataType::EXT_W_VARCHAR, 80, 0));
        assert_eq!(SqlDataType::EXT_W_VARCHAR, d.data_type);
    }
}
