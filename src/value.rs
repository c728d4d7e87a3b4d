use chrono::NaiveDateTime;

/// A value travelling between the host SQL layer and the driver.
///
/// The same shapes are used in both directions: every variant is accepted as
/// a statement parameter, and column reads produce values out of the same
/// set. Timestamps carry no zone; the conventional interpretation is the
/// local zone of the process.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// A boolean, transported as `SQL_C_BIT`.
    Bool(bool),
    /// 32 bit signed integer.
    Int32(i32),
    /// 64 bit signed integer.
    Int64(i64),
    /// 64 bit floating point number.
    Double(f64),
    /// A byte string. Also produced for narrow character columns, whose
    /// encoding is the business of the caller.
    Bytes(Vec<u8>),
    /// UTF-8 text. Transported as UTF-16 on the wire.
    Text(String),
    /// Timestamp, also produced for date and time-of-day columns (the
    /// missing parts are zero, respectively the date 0001-01-01).
    Timestamp(NaiveDateTime),
}

impl Value {
    /// `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            None => Value::Null,
            Some(inner) => inner.into(),
        }
    }
}
