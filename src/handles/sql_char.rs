//! Most of the conditional compilation around the two character widths of the
//! ODBC API lives in this module, so the rest of the crate does not have to
//! care. String carrying entry points use the wide (UTF-16) variants on a
//! Windows driver manager and the narrow variants elsewhere; the `wide` and
//! `narrow` features override the default in either direction.
//!
//! Column and parameter text payloads are independent of this choice: they
//! always travel as UTF-16 (`SQL_C_WCHAR`), like the driver managers define
//! it.

use super::buffer::buf_ptr;
use widestring::U16Str;

#[cfg(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows")))]
use std::marker::PhantomData;
#[cfg(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows")))]
use widestring::U16String;

/// Character type of the string carrying ODBC entry points selected for this
/// build.
#[cfg(not(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows"))))]
pub type SqlChar = u8;
#[cfg(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows")))]
pub type SqlChar = u16;

/// An UTF-8 string prepared to be passed to a string carrying ODBC entry
/// point. For wide builds this owns the converted UTF-16 buffer, for narrow
/// builds the original slice is passed through unchanged.
pub struct SqlText<'a> {
    #[cfg(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows")))]
    text: U16String,
    #[cfg(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows")))]
    _ref: PhantomData<&'a str>,
    #[cfg(not(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows"))))]
    text: &'a str,
}

impl<'a> SqlText<'a> {
    #[cfg(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows")))]
    pub fn new(text: &'a str) -> Self {
        Self {
            text: U16String::from_str(text),
            _ref: PhantomData,
        }
    }

    #[cfg(not(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows"))))]
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }

    #[cfg(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows")))]
    pub fn ptr(&self) -> *const u16 {
        buf_ptr(self.text.as_slice())
    }

    #[cfg(not(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows"))))]
    pub fn ptr(&self) -> *const u8 {
        buf_ptr(self.text.as_bytes())
    }

    /// Length in characters, excluding any terminating zero.
    pub fn len_char(&self) -> usize {
        self.text.len()
    }
}

/// Decode a sequence of UTF-16 code units into a `String`.
///
/// The sequence is cut off at the first zero code unit, surrogate pairs are
/// combined and lone surrogates are replaced with U+FFFD. Decoding the output
/// of a well formed UTF-16 encoder therefore round trips.
pub fn utf16_to_string(units: &[u16]) -> String {
    let end = units.iter().position(|&unit| unit == 0).unwrap_or(units.len());
    U16Str::from_slice(&units[..end]).to_string_lossy()
}

/// Decode characters returned by a string carrying ODBC entry point of this
/// build into a `String`. Cut off at the first zero character.
#[cfg(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows")))]
pub fn sql_chars_to_string(units: &[SqlChar]) -> String {
    utf16_to_string(units)
}

/// Decode characters returned by a string carrying ODBC entry point of this
/// build into a `String`. Cut off at the first zero character.
#[cfg(not(any(feature = "wide", all(not(feature = "narrow"), target_os = "windows"))))]
pub fn sql_chars_to_string(units: &[SqlChar]) -> String {
    let end = units.iter().position(|&unit| unit == 0).unwrap_or(units.len());
    String::from_utf8_lossy(&units[..end]).into_owned()
}
