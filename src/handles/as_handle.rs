use odbc_sys::{Handle, HandleType};

/// Provides access to the raw underlying ODBC handle.
///
/// # Safety
///
/// Implementers must hold a valid handle of the advertised type for their
/// entire lifetime, so it can be used to query diagnostics.
pub unsafe trait AsHandle {
    /// The raw handle, used together with `handle_type` in ODBC function
    /// calls.
    fn as_handle(&self) -> Handle;

    /// The type of the ODBC handle returned by `as_handle`.
    fn handle_type(&self) -> HandleType;
}
