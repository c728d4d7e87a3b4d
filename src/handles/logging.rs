use super::{as_handle::AsHandle, diagnostics::collect_diagnostics};
use log::{warn, Level};

/// Inspects all diagnostics of an ODBC handle and logs their text messages.
/// Called whenever a function returns with success-with-info.
pub fn log_diagnostics(handle: &dyn AsHandle) {
    if log::max_level() < Level::Warn {
        // Early return to save the work of extracting records nobody is
        // going to see.
        return;
    }

    for record in collect_diagnostics(handle) {
        warn!("{}", record);
    }
}
