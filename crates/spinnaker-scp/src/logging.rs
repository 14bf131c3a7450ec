// crates/spinnaker-scp/src/logging.rs
//! Context-prefixed logging on top of the `log` facade.
//!
//! The `scp_*!` macros accept an optional leading context implementing
//! [`LogMetadata`]; when present its metadata is prefixed in brackets. A
//! call starting with a format string literal never takes a context.

use alloc::format;
use alloc::string::String;

use crate::types::CoreAddress;

/// Trait for values that describe the context of a log line.
pub trait LogMetadata {
    fn meta(&self) -> String;
}

impl LogMetadata for CoreAddress {
    fn meta(&self) -> String {
        format!("core=({},{},{})", self.x, self.y, self.p)
    }
}

impl<T: LogMetadata + ?Sized> LogMetadata for &T {
    fn meta(&self) -> String {
        (**self).meta()
    }
}

macro_rules! scp_info {
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::info!($fmt $(, $($arg)+)?);
    }};
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::logging::LogMetadata::meta(&$ctx);
        ::log::info!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
}

macro_rules! scp_warn {
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::warn!($fmt $(, $($arg)+)?);
    }};
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::logging::LogMetadata::meta(&$ctx);
        ::log::warn!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
}

macro_rules! scp_error {
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::error!($fmt $(, $($arg)+)?);
    }};
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::logging::LogMetadata::meta(&$ctx);
        ::log::error!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
}

macro_rules! scp_debug {
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::debug!($fmt $(, $($arg)+)?);
    }};
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::logging::LogMetadata::meta(&$ctx);
        ::log::debug!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
}

macro_rules! scp_trace {
    ($fmt:literal $(, $($arg:tt)+)?) => {{
        ::log::trace!($fmt $(, $($arg)+)?);
    }};
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::logging::LogMetadata::meta(&$ctx);
        ::log::trace!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
}
