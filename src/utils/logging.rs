//! Logging that a module can silence on its own.
//!
//! Each macro expands to the matching `log` macro behind the calling module's
//! `ENABLE_LOGS` constant, so the per-tick countdown chatter can be turned off
//! without lowering `RUST_LOG` for the whole crate.
//!
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info};
//!
//! log_info!("countdown started: {}s", total_secs);
//! ```

#[doc(hidden)]
#[macro_export]
macro_rules! __gated_log {
    ($level:ident, $($arg:tt)*) => {
        if ENABLE_LOGS {
            ::log::$level!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::__gated_log!(debug, $($arg)*) };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::__gated_log!(info, $($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::__gated_log!(warn, $($arg)*) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::__gated_log!(error, $($arg)*) };
}
