pub mod event_logger;

pub use event_logger::{DiagnosticsLog, EventCategory, EventLogEntry, LogLevel, FAILURE_NOTICE};
