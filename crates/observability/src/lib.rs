//! Process-wide tracing setup shared by binaries and test harnesses.

/// Tracing subscriber configuration (filters, formatting).
pub mod tracing;

pub use self::tracing::{DEFAULT_FILTER, LogFormat};

/// Initialize process-wide structured logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}
