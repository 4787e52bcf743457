//! Process-wide tracing setup shared by binaries.

/// Tracing subscriber installation.
pub mod tracing;

/// Install JSON logging with the `RUST_LOG` filter, `info` when unset.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    self::tracing::init_with_filter("info");
}

pub use self::tracing::init_with_filter;
