//! JSON logs with timestamps, filtered through `RUST_LOG`.

use tracing_subscriber::EnvFilter;

/// Install the subscriber. `RUST_LOG` wins over `default_directive` when set;
/// an unparsable directive falls back to `info`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_with_filter(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        init_with_filter("debug");
        assert!(!init_with_filter("not a [valid directive"));
    }
}
