//! Tracing subscriber initialization for development and test builds.
//!
//! Two flavors:
//! - [`init_dev_subscriber`] - fixed DEBUG-level stderr logging
//! - [`init_dev_subscriber_with_env_filter`] - same, but honors `RUST_LOG`
//!
//! Call one of these at application startup (not in library code). Test
//! harnesses should use [`try_init_dev_subscriber`], which tolerates a
//! subscriber already being installed by a sibling test.

use tracing::Level;
use tracing_subscriber::fmt;

/// Initialize a simple stderr subscriber for development.
///
/// Shows DEBUG level and above, with target, file and line number.
///
/// # Panics
/// Panics if a global subscriber has already been set.
pub fn init_dev_subscriber() {
    let subscriber = fmt::Subscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Initialize a stderr subscriber that respects the `RUST_LOG` environment
/// variable. Defaults to DEBUG when `RUST_LOG` is unset.
///
/// # Panics
/// Panics if a global subscriber has already been set.
pub fn init_dev_subscriber_with_env_filter() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Like [`init_dev_subscriber_with_env_filter`] but returns `false` instead
/// of panicking when a global subscriber is already installed.
///
/// Intended for test binaries where several tests race to initialize.
pub fn try_init_dev_subscriber() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
