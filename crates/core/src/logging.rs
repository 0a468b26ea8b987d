//! Logging setup.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter when `RUST_LOG` is unset: our crates at debug, the rest
/// at info. Vulkan validation messages arrive through the rhi target.
const DEFAULT_FILTER: &str = "info,nebula=debug,nebula_core=debug,nebula_platform=debug,nebula_rhi=debug,nebula_renderer=debug";

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. Call once at startup, before
/// any Vulkan object is created, so setup logging is not lost.
///
/// # Example
/// ```
/// nebula_core::init_logging();
/// tracing::info!("starting up");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
