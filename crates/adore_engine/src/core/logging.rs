//! Logging utilities
//!
//! Everything in the engine reports through the `log` facade. Applications
//! that do not install their own logger can call [`init`] or
//! [`init_with_level`] to get `env_logger` output that still honours
//! `RUST_LOG`.

pub use log::{debug, error, info, trace, warn, LevelFilter};

/// Initialize `env_logger` from the environment
///
/// Returns `false` if a logger was already installed.
pub fn init() -> bool {
    env_logger::Builder::from_default_env().try_init().is_ok()
}

/// Initialize `env_logger` with a default level that `RUST_LOG` may override
pub fn init_with_level(level: LevelFilter) -> bool {
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .parse_default_env()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_with_level(LevelFilter::Debug);
        assert!(!init());
    }
}
