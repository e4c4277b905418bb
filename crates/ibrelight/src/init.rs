//! Process-wide setup.

/// Installs the `env_logger` backend, defaulting to `info` when `RUST_LOG` is unset.
///
/// Calling it more than once is harmless; only the first call installs a logger.
/// Returns whether this call installed it.
pub fn init_logging() -> bool {
    let installed = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()
        .is_ok();
    if installed {
        log::debug!("logging initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_logging();
        assert!(!init_logging());
    }
}
