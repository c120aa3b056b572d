//! Logger setup and per-request log context

use env_logger::Env;
use log::{info, warn};

use crate::config::LoggingConfig;

/// Initialize log4rs from the configured file, or env_logger if that fails
pub fn init(config: &LoggingConfig) {
    match log4rs::init_file(&config.config_file, Default::default()) {
        Ok(()) => info!("Logging configured from {}", config.config_file),
        Err(e) => {
            let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();
            warn!(
                "Could not load log config {} ({}), logging to stderr",
                config.config_file, e
            );
        }
    }
}

/// `op`/`key` log context on the current thread, removed when dropped.
///
/// MDC values are thread-local, so the guard must live on the thread that
/// logs: inside the `web::block` closure for store work, never across an
/// `.await`.
pub struct RequestTags(());

impl RequestTags {
    pub fn set(op: &str, key: &str) -> Self {
        log_mdc::insert("op", op);
        log_mdc::insert("key", key);
        RequestTags(())
    }
}

impl Drop for RequestTags {
    fn drop(&mut self) {
        log_mdc::remove("op");
        log_mdc::remove("key");
    }
}

/// Run `f` with the request tags set, clearing them afterwards
pub fn with_request_tags<T>(op: &str, key: &str, f: impl FnOnce() -> T) -> T {
    let _tags = RequestTags::set(op, key);
    f()
}
