// Project-wide constants
//
// Centralised here so port numbers and other magic values have one
// source of truth. Import via `use crate::config::constants::*;`.

/// Default bind address for the model service (localhost only).
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:4000";

/// Default base URL the smoke test targets.
pub const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:4000";

/// Default log directory, relative to the working directory.
pub const DEFAULT_LOG_DIR: &str = "./logfiles";

/// Default bounded wait for a contended log partition, in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Largest request body the service accepts.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "MODELOG_CONFIG";

/// Environment override for the log directory.
pub const LOG_DIR_ENV: &str = "MODELOG_LOG_DIR";

/// Environment override for the bind address.
pub const BIND_ENV: &str = "MODELOG_BIND";
