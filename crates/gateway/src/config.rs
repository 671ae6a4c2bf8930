//! Gateway configuration: the shared [`asya_core::Config`] plus the handful
//! of keys that are specific to running the envelope store and stream.

use std::env;

use asya_core::Config;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64_opt(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub core: Config,
    /// Queue the result consumer reads successful terminal envelopes from.
    pub step_happy_end: String,
    /// Queue the result consumer reads failed terminal envelopes from.
    pub step_error_end: String,
    /// Applied to a tool call's envelope when the request doesn't set its
    /// own `timeout_sec`. `None` means envelopes never time out unless the
    /// caller asks for it.
    pub default_timeout_sec: Option<u64>,
    /// Max messages pulled per `receive` call by the result consumers.
    pub result_poll_max_messages: u32,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            core: Config::from_env(),
            step_happy_end: env_or("STEP_HAPPY_END", "happy-end"),
            step_error_end: env_or("STEP_ERROR_END", "error-end"),
            default_timeout_sec: env_u64_opt("DEFAULT_TIMEOUT_SEC"),
            result_poll_max_messages: env_u32("RESULT_POLL_MAX_MESSAGES", 10),
        }
    }
}
