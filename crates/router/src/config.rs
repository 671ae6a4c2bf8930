//! Sidecar configuration: one `asya-router` process serves exactly one
//! actor, identified by `ACTOR_NAME`, and reads its queue of the same name.

use std::env;
use std::time::Duration;

use asya_core::config::TransportConfig;
use asya_core::Config;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub actor_name: String,
    pub socket_dir: String,
    pub runtime_timeout: Duration,
    pub step_happy_end: String,
    pub step_error_end: String,
    pub is_end_actor: bool,
    pub gateway_url: Option<String>,
    pub prefetch: u32,
    pub transport: TransportConfig,
}

impl RouterConfig {
    /// Reads the recognized options documented in `spec.md` §6. `ACTOR_NAME`
    /// is the only required key; everything else has a spec-defined default.
    pub fn from_env() -> Result<Self, String> {
        let actor_name = env_opt("ACTOR_NAME").ok_or_else(|| "ACTOR_NAME is required".to_string())?;
        Ok(Self {
            actor_name,
            socket_dir: env_or("SOCKET_DIR", "/var/run/asya"),
            runtime_timeout: Duration::from_secs(env_u32("RUNTIME_TIMEOUT_SECS", 300) as u64),
            step_happy_end: env_or("STEP_HAPPY_END", "happy-end"),
            step_error_end: env_or("STEP_ERROR_END", "error-end"),
            is_end_actor: env_bool("IS_END_ACTOR", false),
            gateway_url: env_opt("GATEWAY_URL"),
            prefetch: env_u32("PREFETCH", 1),
            transport: Config::from_env().transport,
        })
    }

    pub fn socket_path(&self) -> String {
        format!("{}/{}.sock", self.socket_dir, self.actor_name)
    }
}
