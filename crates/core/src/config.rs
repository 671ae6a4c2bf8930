//! Environment-driven configuration shared by the router and the gateway.
//!
//! Every value can be overridden per-profile: with `ASYA_PROFILE=PROD` set,
//! a key like `PG_HOST` is first looked up as `PROD_PG_HOST`, falling back
//! to the unprefixed `PG_HOST`. This lets one `.env` file hold several
//! environments side by side without a templating layer.

use std::env;

use serde::{Deserialize, Serialize};

/// Load a `.env` file from the working directory (silently ignored if absent).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub profile: String,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub transport: TransportConfig,
    pub runtime: RuntimeConfig,
}

/// Well-known env keys that identify a profile when prefixed.
const PROFILE_MARKER_KEYS: &[&str] = &["PG_HOST", "AMQP_URL", "AWS_ACCESS_KEY_ID", "RUNTIME_SOCKET_PATH"];

impl Config {
    /// Build config from the environment. Profile is read from `ASYA_PROFILE`.
    pub fn from_env() -> Self {
        let profile = env_or("ASYA_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            transport: TransportConfig::from_env_profiled(p),
            runtime: RuntimeConfig::from_env_profiled(p),
        }
    }

    /// Discover available profiles by scanning env vars for `{PREFIX}_{MARKER_KEY}` patterns.
    pub fn available_profiles() -> Vec<String> {
        let mut profiles = std::collections::BTreeSet::new();
        profiles.insert("default".to_string());
        for (key, _) in env::vars() {
            for marker in PROFILE_MARKER_KEYS {
                if let Some(prefix) = key.strip_suffix(&format!("_{}", marker)) {
                    if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
                        profiles.insert(prefix.to_string());
                    }
                }
            }
        }
        profiles.into_iter().collect()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    pub fn log_summary(&self) {
        tracing::info!("config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:    host={}, port={}", self.server.host, self.server.port);
        tracing::info!("  postgres:  host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!("  transport: backend={}", self.transport.backend);
        tracing::info!("  runtime:   socket={}", self.runtime.socket_path);
    }

    /// Redacted view safe to return from a health/debug endpoint.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "postgres": {
                "host": self.postgres.host,
                "port": self.postgres.port,
                "database": self.postgres.database,
                "configured": self.postgres.is_configured(),
            },
            "transport": {
                "backend": self.transport.backend,
                "configured": self.transport.is_configured(),
            },
            "runtime": { "socket_path": self.runtime.socket_path },
        })
    }
}

// ── Server (gateway HTTP surface) ──────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 8080),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── PostgreSQL (envelope store) ─────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "asya"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Transport (queue backend) ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// "rabbitmq" or "sqs".
    pub backend: String,
    pub amqp_url: Option<String>,
    pub aws: AwsConfig,
    pub visibility_timeout_secs: u32,
    pub poll_wait_secs: u32,
}

impl TransportConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            backend: profiled_env_or(p, "TRANSPORT_BACKEND", "rabbitmq"),
            amqp_url: profiled_env_opt(p, "AMQP_URL"),
            aws: AwsConfig::from_env_profiled(p),
            visibility_timeout_secs: profiled_env_u32(p, "VISIBILITY_TIMEOUT_SECS", 30),
            poll_wait_secs: profiled_env_u32(p, "POLL_WAIT_SECS", 20),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.backend.as_str() {
            "rabbitmq" => self.amqp_url.is_some(),
            "sqs" => self.aws.is_configured(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "ap-southeast-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.access_key_id.is_some()
    }
}

// ── Runtime client (sidecar -> actor unix socket) ──────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub socket_path: String,
    pub call_timeout_ms: u64,
}

impl RuntimeConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            socket_path: profiled_env_or(p, "RUNTIME_SOCKET_PATH", "/var/run/asya/runtime.sock"),
            call_timeout_ms: profiled_env_u64(p, "RUNTIME_CALL_TIMEOUT_MS", 30_000),
        }
    }
}
