//! Environment-driven configuration.
//!
//! Follows the teacher's `main.rs` loading style (`std::env::var(...)
//! .unwrap_or_else(...)`) generalized to every variable named in the
//! external-interfaces design, collected behind one `Config::from_env`.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEnv {
    Development,
    Test,
    Production,
}

impl NodeEnv {
    fn parse(s: &str) -> Self {
        match s {
            "production" => Self::Production,
            "test" => Self::Test,
            _ => Self::Development,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStoreType {
    Memory,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpTransport {
    Stdio,
    Http,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in production and be at least 32 characters")]
    WeakProductionSecret(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node_env: NodeEnv,
    pub port: u16,
    pub jwt_secret: String,
    pub session_secret: String,
    pub tls_enabled: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub cors_origin: String,

    pub session_store_type: SessionStoreType,
    pub session_timeout: Duration,
    pub session_cleanup_interval: Duration,
    pub redis_url: Option<String>,

    pub ws_enabled: bool,
    pub ws_path: String,
    pub ws_heartbeat_interval: Duration,
    pub ws_max_payload: usize,

    pub browser_pool_max_size: usize,
    pub browser_pool_min_size: usize,
    pub browser_idle_timeout: Duration,

    pub log_level: String,
    pub log_format: LogFormat,

    pub audit_log_enabled: bool,
    pub audit_log_path: String,

    pub mcp_transport: McpTransport,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(
        env_var(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_ms),
    )
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let node_env = NodeEnv::parse(&env_var("NODE_ENV").unwrap_or_default());

        let jwt_secret = env_var("JWT_SECRET").unwrap_or_default();
        let session_secret = env_var("SESSION_SECRET").unwrap_or_default();
        if node_env == NodeEnv::Production {
            if jwt_secret.len() < 32 {
                return Err(ConfigError::WeakProductionSecret("JWT_SECRET"));
            }
            if session_secret.len() < 32 {
                return Err(ConfigError::WeakProductionSecret("SESSION_SECRET"));
            }
        }

        let session_store_type = match env_var("SESSION_STORE_TYPE").as_deref() {
            Some("remote") => SessionStoreType::Remote,
            Some("memory") | None => SessionStoreType::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "SESSION_STORE_TYPE",
                    value: other.to_string(),
                })
            }
        };

        let log_format = match env_var("LOG_FORMAT").as_deref() {
            Some("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };

        let mcp_transport = match env_var("MCP_TRANSPORT").as_deref() {
            Some("http") => McpTransport::Http,
            _ => McpTransport::Stdio,
        };

        Ok(Self {
            node_env,
            port: env_var("PORT")
                .or_else(|| env_var("PHOENIX_PORT"))
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            jwt_secret,
            session_secret,
            tls_enabled: env_var("TLS_ENABLED").as_deref() == Some("true"),
            tls_cert_path: env_var("TLS_CERT_PATH"),
            tls_key_path: env_var("TLS_KEY_PATH"),
            cors_origin: env_var("CORS_ORIGIN").unwrap_or_else(|| "*".to_string()),

            session_store_type,
            session_timeout: env_duration_ms("SESSION_TIMEOUT", 3_600_000),
            session_cleanup_interval: env_duration_ms("SESSION_CLEANUP_INTERVAL", 60_000),
            redis_url: env_var("REDIS_URL"),

            ws_enabled: env_var("WS_ENABLED").map_or(true, |v| v != "false"),
            ws_path: env_var("WS_PATH").unwrap_or_else(|| "/ws".to_string()),
            ws_heartbeat_interval: env_duration_ms("WS_HEARTBEAT_INTERVAL", 30_000),
            ws_max_payload: env_var("WS_MAX_PAYLOAD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1024 * 1024),

            browser_pool_max_size: env_var("BROWSER_POOL_MAX_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            browser_pool_min_size: env_var("BROWSER_POOL_MIN_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            browser_idle_timeout: env_duration_ms("BROWSER_IDLE_TIMEOUT", 300_000),

            log_level: env_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,

            audit_log_enabled: env_var("AUDIT_LOG_ENABLED").map_or(true, |v| v != "false"),
            audit_log_path: env_var("AUDIT_LOG_PATH").unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                format!("{home}/.phoenix-bcp/audit")
            }),

            mcp_transport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_without_secrets_is_rejected() {
        std::env::set_var("NODE_ENV", "production");
        std::env::remove_var("JWT_SECRET");
        std::env::remove_var("SESSION_SECRET");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::WeakProductionSecret("JWT_SECRET")));
        std::env::remove_var("NODE_ENV");
    }

    #[test]
    fn defaults_apply_in_development() {
        std::env::remove_var("NODE_ENV");
        std::env::remove_var("BROWSER_POOL_MAX_SIZE");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.browser_pool_max_size, 5);
        assert_eq!(cfg.ws_path, "/ws");
    }
}
