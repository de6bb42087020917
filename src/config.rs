use serde::Deserialize;

use crate::tokens::TtlPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    /// Key-value backend, selected by scheme: `memory://`, `file://`,
    /// `redis://` or `postgres://`.
    pub store_url: String,
    pub users_file: String,
    pub manifest_file: Option<String>,
    /// Base URL of the host REST API that rest-alias tools forward to.
    pub rest_upstream: Option<String>,
    pub rest_token: Option<String>,
    pub token_issuer: String,
    pub token_min_ttl: u64,
    pub token_max_ttl: u64,
    pub token_default_ttl: u64,
    /// Returned to clients in the `initialize` result.
    pub instructions: Option<String>,
    pub production: bool,
}

impl Config {
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            min: self.token_min_ttl,
            max: self.token_max_ttl,
            default: self.token_default_ttl,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let ttl = TtlPolicy::default();
        Self {
            port: 8080,
            store_url: "file://data/mcp-state.json".into(),
            users_file: "users.yaml".into(),
            manifest_file: None,
            rest_upstream: None,
            rest_token: None,
            token_issuer: "mcp-gateway".into(),
            token_min_ttl: ttl.min,
            token_max_ttl: ttl.max,
            token_default_ttl: ttl.default,
            instructions: None,
            production: false,
        }
    }
}

fn env_u64(name: &str, fallback: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = Config::default();
    let env_mode = std::env::var("MCP_ENV")
        .or_else(|_| std::env::var("RUST_ENV"))
        .unwrap_or_default();

    let cfg = Config {
        port: std::env::var("MCP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port),
        store_url: std::env::var("MCP_STORE_URL").unwrap_or(defaults.store_url),
        users_file: std::env::var("MCP_USERS_FILE").unwrap_or(defaults.users_file),
        manifest_file: std::env::var("MCP_MANIFEST_FILE").ok(),
        rest_upstream: std::env::var("MCP_REST_UPSTREAM").ok(),
        rest_token: std::env::var("MCP_REST_TOKEN").ok(),
        token_issuer: std::env::var("MCP_TOKEN_ISSUER").unwrap_or(defaults.token_issuer),
        token_min_ttl: env_u64("MCP_TOKEN_MIN_TTL", defaults.token_min_ttl),
        token_max_ttl: env_u64("MCP_TOKEN_MAX_TTL", defaults.token_max_ttl),
        token_default_ttl: env_u64("MCP_TOKEN_DEFAULT_TTL", defaults.token_default_ttl),
        instructions: std::env::var("MCP_INSTRUCTIONS").ok().filter(|v| !v.is_empty()),
        production: env_mode == "production",
    };

    if cfg.token_min_ttl > cfg.token_max_ttl {
        anyhow::bail!(
            "MCP_TOKEN_MIN_TTL ({}) is greater than MCP_TOKEN_MAX_TTL ({})",
            cfg.token_min_ttl,
            cfg.token_max_ttl
        );
    }
    if cfg.token_default_ttl < cfg.token_min_ttl || cfg.token_default_ttl > cfg.token_max_ttl {
        anyhow::bail!(
            "MCP_TOKEN_DEFAULT_TTL ({}) must lie between {} and {}",
            cfg.token_default_ttl,
            cfg.token_min_ttl,
            cfg.token_max_ttl
        );
    }
    if cfg.production && cfg.store_url.starts_with("memory://") {
        anyhow::bail!("MCP_STORE_URL=memory:// loses every token on restart; refusing to run in production");
    }

    Ok(cfg)
}
