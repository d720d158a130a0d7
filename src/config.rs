pub const DEFAULT_TURNSTILE_VERIFY_URL: &str =
    "https://challenges.cloudflare.com/turnstile/v0/siteverify";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub pass: PassConfig,
    pub challenge: ChallengeConfig,
    pub upstream: UpstreamConfig,
    /// Use the first `X-Forwarded-For` hop as the client address.
    /// Only enable behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
    pub allowed_origin: String,
    /// Seconds between background sweeps of expired passes.
    pub sweep_interval_secs: u64,
}

/// Access-pass settings as configured. `ttl_secs` and `max_uses` are raw and
/// get clamped by `PassService::new`.
#[derive(Debug, Clone)]
pub struct PassConfig {
    pub enabled: bool,
    pub ttl_secs: i64,
    pub max_uses: i64,
    /// Header carrying the pass in both directions.
    pub header: String,
    pub bind_address: bool,
    pub bind_user_agent: bool,
    pub max_entries: usize,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_uses: 5,
            header: "x-access-pass".into(),
            bind_address: true,
            bind_user_agent: true,
            max_entries: 100_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    /// Request header carrying the client's challenge response.
    pub header: String,
    pub secret: Option<String>,
    pub verify_url: String,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let challenge_secret = std::env::var("PASSGATE_CHALLENGE_SECRET")
        .ok()
        .filter(|s| !s.trim().is_empty());

    if challenge_secret.is_none() {
        let env_mode = std::env::var("PASSGATE_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "PASSGATE_CHALLENGE_SECRET is not set. \
                 Every challenge would fail verification in production."
            );
        }
        tracing::warn!("PASSGATE_CHALLENGE_SECRET is not set; challenge verification will reject every request");
    }

    let defaults = PassConfig::default();

    Ok(Config {
        port: env_parse("PASSGATE_PORT", 8080),
        pass: PassConfig {
            enabled: env_bool("PASSGATE_PASS_ENABLED", defaults.enabled),
            ttl_secs: env_parse("PASSGATE_PASS_TTL_SECS", defaults.ttl_secs),
            max_uses: env_parse("PASSGATE_PASS_MAX_USES", defaults.max_uses),
            header: env_header("PASSGATE_PASS_HEADER", &defaults.header),
            bind_address: env_bool("PASSGATE_PASS_BIND_ADDRESS", defaults.bind_address),
            bind_user_agent: env_bool("PASSGATE_PASS_BIND_USER_AGENT", defaults.bind_user_agent),
            max_entries: env_parse("PASSGATE_PASS_MAX_ENTRIES", defaults.max_entries),
        },
        challenge: ChallengeConfig {
            header: env_header("PASSGATE_CHALLENGE_HEADER", "x-challenge-token"),
            secret: challenge_secret,
            verify_url: std::env::var("PASSGATE_CHALLENGE_VERIFY_URL")
                .unwrap_or_else(|_| DEFAULT_TURNSTILE_VERIFY_URL.into()),
        },
        upstream: UpstreamConfig {
            url: std::env::var("PASSGATE_UPSTREAM_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:11434/v1/chat/completions".into()),
            api_key: std::env::var("PASSGATE_UPSTREAM_API_KEY").ok(),
            timeout_secs: env_parse("PASSGATE_UPSTREAM_TIMEOUT_SECS", 60),
        },
        trust_forwarded_for: env_bool("PASSGATE_TRUST_FORWARDED_FOR", false),
        allowed_origin: std::env::var("PASSGATE_ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".into()),
        sweep_interval_secs: env_parse("PASSGATE_SWEEP_INTERVAL_SECS", 60).max(1),
    })
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

/// Header names are matched case-insensitively; store them lowercased.
fn env_header(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
