use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Artificial delay applied before every gateway operation, in milliseconds.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct LatencyConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl LatencyConfig {
    pub const fn none() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            min_ms: 400,
            max_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub jwt: JwtConfig,
    pub gemini: GeminiConfig,
    pub open_food_facts_url: String,
    pub latency: LatencyConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "nutrivision".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "nutrivision-users".into()),
            ttl_minutes: parse_var("JWT_TTL_MINUTES").unwrap_or(60),
            refresh_ttl_minutes: parse_var("JWT_REFRESH_TTL_MINUTES").unwrap_or(60 * 24 * 14),
        };
        let gemini = GeminiConfig {
            api_key: std::env::var("GEMINI_API_KEY")?,
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".into()),
        };
        let open_food_facts_url = std::env::var("OPEN_FOOD_FACTS_URL")
            .unwrap_or_else(|_| "https://{region}.openfoodfacts.org".into());

        let defaults = LatencyConfig::default();
        let latency = LatencyConfig {
            min_ms: parse_var("LATENCY_MIN_MS").unwrap_or(defaults.min_ms),
            max_ms: parse_var("LATENCY_MAX_MS").unwrap_or(defaults.max_ms),
        };
        anyhow::ensure!(
            latency.min_ms <= latency.max_ms,
            "LATENCY_MIN_MS must not exceed LATENCY_MAX_MS"
        );

        Ok(Self {
            data_dir,
            jwt,
            gemini,
            open_food_facts_url,
            latency,
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
