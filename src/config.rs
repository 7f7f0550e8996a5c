use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

const MIN_PRODUCTION_SECRET_LEN: usize = 32;
const MAX_JWT_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_hours: i64,
}

/// Google OAuth client settings. Endpoint URLs are configurable so tests and
/// staging can point at a local provider.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub google: GoogleConfig,
    /// Client application the OAuth callback redirects to, with `?token=`.
    pub frontend_url: String,
    pub host: String,
    pub port: u16,
    pub static_dir: String,
    pub production: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("{key} is not set"));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let database = DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            connect_timeout_secs: parse_or(&lookup, "DATABASE_CONNECT_TIMEOUT_SECS", 10)?,
        };

        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: or_default("JWT_ISSUER", "exam-auth"),
            audience: or_default("JWT_AUDIENCE", "exam-auth-users"),
            ttl_hours: parse_or(&lookup, "JWT_TTL_HOURS", 72)?,
        };

        let google = GoogleConfig {
            client_id: required("GOOGLE_CLIENT_ID")?,
            client_secret: required("GOOGLE_CLIENT_SECRET")?,
            redirect_url: or_default(
                "GOOGLE_REDIRECT_URL",
                "http://127.0.0.1:3000/api/v1/auth/google/callback",
            ),
            auth_url: or_default("GOOGLE_AUTH_URL", "https://accounts.google.com/o/oauth2/auth"),
            token_url: or_default("GOOGLE_TOKEN_URL", "https://oauth2.googleapis.com/token"),
            userinfo_url: or_default(
                "GOOGLE_USERINFO_URL",
                "https://www.googleapis.com/oauth2/v2/userinfo",
            ),
        };

        let config = Self {
            database,
            jwt,
            google,
            frontend_url: or_default("FRONTEND_URL", "http://localhost:5173/"),
            host: or_default("APP_HOST", "0.0.0.0"),
            port: parse_or(&lookup, "APP_PORT", 3000)?,
            static_dir: or_default("STATIC_DIR", "./static/public"),
            production: lookup("APP_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.frontend_url).context("FRONTEND_URL is not a valid URL")?;
        if !(1..=MAX_JWT_TTL_HOURS).contains(&self.jwt.ttl_hours) {
            anyhow::bail!(
                "JWT_TTL_HOURS must be between 1 and {MAX_JWT_TTL_HOURS}, got {}",
                self.jwt.ttl_hours
            );
        }
        if self.production && self.jwt.secret.len() < MIN_PRODUCTION_SECRET_LEN {
            anyhow::bail!(
                "JWT_SECRET must be at least {MIN_PRODUCTION_SECRET_LEN} bytes in production"
            );
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key}: {e}")),
        None => Ok(default),
    }
}
