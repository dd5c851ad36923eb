use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Duration;

use vidtube_api::tokens::TokenConfig;
use vidtube_media::CloudinaryConfig;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me", "secret"];

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub temp_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub production: bool,
    pub cors_origin: Option<String>,
    pub tokens: TokenConfig,
    pub cloudinary: CloudinaryConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &'static str| get(key).unwrap_or(default).to_string();
        let required = |key: &str| {
            get(key)
                .map(str::to_string)
                .with_context(|| format!("{key} must be set"))
        };

        let host = or("VIDTUBE_HOST", "0.0.0.0");
        let port: u16 = or("VIDTUBE_PORT", "8000").parse().context("VIDTUBE_PORT")?;
        let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

        let access_secret = required("ACCESS_TOKEN_SECRET")?;
        let refresh_secret = required("REFRESH_TOKEN_SECRET")?;
        for (name, secret) in [("ACCESS_TOKEN_SECRET", &access_secret), ("REFRESH_TOKEN_SECRET", &refresh_secret)] {
            if PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
                bail!("{name} is still a placeholder");
            }
        }
        if access_secret == refresh_secret {
            bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }

        let tokens = TokenConfig {
            access_secret,
            access_ttl: parse_duration(&or("ACCESS_TOKEN_EXPIRY", "1d")).context("ACCESS_TOKEN_EXPIRY")?,
            refresh_secret,
            refresh_ttl: parse_duration(&or("REFRESH_TOKEN_EXPIRY", "10d")).context("REFRESH_TOKEN_EXPIRY")?,
        };

        let cloudinary = CloudinaryConfig {
            cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
            api_key: required("CLOUDINARY_API_KEY")?,
            api_secret: required("CLOUDINARY_API_SECRET")?,
        };

        Ok(Self {
            addr,
            db_path: or("VIDTUBE_DB_PATH", "vidtube.db").into(),
            temp_dir: or("VIDTUBE_TEMP_DIR", "./public/temp").into(),
            max_upload_bytes: or("VIDTUBE_MAX_UPLOAD_BYTES", "5242880")
                .parse()
                .context("VIDTUBE_MAX_UPLOAD_BYTES")?,
            production: or("VIDTUBE_ENV", "development").eq_ignore_ascii_case("production"),
            cors_origin: get("CORS_ORIGIN").map(str::to_string),
            tokens,
            cloudinary,
        })
    }
}

/// Longest accepted token lifetime.
const MAX_TOKEN_TTL_DAYS: i64 = 365;

/// `<n>` seconds, or `<n>s`, `<n>m`, `<n>h`, `<n>d`. At most one year.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((i, _)) => raw.split_at(i),
        None => (raw, "s"),
    };
    let n: i64 = digits
        .parse()
        .with_context(|| format!("invalid duration: {raw:?}"))?;
    if n <= 0 {
        bail!("duration must be positive: {raw:?}");
    }
    let duration = match unit {
        "s" => Duration::try_seconds(n),
        "m" => Duration::try_minutes(n),
        "h" => Duration::try_hours(n),
        "d" => Duration::try_days(n),
        other => bail!("unknown duration unit {other:?} in {raw:?}"),
    };
    match duration {
        Some(d) if d.num_days() <= MAX_TOKEN_TTL_DAYS => Ok(d),
        _ => bail!("duration too long (max {MAX_TOKEN_TTL_DAYS}d): {raw:?}"),
    }
}
