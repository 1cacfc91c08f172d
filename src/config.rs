use std::env;
use std::time::Duration;

use anyhow::Context;

use crate::models::WorkingHours;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtractorProvider {
    None,
    Ollama,
    Groq,
}

impl ExtractorProvider {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" | "rules" => Ok(ExtractorProvider::None),
            "ollama" => Ok(ExtractorProvider::Ollama),
            "groq" => Ok(ExtractorProvider::Groq),
            other => anyhow::bail!("unknown EXTRACTOR_PROVIDER: {other}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub working_hours: WorkingHours,
    pub horizon_days: i64,
    pub session_ttl: Duration,
    pub extractor_provider: ExtractorProvider,
    pub ollama_url: String,
    pub ollama_model: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub extractor_timeout: Duration,
    pub extractor_cache_size: usize,
    pub notify_webhook_url: String,
    pub seed_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "advising.db".to_string(),
            working_hours: WorkingHours::default(),
            horizon_days: 30,
            session_ttl: Duration::from_secs(30 * 60),
            extractor_provider: ExtractorProvider::None,
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            groq_api_key: String::new(),
            groq_model: "llama-3.1-8b-instant".to_string(),
            extractor_timeout: Duration::from_secs(5),
            extractor_cache_size: 256,
            notify_webhook_url: String::new(),
            seed_path: None,
        }
    }
}

impl AppConfig {
    /// Reads the environment. Unset values fall back to defaults; malformed
    /// working hours or provider names are errors.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let start_hour = parsed("WORK_START_HOUR", defaults.working_hours.start_hour)?;
        let end_hour = parsed("WORK_END_HOUR", defaults.working_hours.end_hour)?;
        let days = match env::var("WORK_DAYS") {
            Ok(v) if !v.trim().is_empty() => WorkingHours::parse_days(&v)?,
            _ => defaults.working_hours.days.clone(),
        };
        let working_hours = WorkingHours::new(start_hour, end_hour, days)?;

        let horizon_days: i64 = parsed("BOOKING_HORIZON_DAYS", defaults.horizon_days)?;
        anyhow::ensure!(horizon_days > 0, "BOOKING_HORIZON_DAYS must be positive");

        Ok(Self {
            port: parsed("PORT", defaults.port)?,
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            working_hours,
            horizon_days,
            session_ttl: Duration::from_secs(60 * parsed("SESSION_TTL_MINUTES", 30u64)?),
            extractor_provider: ExtractorProvider::parse(
                &env::var("EXTRACTOR_PROVIDER").unwrap_or_default(),
            )?,
            ollama_url: env::var("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_model: env::var("GROQ_MODEL").unwrap_or(defaults.groq_model),
            extractor_timeout: Duration::from_secs(parsed("EXTRACTOR_TIMEOUT_SECS", 5u64)?),
            extractor_cache_size: parsed("EXTRACTOR_CACHE_SIZE", defaults.extractor_cache_size)?,
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").unwrap_or_default(),
            seed_path: env::var("SEED_PATH").ok().filter(|p| !p.trim().is_empty()),
        })
    }
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {v:?}")),
        _ => Ok(default),
    }
}
