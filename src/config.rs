use anyhow::{bail, Context, Result};
use std::{env, path::PathBuf};

use crate::local::explain::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::provision::DEFAULT_BROKER_URL;

fn default_artifact_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".zonebot")
        .join("artifacts")
}

/// Session broker and diagnostics settings needed by any scrape.
///
/// Broker credentials may be blank here. [`ScraperConfig::require_credentials`]
/// enforces them where a scrape is the whole point of the run.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub broker_url: String,
    pub api_key: String,
    pub project_id: String,
    pub artifact_dir: PathBuf,
}

impl ScraperConfig {
    pub fn from_env(artifact_dir: Option<PathBuf>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let artifact_dir = artifact_dir
            .or_else(|| env::var_os("ZONEBOT_ARTIFACT_DIR").map(PathBuf::from))
            .unwrap_or_else(default_artifact_dir);
        std::fs::create_dir_all(&artifact_dir)
            .with_context(|| format!("cannot create {}", artifact_dir.display()))?;
        let artifact_dir = dunce::canonicalize(&artifact_dir)?;

        Ok(Self {
            broker_url: env::var("BROWSERBASE_API_URL")
                .unwrap_or_else(|_| DEFAULT_BROKER_URL.to_string()),
            api_key: env::var("BROWSERBASE_API_KEY").unwrap_or_default(),
            project_id: env::var("BROWSERBASE_PROJECT_ID").unwrap_or_default(),
            artifact_dir,
        })
    }

    pub fn require_credentials(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            bail!("BROWSERBASE_API_KEY must be set");
        }
        if self.project_id.trim().is_empty() {
            bail!("BROWSERBASE_PROJECT_ID must be set");
        }
        Ok(())
    }
}

/// Local store and generation settings for the database tier.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub database_url: String,
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub model: String,
}

impl LocalConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            openrouter_api_key: env::var("OPENROUTER_API_KEY")
                .context("OPENROUTER_API_KEY must be set")?,
            openrouter_base_url: env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: env::var("OPENROUTER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        })
    }
}

pub fn port_from_env() -> Result<u16> {
    env::var("PORT")
        .unwrap_or_else(|_| "8000".to_string())
        .parse()
        .context("PORT must be a valid number")
}
