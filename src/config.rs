use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

/// S3-compatible bucket for meal photos.
#[derive(Debug, Clone, Deserialize)]
pub struct MinioConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// `None` selects the built-in mock provider.
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

/// Timing of the pending-action pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub separating_delay: Duration,
    pub calculating_delay: Duration,
    /// How long a failed action stays visible.
    pub failure_grace: Duration,
    /// How long a finished action stays listed after its meal is saved.
    pub success_retire: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            separating_delay: Duration::from_millis(2000),
            calculating_delay: Duration::from_millis(4500),
            failure_grace: Duration::from_millis(5000),
            success_retire: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub minio: Option<MinioConfig>,
    pub analysis: AnalysisConfig,
    pub pipeline: PipelineConfig,
    pub food_catalog_path: Option<PathBuf>,
    pub host: String,
    pub port: u16,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(v) => v.parse::<T>().with_context(|| format!("invalid {name}: {v:?}")),
        None => Ok(default),
    }
}

fn millis(name: &str, default: Duration) -> anyhow::Result<Duration> {
    Ok(Duration::from_millis(parsed(name, default.as_millis() as u64)?))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            secret: var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "sugarscore".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "sugarscore-users".into()),
        };

        let minio = match var("MINIO_ENDPOINT") {
            Some(endpoint) => Some(MinioConfig {
                endpoint,
                bucket: var("MINIO_BUCKET").unwrap_or_else(|| "meal-images".into()),
                access_key: var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY must be set")?,
                secret_key: var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY must be set")?,
            }),
            None => None,
        };

        let analysis = AnalysisConfig {
            endpoint: var("ANALYSIS_ENDPOINT"),
            timeout: Duration::from_secs(parsed("ANALYSIS_TIMEOUT_SECS", 60u64)?),
        };

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            separating_delay: millis("PIPELINE_SEPARATING_DELAY_MS", defaults.separating_delay)?,
            calculating_delay: millis("PIPELINE_CALCULATING_DELAY_MS", defaults.calculating_delay)?,
            failure_grace: millis("PIPELINE_FAILURE_GRACE_MS", defaults.failure_grace)?,
            success_retire: millis("PIPELINE_SUCCESS_RETIRE_MS", defaults.success_retire)?,
        };

        Ok(Self {
            database_url: var("DATABASE_URL"),
            jwt,
            minio,
            analysis,
            pipeline,
            food_catalog_path: var("FOOD_CATALOG_PATH").map(PathBuf::from),
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed("APP_PORT", 8080u16)?,
        })
    }

    /// Configuration for tests and local runs: no database, no bucket,
    /// mock analysis.
    pub fn local(jwt_secret: &str) -> Self {
        Self {
            database_url: None,
            jwt: JwtConfig {
                secret: jwt_secret.into(),
                issuer: "sugarscore".into(),
                audience: "sugarscore-users".into(),
            },
            minio: None,
            analysis: AnalysisConfig {
                endpoint: None,
                timeout: Duration::from_secs(60),
            },
            pipeline: PipelineConfig::default(),
            food_catalog_path: None,
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}
