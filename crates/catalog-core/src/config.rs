//! Configuration module
//!
//! Worker, storage, database and broadcast settings, read from the environment (with
//! `.env` support through `dotenvy`).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const DB_MAX_CONNECTIONS: u32 = 20;
const DB_TIMEOUT_SECS: u64 = 30;
const STORAGE_PATH: &str = "./storage";
const JOB_QUEUE_MAX_WORKERS: usize = 4;
const JOB_QUEUE_SIZE: usize = 1000;
const JOB_TRIES: u32 = 3;
const JOB_MAX_EXCEPTIONS: u32 = 3;
const JOB_TIMEOUT_SECS: u64 = 300;
const JOB_RETRY_BACKOFF_MS: u64 = 1000;
const BROADCAST_TIMEOUT_SECS: u64 = 10;
const BROADCAST_TOPIC_CAPACITY: usize = 256;
const WORKER_POLL_INTERVAL_MS: u64 = 5000;

/// Where lifecycle messages go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BroadcastBackend {
    /// In-process `tokio::sync::broadcast` topic.
    Topic,
    /// JSON POST to an external relay.
    Http,
}

impl FromStr for BroadcastBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "topic" | "memory" => Ok(BroadcastBackend::Topic),
            "http" | "webhook" => Ok(BroadcastBackend::Http),
            _ => Err(anyhow::anyhow!("Invalid BROADCAST_BACKEND: {}", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub storage_path: PathBuf,
    // Job queue
    pub job_queue_max_workers: usize,
    pub job_queue_size: usize,
    pub job_tries: u32,
    pub job_max_exceptions: u32,
    pub job_timeout_seconds: u64,
    pub job_retry_backoff_ms: u64,
    /// How often `catalog worker` looks for uploads submitted by other processes.
    pub worker_poll_interval_ms: u64,
    // Broadcast
    pub broadcast_backend: BroadcastBackend,
    pub broadcast_url: Option<String>,
    pub broadcast_secret: Option<String>,
    pub broadcast_timeout_seconds: u64,
    pub broadcast_topic_capacity: usize,
    // Logging
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_or = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let config = Config {
            environment,
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: parse_number(
                "DB_MAX_CONNECTIONS",
                &parse_or("DB_MAX_CONNECTIONS", &DB_MAX_CONNECTIONS.to_string()),
            )?,
            db_timeout_seconds: parse_number(
                "DB_TIMEOUT_SECONDS",
                &parse_or("DB_TIMEOUT_SECONDS", &DB_TIMEOUT_SECS.to_string()),
            )?,
            storage_path: PathBuf::from(parse_or("STORAGE_PATH", STORAGE_PATH)),
            job_queue_max_workers: parse_number(
                "JOB_QUEUE_MAX_WORKERS",
                &parse_or("JOB_QUEUE_MAX_WORKERS", &JOB_QUEUE_MAX_WORKERS.to_string()),
            )?,
            job_queue_size: parse_number(
                "JOB_QUEUE_SIZE",
                &parse_or("JOB_QUEUE_SIZE", &JOB_QUEUE_SIZE.to_string()),
            )?,
            job_tries: parse_number("JOB_TRIES", &parse_or("JOB_TRIES", &JOB_TRIES.to_string()))?,
            job_max_exceptions: parse_number(
                "JOB_MAX_EXCEPTIONS",
                &parse_or("JOB_MAX_EXCEPTIONS", &JOB_MAX_EXCEPTIONS.to_string()),
            )?,
            job_timeout_seconds: parse_number(
                "JOB_TIMEOUT_SECONDS",
                &parse_or("JOB_TIMEOUT_SECONDS", &JOB_TIMEOUT_SECS.to_string()),
            )?,
            job_retry_backoff_ms: parse_number(
                "JOB_RETRY_BACKOFF_MS",
                &parse_or("JOB_RETRY_BACKOFF_MS", &JOB_RETRY_BACKOFF_MS.to_string()),
            )?,
            worker_poll_interval_ms: parse_number(
                "WORKER_POLL_INTERVAL_MS",
                &parse_or("WORKER_POLL_INTERVAL_MS", &WORKER_POLL_INTERVAL_MS.to_string()),
            )?,
            broadcast_backend: parse_or("BROADCAST_BACKEND", "topic").parse()?,
            broadcast_url: lookup("BROADCAST_URL").filter(|s| !s.trim().is_empty()),
            broadcast_secret: lookup("BROADCAST_SECRET").filter(|s| !s.is_empty()),
            broadcast_timeout_seconds: parse_number(
                "BROADCAST_TIMEOUT_SECONDS",
                &parse_or(
                    "BROADCAST_TIMEOUT_SECONDS",
                    &BROADCAST_TIMEOUT_SECS.to_string(),
                ),
            )?,
            broadcast_topic_capacity: parse_number(
                "BROADCAST_TOPIC_CAPACITY",
                &parse_or(
                    "BROADCAST_TOPIC_CAPACITY",
                    &BROADCAST_TOPIC_CAPACITY.to_string(),
                ),
            )?,
            log_json: parse_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.job_queue_max_workers == 0 || self.job_queue_size == 0 {
            return Err(anyhow::anyhow!(
                "JOB_QUEUE_MAX_WORKERS and JOB_QUEUE_SIZE must be greater than zero"
            ));
        }

        if self.job_tries == 0 || self.job_max_exceptions == 0 {
            return Err(anyhow::anyhow!(
                "JOB_TRIES and JOB_MAX_EXCEPTIONS must be greater than zero"
            ));
        }

        if self.job_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("JOB_TIMEOUT_SECONDS must be greater than zero"));
        }

        if self.worker_poll_interval_ms == 0 {
            return Err(anyhow::anyhow!(
                "WORKER_POLL_INTERVAL_MS must be greater than zero"
            ));
        }

        if self.broadcast_backend == BroadcastBackend::Http && self.broadcast_url.is_none() {
            return Err(anyhow::anyhow!(
                "BROADCAST_BACKEND=http requires BROADCAST_URL to be set"
            ));
        }

        if self.broadcast_topic_capacity == 0 {
            return Err(anyhow::anyhow!(
                "BROADCAST_TOPIC_CAPACITY must be greater than zero"
            ));
        }

        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, anyhow::Error> {
    value
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got {:?}", key, value))
}
