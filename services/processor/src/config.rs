use anyhow::Context;
use serde::Deserialize;
use shared::constants::*;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::PoolError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub pool: PoolConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub metrics_port: u16,
}

/// What a worker does with the item it is holding when shutdown begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InFlightPolicy {
    /// Finish the simulated work under the per-item deadline
    #[default]
    Finish,
    /// Interrupt the simulated work and fail the item as cancelled
    Abort,
}

impl FromStr for InFlightPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "finish" => Ok(InFlightPolicy::Finish),
            "abort" => Ok(InFlightPolicy::Abort),
            other => anyhow::bail!("unknown in-flight policy: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub item_timeout_ms: u64,
    pub simulated_latency_ms: u64,
    pub persist_timeout_ms: u64,
    pub in_flight_policy: InFlightPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            item_timeout_ms: DEFAULT_ITEM_TIMEOUT_MS,
            simulated_latency_ms: DEFAULT_SIMULATED_LATENCY_MS,
            persist_timeout_ms: DEFAULT_PERSIST_TIMEOUT_MS,
            in_flight_policy: InFlightPolicy::default(),
        }
    }
}

impl PoolConfig {
    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }

    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.worker_count == 0 {
            return Err(PoolError::InvalidConfig("worker_count must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(PoolError::InvalidConfig("queue_capacity must be at least 1".into()));
        }
        if self.item_timeout_ms == 0 {
            return Err(PoolError::InvalidConfig("item_timeout_ms must be positive".into()));
        }
        if self.persist_timeout_ms == 0 {
            return Err(PoolError::InvalidConfig("persist_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub stream: String,
    pub group: String,
    pub consumer: String,
    pub read_count: usize,
    pub block_ms: usize,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            pool: PoolConfig {
                worker_count: env::var("PROCESSOR_WORKER_COUNT")
                    .unwrap_or_else(|_| DEFAULT_WORKER_COUNT.to_string())
                    .parse()?,
                queue_capacity: env::var("PROCESSOR_QUEUE_CAPACITY")
                    .unwrap_or_else(|_| DEFAULT_QUEUE_CAPACITY.to_string())
                    .parse()?,
                item_timeout_ms: env::var("PROCESSOR_ITEM_TIMEOUT_MS")
                    .unwrap_or_else(|_| DEFAULT_ITEM_TIMEOUT_MS.to_string())
                    .parse()?,
                simulated_latency_ms: env::var("PROCESSOR_LATENCY_MS")
                    .unwrap_or_else(|_| DEFAULT_SIMULATED_LATENCY_MS.to_string())
                    .parse()?,
                persist_timeout_ms: env::var("PROCESSOR_PERSIST_TIMEOUT_MS")
                    .unwrap_or_else(|_| DEFAULT_PERSIST_TIMEOUT_MS.to_string())
                    .parse()?,
                in_flight_policy: env::var("PROCESSOR_IN_FLIGHT_POLICY")
                    .unwrap_or_else(|_| "finish".to_string())
                    .parse()?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
                pool_size: env::var("DATABASE_POOL_SIZE")
                    .unwrap_or_else(|_| "25".to_string())
                    .parse()?,
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
                stream: env::var("TRANSACTIONS_STREAM")
                    .unwrap_or_else(|_| TRANSACTIONS_STREAM.to_string()),
                group: env::var("TRANSACTIONS_GROUP")
                    .unwrap_or_else(|_| TRANSACTIONS_GROUP.to_string()),
                consumer: env::var("TRANSACTIONS_CONSUMER")
                    .unwrap_or_else(|_| format!("processor-{}", std::process::id())),
                read_count: env::var("TRANSACTIONS_READ_COUNT")
                    .unwrap_or_else(|_| "32".to_string())
                    .parse()?,
                block_ms: env::var("TRANSACTIONS_BLOCK_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()?,
            },
            metrics_port: env::var("PROCESSOR_METRICS_PORT")
                .unwrap_or_else(|_| "9091".to_string())
                .parse()?,
        })
    }
}
