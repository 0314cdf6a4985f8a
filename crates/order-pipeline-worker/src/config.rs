use crate::handlers::{DEFAULT_CONFIRMATION_WORK_MS, DEFAULT_PAYMENT_DELAY_MS};
use crate::retry::{RetryBackoff, DEFAULT_FAILURE_RATE, DEFAULT_MAX_ATTEMPTS};
use order_pipeline_core::{Amount, MAX_ORDER_AMOUNT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub workers: WorkersConfig,
    pub retry: RetryConfig,
    pub orders: OrdersConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub concurrency: usize,
    pub graceful_shutdown_timeout_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        WorkersConfig {
            concurrency: 4,
            graceful_shutdown_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub failure_rate: f64,
    /// Base retry delay; 0 re-dispatches retries immediately
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            failure_rate: DEFAULT_FAILURE_RATE,
            backoff_ms: 0,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> RetryBackoff {
        RetryBackoff::new(self.backoff_ms, self.max_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdersConfig {
    pub payment_delay_ms: u64,
    pub confirmation_work_ms: u64,
    pub max_amount: Amount,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        OrdersConfig {
            payment_delay_ms: DEFAULT_PAYMENT_DELAY_MS,
            confirmation_work_ms: DEFAULT_CONFIRMATION_WORK_MS,
            max_amount: MAX_ORDER_AMOUNT,
        }
    }
}

impl OrdersConfig {
    pub fn confirmation_work(&self) -> Duration {
        Duration::from_millis(self.confirmation_work_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers.concurrency == 0 {
            anyhow::bail!("workers.concurrency must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.retry.failure_rate) {
            anyhow::bail!(
                "retry.failure_rate must be between 0 and 1, got {}",
                self.retry.failure_rate
            );
        }
        if !self.orders.max_amount.is_positive() {
            anyhow::bail!("orders.max_amount must be positive");
        }
        Ok(())
    }

    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.workers.graceful_shutdown_timeout_secs)
    }
}
