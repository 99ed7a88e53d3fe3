use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_WAIT_SECS: i32 = 20;
/// Long enough to cover one chunk at the full external timeout
pub const DEFAULT_VISIBILITY_SECS: i32 = 960;
pub const DEFAULT_MAX_MESSAGES: i32 = 10;

/// Chunk notification queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// SQS queue URL; chunks are processed in-process when unset
    pub queue_url: Option<String>,
    /// Custom SQS endpoint (LocalStack, ElasticMQ)
    pub endpoint: Option<String>,
    pub region: String,
    pub wait_secs: i32,
    pub visibility_secs: i32,
    pub max_messages: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_url: None,
            endpoint: None,
            region: "us-east-1".to_string(),
            wait_secs: DEFAULT_WAIT_SECS,
            visibility_secs: DEFAULT_VISIBILITY_SECS,
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", name, value)),
        Err(_) => Ok(None),
    }
}

impl QueueConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            queue_url: env::var("CHUNK_QUEUE_URL").ok(),
            endpoint: env::var("SQS_ENDPOINT").ok(),
            region: env::var("AWS_REGION")
                .or_else(|_| env::var("S3_REGION"))
                .unwrap_or(defaults.region),
            wait_secs: parse_env("QUEUE_WAIT_SECS")?.unwrap_or(defaults.wait_secs),
            visibility_secs: parse_env("QUEUE_VISIBILITY_SECS")?
                .unwrap_or(defaults.visibility_secs),
            max_messages: parse_env("QUEUE_MAX_MESSAGES")?.unwrap_or(defaults.max_messages),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0..=20).contains(&self.wait_secs) {
            anyhow::bail!("QUEUE_WAIT_SECS must be between 0 and 20");
        }
        if !(1..=10).contains(&self.max_messages) {
            anyhow::bail!("QUEUE_MAX_MESSAGES must be between 1 and 10");
        }
        if self.visibility_secs <= 0 {
            anyhow::bail!("QUEUE_VISIBILITY_SECS must be positive");
        }
        Ok(())
    }
}
