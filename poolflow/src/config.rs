//! Provisioning configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::ProvisionError;
use crate::poller::{BackoffStrategy, JitterStrategy};

/// Settings shared by every node-pool task of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Regional endpoint template; `{region}` is replaced by the region id.
    #[serde(default = "default_endpoint_format")]
    pub endpoint_format: String,
    /// System disk category for new instances.
    #[serde(default = "default_system_disk_category")]
    pub system_disk_category: String,
    /// Image used by scaling configurations.
    #[serde(default = "default_image_id")]
    pub image_id: String,
    /// Prefix of generated scaling group names.
    #[serde(default = "default_scaling_group_name_prefix")]
    pub scaling_group_name_prefix: String,
    /// Lifecycle state counted as ready; `None` counts every instance.
    #[serde(default = "default_lifecycle_state")]
    pub lifecycle_state: Option<String>,
    /// Readiness polling settings.
    #[serde(default)]
    pub poll: PollConfig,
}

fn default_endpoint_format() -> String {
    "ess.{region}.aliyuncs.com".to_string()
}

fn default_system_disk_category() -> String {
    "cloud_efficiency".to_string()
}

fn default_image_id() -> String {
    "centos_7_04_64_20G_alibase_201701015.vhd".to_string()
}

fn default_scaling_group_name_prefix() -> String {
    "asg".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_lifecycle_state() -> Option<String> {
    Some("InService".to_string())
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            endpoint_format: default_endpoint_format(),
            system_disk_category: default_system_disk_category(),
            image_id: default_image_id(),
            scaling_group_name_prefix: default_scaling_group_name_prefix(),
            lifecycle_state: default_lifecycle_state(),
            poll: PollConfig::default(),
        }
    }
}

impl ProvisionerConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ProvisionError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ProvisionError::Config(format!("invalid provisioner config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProvisionError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::Config(format!("could not read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&contents)
    }

    /// Sets the endpoint template.
    #[must_use]
    pub fn with_endpoint_format(mut self, format: impl Into<String>) -> Self {
        self.endpoint_format = format.into();
        self
    }

    /// Sets the system disk category.
    #[must_use]
    pub fn with_system_disk_category(mut self, category: impl Into<String>) -> Self {
        self.system_disk_category = category.into();
        self
    }

    /// Sets the image id.
    #[must_use]
    pub fn with_image_id(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = image_id.into();
        self
    }

    /// Sets the polling settings.
    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Returns the endpoint for a region.
    #[must_use]
    pub fn endpoint(&self, region_id: &str) -> String {
        self.endpoint_format.replace("{region}", region_id)
    }

    /// Checks the settings for values the provisioner cannot work with.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.scaling_group_name_prefix.is_empty() {
            return Err(ProvisionError::Config(
                "scaling_group_name_prefix must not be empty".to_string(),
            ));
        }
        if self.image_id.is_empty() {
            return Err(ProvisionError::Config("image_id must not be empty".to_string()));
        }
        self.poll.validate()
    }
}

/// Readiness polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Maximum describe calls per scaling group.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Base delay between describe calls in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Delay cap in milliseconds.
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

const fn default_max_attempts() -> usize {
    30
}

const fn default_interval_ms() -> u64 {
    20_000
}

const fn default_max_interval_ms() -> u64 {
    60_000
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            backoff: BackoffStrategy::default(),
            jitter: JitterStrategy::default(),
        }
    }
}

impl PollConfig {
    /// Creates polling settings with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base interval.
    #[must_use]
    pub const fn with_interval_ms(mut self, interval: u64) -> Self {
        self.interval_ms = interval;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub const fn with_max_interval_ms(mut self, interval: u64) -> Self {
        self.max_interval_ms = interval;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub const fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub const fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Upper bound on the time spent sleeping between attempts.
    #[must_use]
    pub fn max_wait(&self) -> std::time::Duration {
        let sleeps = u64::try_from(self.max_attempts.saturating_sub(1)).unwrap_or(u64::MAX);
        std::time::Duration::from_millis(sleeps.saturating_mul(self.max_interval_ms.max(self.interval_ms)))
    }

    fn validate(&self) -> Result<(), ProvisionError> {
        if self.max_attempts == 0 {
            return Err(ProvisionError::Config("poll.max_attempts must be at least 1".to_string()));
        }
        if self.max_interval_ms < self.interval_ms {
            return Err(ProvisionError::Config(format!(
                "poll.max_interval_ms ({}) is below poll.interval_ms ({})",
                self.max_interval_ms, self.interval_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = ProvisionerConfig::default();
        assert_eq!(config.system_disk_category, "cloud_efficiency");
        assert_eq!(config.scaling_group_name_prefix, "asg");
        assert_eq!(config.lifecycle_state.as_deref(), Some("InService"));
        assert_eq!(config.poll.max_attempts, 30);
        assert_eq!(config.poll.interval_ms, 20_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint() {
        let config = ProvisionerConfig::default();
        assert_eq!(config.endpoint("cn-hangzhou"), "ess.cn-hangzhou.aliyuncs.com");

        let config = config.with_endpoint_format("localhost:8080");
        assert_eq!(config.endpoint("cn-hangzhou"), "localhost:8080");
    }

    #[test]
    fn test_instance_builders() {
        let config = ProvisionerConfig::new()
            .with_system_disk_category("cloud_essd")
            .with_image_id("ubuntu_22_04_x64");
        assert_eq!(config.system_disk_category, "cloud_essd");
        assert_eq!(config.image_id, "ubuntu_22_04_x64");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ProvisionerConfig::from_json_str(
            r#"{"image_id": "ubuntu_22", "poll": {"max_attempts": 5, "jitter": "full"}}"#,
        )
        .unwrap();

        assert_eq!(config.image_id, "ubuntu_22");
        assert_eq!(config.system_disk_category, "cloud_efficiency");
        assert_eq!(config.poll.max_attempts, 5);
        assert_eq!(config.poll.interval_ms, 20_000);
        assert_eq!(config.poll.jitter, JitterStrategy::Full);
        assert_eq!(config.poll.backoff, BackoffStrategy::Constant);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = ProvisionerConfig::from_json_str(r#"{"poll": {"max_attempts": 0}}"#).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_rejects_inverted_intervals() {
        let config = ProvisionerConfig::default()
            .with_poll(PollConfig::new().with_interval_ms(500).with_max_interval_ms(100));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = ProvisionerConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"system_disk_category": "cloud_ssd"}}"#).unwrap();

        let config = ProvisionerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.system_disk_category, "cloud_ssd");
    }

    #[test]
    fn test_from_missing_file() {
        let err = ProvisionerConfig::from_file("/nonexistent/poolflow.json").unwrap_err();
        assert!(err.to_string().contains("could not read"));
    }

    #[test]
    fn test_max_wait() {
        let poll = PollConfig::new()
            .with_max_attempts(4)
            .with_interval_ms(10)
            .with_max_interval_ms(50);
        assert_eq!(poll.max_wait(), Duration::from_millis(150));
    }
}
