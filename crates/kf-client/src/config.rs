//! Client configuration
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```yaml
//! retry:
//!   maxAttempts: 5
//!   initialBackoff: 20ms
//!   maxBackoff: 2s
//! upsertLookup: list
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Configuration shared by every resource client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Retry policy for conflicting writes
    #[serde(default)]
    pub retry: RetryPolicy,

    /// How upsert looks for an existing object
    #[serde(default)]
    pub upsert_lookup: UpsertLookup,
}

impl ClientConfig {
    /// Parse and validate a YAML configuration
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations a client cannot run with
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the upsert lookup strategy
    pub fn with_upsert_lookup(mut self, lookup: UpsertLookup) -> Self {
        self.upsert_lookup = lookup;
        self
    }
}

/// Bounded retry policy for read/modify/write loops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum attempts including the first; `None` retries forever
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,

    /// Delay before the first retry
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Upper bound for the doubling delay
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

fn default_max_attempts() -> Option<u32> {
    Some(10)
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(10)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(1)
}

impl RetryPolicy {
    /// Retry forever without waiting
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// At most `max_attempts` attempts without waiting between them
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Reject policies that could never attempt anything
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == Some(0) {
            return Err(ClientError::InvalidConfig(
                "retry.maxAttempts must be at least 1".to_string(),
            ));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ClientError::InvalidConfig(
                "retry.maxBackoff must not be smaller than retry.initialBackoff".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether another attempt may follow `attempts` failed ones
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }

    /// Delay before the attempt following `attempts` failed ones
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }
}

/// How upsert finds the currently stored object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertLookup {
    /// Fetch the object by name
    #[default]
    Get,

    /// List with an exact-name field selector and double-check client-side
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = ClientConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.retry.max_attempts, Some(10));
        assert_eq!(config.upsert_lookup, UpsertLookup::Get);
    }

    #[test]
    fn test_parse_full_config() {
        let config = ClientConfig::from_yaml(
            "retry:\n  maxAttempts: 5\n  initialBackoff: 20ms\n  maxBackoff: 2s\nupsertLookup: list\n",
        )
        .unwrap();

        assert_eq!(config.retry.max_attempts, Some(5));
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(20));
        assert_eq!(config.retry.max_backoff, Duration::from_secs(2));
        assert_eq!(config.upsert_lookup, UpsertLookup::List);
    }

    #[test]
    fn test_null_max_attempts_is_unbounded() {
        let config = ClientConfig::from_yaml("retry:\n  maxAttempts: null\n").unwrap();
        assert_eq!(config.retry.max_attempts, None);
        assert!(config.retry.allows_retry(u32::MAX - 1));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = ClientConfig::from_yaml("retry:\n  maxAttempts: 0\n").unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = ClientConfig::from_yaml("retry: [").unwrap_err();
        assert!(matches!(err, ClientError::Serialization(_)));
    }

    #[test]
    fn test_allows_retry() {
        let policy = RetryPolicy::immediate(3);
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: Some(10),
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        };

        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
        assert_eq!(policy.backoff(4), Duration::from_millis(50));
        assert_eq!(policy.backoff(40), Duration::from_millis(50));
    }
}
