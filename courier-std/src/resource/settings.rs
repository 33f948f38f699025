//! Connection pool settings.

use courier_core::ResourceError;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Settings bound to a [`Database`](super::Database) by `configure`.
///
/// Deserializes from any serde format; the acquire timeout is given in
/// milliseconds:
///
/// ```json
/// { "url": "postgres://localhost/app", "max_size": 16, "min_idle": 2, "acquire_timeout_ms": 2500 }
/// ```
///
/// Missing fields take their [`Default`] values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Driver-specific connection string.
    pub url: String,
    /// Upper bound on open connections.
    pub max_size: usize,
    /// Connections opened eagerly by `initialize`.
    pub min_idle: usize,
    /// How long `get_connection` waits for capacity.
    #[serde(rename = "acquire_timeout_ms", deserialize_with = "duration_from_millis")]
    pub acquire_timeout: Duration,
}

impl PoolSettings {
    /// Default settings for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the maximum pool size.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the number of connections opened eagerly.
    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// Set the acquire timeout.
    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Check the settings for consistency.
    ///
    /// # Errors
    ///
    /// [`ResourceError::InvalidSettings`] for an empty url, a `max_size`
    /// of zero or beyond the semaphore limit, or a `min_idle` larger than
    /// `max_size`.
    pub fn validate(&self) -> Result<(), ResourceError> {
        if self.url.trim().is_empty() {
            return Err(ResourceError::InvalidSettings("url must not be empty".into()));
        }
        if self.max_size == 0 {
            return Err(ResourceError::InvalidSettings("max_size must be at least 1".into()));
        }
        if self.max_size > Semaphore::MAX_PERMITS {
            return Err(ResourceError::InvalidSettings(format!(
                "max_size must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.min_idle > self.max_size {
            return Err(ResourceError::InvalidSettings(format!(
                "min_idle ({}) exceeds max_size ({})",
                self.min_idle, self.max_size
            )));
        }
        Ok(())
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_size: 10,
            min_idle: 0,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

fn duration_from_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let settings: PoolSettings =
            serde_json::from_str(r#"{ "url": "mem://widgets", "acquire_timeout_ms": 250 }"#).unwrap();

        assert_eq!(settings.url, "mem://widgets");
        assert_eq!(settings.max_size, 10);
        assert_eq!(settings.min_idle, 0);
        assert_eq!(settings.acquire_timeout, Duration::from_millis(250));
        settings.validate().unwrap();
    }

    #[test]
    fn rejects_inconsistent_settings() {
        assert!(PoolSettings::default().validate().is_err());
        assert!(PoolSettings::new("mem://").with_max_size(0).validate().is_err());

        let err = PoolSettings::new("mem://")
            .with_max_size(2)
            .with_min_idle(3)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("min_idle (3) exceeds max_size (2)"));
    }
}
