//! Batched writer configuration.

use esorm_gateway::EsConfig;
use std::time::Duration;

/// Configuration for a [`BatchWriter`](crate::BatchWriter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Capacity of the ingestion buffer. Producers wait when it is full.
    pub buffer_size: usize,
    /// Buffered entries that trigger an immediate flush.
    pub bulk_size: usize,
    /// Interval of the time-triggered flush.
    pub flush_interval: Duration,
    /// Flushes slower than this are logged as warnings. Zero disables it.
    pub warn_time: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            buffer_size: 10_000,
            bulk_size: 5_000,
            flush_interval: Duration::from_secs(5),
            warn_time: Duration::from_millis(1000),
        }
    }
}

impl BatchConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ingestion buffer capacity.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the size-triggered flush threshold.
    #[must_use]
    pub fn with_bulk_size(mut self, size: usize) -> Self {
        self.bulk_size = size;
        self
    }

    /// Sets the time-triggered flush interval.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the slow flush warning threshold.
    #[must_use]
    pub fn with_warn_time(mut self, warn_time: Duration) -> Self {
        self.warn_time = warn_time;
        self
    }

    /// Buffer capacity, at least 1.
    pub(crate) fn capacity(&self) -> usize {
        self.buffer_size.max(1)
    }

    /// Flush threshold, at least 1.
    pub(crate) fn threshold(&self) -> usize {
        self.bulk_size.max(1)
    }

    /// Flush interval, at least 1ms.
    pub(crate) fn period(&self) -> Duration {
        self.flush_interval.max(Duration::from_millis(1))
    }
}

impl From<&EsConfig> for BatchConfig {
    fn from(config: &EsConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            bulk_size: config.bulk_size,
            warn_time: config.warn_time,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_backend_config() {
        let es = EsConfig::new()
            .with_buffer_size(64)
            .with_bulk_size(8)
            .with_warn_time(Duration::from_millis(50));
        let config = BatchConfig::from(&es);

        assert_eq!(config.buffer_size, 64);
        assert_eq!(config.bulk_size, 8);
        assert_eq!(config.warn_time, Duration::from_millis(50));
        assert_eq!(config.flush_interval, Duration::from_secs(5));
    }

    #[test]
    fn degenerate_values_are_clamped() {
        let config = BatchConfig::new()
            .with_buffer_size(0)
            .with_bulk_size(0)
            .with_flush_interval(Duration::ZERO);
        assert_eq!(config.capacity(), 1);
        assert_eq!(config.threshold(), 1);
        assert_eq!(config.period(), Duration::from_millis(1));
    }
}
