//! Backend connection configuration.

use std::fmt;
use std::time::Duration;
use tracing::{error, info};

/// Configuration for the backend store.
///
/// Set once at startup, then shared read-only (usually behind an `Arc`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsConfig {
    /// Backend URL; comma-separated for multiple nodes.
    pub url: String,
    /// Basic auth user name. Auth is disabled when empty.
    pub username: String,
    /// Basic auth password.
    pub password: String,
    /// Capacity of the batched writer's ingestion buffer.
    pub buffer_size: usize,
    /// Number of buffered entries that triggers an immediate bulk flush.
    pub bulk_size: usize,
    /// Flushes slower than this are logged as warnings. Zero disables it.
    pub warn_time: Duration,
    /// `number_of_shards` for created indices and templates.
    pub number_of_shards: String,
    /// `number_of_replicas` for created indices and templates.
    pub number_of_replicas: String,
    /// Prefix prepended to every registered model's index name.
    pub index_prefix: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// `refresh_interval` applied to model templates (empty to omit).
    pub refresh_interval: String,
}

impl Default for EsConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".into(),
            username: String::new(),
            password: String::new(),
            buffer_size: 10_000,
            bulk_size: 5_000,
            warn_time: Duration::from_millis(1000),
            number_of_shards: "1".into(),
            number_of_replicas: "0".into(),
            index_prefix: "goiot-".into(),
            request_timeout: Duration::from_secs(10),
            refresh_interval: "10ms".into(),
        }
    }
}

/// Keys understood by [`EsConfig::configure`].
pub const CONFIG_KEYS: &[&str] = &[
    "es.url",
    "es.username",
    "es.usename",
    "es.password",
    "es.numberOfShards",
    "es.numberOfReplicas",
    "es.buffersize",
    "es.bulksize",
    "es.warntime",
    "es.prefix",
    "es.timeout",
];

impl EsConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backend URL (comma-separated for several nodes).
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets basic auth credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Sets the ingestion buffer capacity.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the bulk flush threshold.
    #[must_use]
    pub fn with_bulk_size(mut self, size: usize) -> Self {
        self.bulk_size = size;
        self
    }

    /// Sets the slow flush warning threshold.
    #[must_use]
    pub fn with_warn_time(mut self, warn_time: Duration) -> Self {
        self.warn_time = warn_time;
        self
    }

    /// Sets shard and replica counts.
    #[must_use]
    pub fn with_shards(mut self, shards: impl Into<String>, replicas: impl Into<String>) -> Self {
        self.number_of_shards = shards.into();
        self.number_of_replicas = replicas.into();
        self
    }

    /// Sets the index prefix.
    #[must_use]
    pub fn with_index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.index_prefix = prefix.into();
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns the configured node addresses.
    pub fn addresses(&self) -> Vec<&str> {
        self.url
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(|addr| addr.trim_end_matches('/'))
            .collect()
    }

    /// Returns true when basic auth should be sent.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }

    /// Applies settings through a key/callback registration function.
    ///
    /// `register` is called once per known key with a setter; it invokes the
    /// setter when it has a value for that key. Unparseable numbers are
    /// logged and leave the current value in place.
    ///
    /// ```
    /// use esorm_gateway::EsConfig;
    /// use std::collections::HashMap;
    ///
    /// let props = HashMap::from([("es.bulksize", "200")]);
    /// let mut config = EsConfig::default();
    /// config.configure(|key, set| {
    ///     if let Some(value) = props.get(key) {
    ///         set(value);
    ///     }
    /// });
    /// assert_eq!(config.bulk_size, 200);
    /// ```
    pub fn configure<F>(&mut self, mut register: F)
    where
        F: FnMut(&str, &mut dyn FnMut(&str)),
    {
        register("es.url", &mut |v| self.url = v.to_string());
        register("es.usename", &mut |v| self.username = v.to_string());
        register("es.username", &mut |v| self.username = v.to_string());
        register("es.password", &mut |v| self.password = v.to_string());
        register("es.numberOfShards", &mut |v| {
            self.number_of_shards = v.to_string()
        });
        register("es.numberOfReplicas", &mut |v| {
            self.number_of_replicas = v.to_string()
        });
        register("es.prefix", &mut |v| self.index_prefix = v.to_string());
        register("es.buffersize", &mut |v| {
            if let Some(n) = parse_number("es.buffersize", v) {
                self.buffer_size = n;
            }
        });
        register("es.bulksize", &mut |v| {
            if let Some(n) = parse_number("es.bulksize", v) {
                self.bulk_size = n;
            }
        });
        register("es.warntime", &mut |v| {
            if let Some(ms) = parse_number("es.warntime", v) {
                self.warn_time = Duration::from_millis(ms as u64);
            }
        });
        register("es.timeout", &mut |v| {
            if let Some(ms) = parse_number("es.timeout", v) {
                self.request_timeout = Duration::from_millis(ms as u64);
            }
        });
        info!("es config: {}", self);
    }

    /// Builds a configuration from defaults plus a key lookup.
    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.configure(|key, set| {
            if let Some(value) = lookup(key) {
                set(&value);
            }
        });
        config
    }
}

fn parse_number(key: &str, value: &str) -> Option<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) => Some(n),
        Err(err) => {
            error!("{} error: {}", key, err);
            None
        }
    }
}

impl fmt::Display for EsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[url={}, username={}, bufferSize={}, bulkSize={}, warnTime={}ms, numberOfShards={}, numberOfReplicas={}, prefix={}, timeout={}ms]",
            self.url,
            self.username,
            self.buffer_size,
            self.bulk_size,
            self.warn_time.as_millis(),
            self.number_of_shards,
            self.number_of_replicas,
            self.index_prefix,
            self.request_timeout.as_millis(),
        )
    }
}
