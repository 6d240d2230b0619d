//! Config command implementation.

use esorm_gateway::EsConfig;

/// Prints the effective configuration, password excluded.
pub fn run(config: &EsConfig) {
    println!("url:                {}", config.url);
    println!("nodes:              {}", config.addresses().join(", "));
    println!(
        "username:           {}",
        if config.username.is_empty() { "-" } else { config.username.as_str() }
    );
    println!("auth:               {}", config.has_credentials());
    println!("index prefix:       {}", config.index_prefix);
    println!("shards / replicas:  {} / {}", config.number_of_shards, config.number_of_replicas);
    println!("buffer size:        {}", config.buffer_size);
    println!("bulk size:          {}", config.bulk_size);
    println!("warn time:          {} ms", config.warn_time.as_millis());
    println!("request timeout:    {} ms", config.request_timeout.as_millis());
}
