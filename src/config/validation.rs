use crate::config::types::{Config, CrawlerConfig, FilterConfig, OutputConfig, TransportConfig};
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_transport_config(&config.transport)?;
    validate_output_config(&config.output)?;
    validate_filter_config(&config.filter)?;
    Ok(())
}

/// Checks a worker count against an inclusive range
fn validate_pool_size(name: &str, value: usize, max: usize) -> Result<(), ConfigError> {
    if value < 1 || value > max {
        return Err(ConfigError::Validation(format!(
            "{} must be between 1 and {}, got {}",
            name, max, value
        )));
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_pool_size("scrubbers", config.scrubbers, 64)?;
    validate_pool_size("filters", config.filters, 256)?;
    validate_pool_size("fetchers", config.fetchers, 32)?;

    if config.poll_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms must be >= 10ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    Ok(())
}

/// Validates transport configuration
fn validate_transport_config(config: &TransportConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 || config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeouts must be at least one second".to_string(),
        ));
    }

    if let Some(proxy) = &config.proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.root.is_empty() {
        return Err(ConfigError::Validation("root cannot be empty".to_string()));
    }
    Ok(())
}

/// Validates that every pattern compiles
fn validate_filter_config(config: &FilterConfig) -> Result<(), ConfigError> {
    for pattern in &config.patterns {
        Regex::new(pattern)
            .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))?;
    }
    Ok(())
}

/// Validates a seed URL: must parse, carry a host, and use http, https, or ftp
pub fn validate_seed(seed: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

    if !matches!(url.scheme(), "http" | "https" | "ftp") {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use http, https, or ftp",
            seed
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has no host",
            seed
        )));
    }

    Ok(url)
}
