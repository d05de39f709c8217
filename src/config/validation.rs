use crate::config::types::{ApiConfig, Config, CrawlerConfig, OutputConfig, RetryConfig};
use crate::state::EntityKind;
use crate::ConfigError;
use url::Url;

/// Largest page the GraphQL API serves
const MAX_PAGE_SIZE: u32 = 100;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_seed(&config.seed, &config.seed_kind)?;
    validate_api_config(&config.api)?;
    validate_retry_config(&config.retry)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_seed(seed: &str, seed_kind: &str) -> Result<(), ConfigError> {
    if seed.trim().is_empty() {
        return Err(ConfigError::Validation("seed cannot be empty".to_string()));
    }

    match EntityKind::from_label(seed_kind) {
        Some(_) => Ok(()),
        None => Err(ConfigError::Validation(format!(
            "seed-kind '{}' is not a known entity kind",
            seed_kind
        ))),
    }
}

/// Validates API access configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let endpoint = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid endpoint: {}", e)))?;

    if endpoint.scheme() != "https" && endpoint.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "endpoint '{}' must use http or https",
            config.endpoint
        )));
    }

    if config.tokens.is_empty() {
        return Err(ConfigError::Validation(
            "at least one API token is required".to_string(),
        ));
    }

    if config.tokens.iter().any(|t| t.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "API tokens cannot be empty".to_string(),
        ));
    }

    if config.check_every < 1 {
        return Err(ConfigError::Validation(format!(
            "check-every must be >= 1, got {}",
            config.check_every
        )));
    }

    if config.page_size < 1 || config.page_size > MAX_PAGE_SIZE {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, config.page_size
        )));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max-delay-ms ({}) must be >= base-delay-ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    let positive = [
        ("relatives-cap", config.relatives_cap as u64),
        ("total-count-limit", config.total_count_limit),
        ("max-value-size", config.max_value_size as u64),
        ("node-timeout-secs", config.node_timeout_secs),
        (
            "max-concurrent-relations",
            config.max_concurrent_relations as u64,
        ),
    ];

    for (name, value) in positive {
        if value < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1, got {}",
                name, value
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
