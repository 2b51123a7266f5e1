use crate::config::types::{
    BatchFormat, Config, CrawlerConfig, OutputConfig, PartitionConfig, SelectorConfig, SiteConfig,
};
use crate::crawler::planner::check_facet_slugs;
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_site_config(&config.site)?;
    validate_partition_config(&config.partitions)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates pacing and bounding configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.floor_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "floor-delay-ms must be > 0 to avoid zero-wait bursts".to_string(),
        ));
    }

    if config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-ms must be > 0".to_string(),
        ));
    }

    if config.page_cap < 1 {
        return Err(ConfigError::Validation(format!(
            "page-cap must be >= 1, got {}",
            config.page_cap
        )));
    }

    if config.flush_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "flush-threshold must be >= 1, got {}",
            config.flush_threshold
        )));
    }

    if !(config.slowdown_factor > 1.0) {
        return Err(ConfigError::Validation(format!(
            "slowdown-factor must be > 1.0, got {}",
            config.slowdown_factor
        )));
    }

    Ok(())
}

/// Validates site endpoints and selectors
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if base.scheme() != "https" && base.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    for (name, path) in [
        ("listing-path", &config.listing_path),
        ("record-path", &config.record_path),
        ("specs-path", &config.specs_path),
    ] {
        base.join(path)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, path, e)))?;
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    for (name, param) in [
        ("page-param", &config.page_param),
        ("derivative-param", &config.derivative_param),
    ] {
        if param.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    validate_selectors(&config.selectors)
}

/// Validates that every selector parses and the token pattern compiles
fn validate_selectors(selectors: &SelectorConfig) -> Result<(), ConfigError> {
    for css in [
        &selectors.result_item,
        &selectors.item_link,
        &selectors.item_price,
        &selectors.page_count,
    ] {
        Selector::parse(css).map_err(|e| {
            ConfigError::InvalidPattern(format!("Invalid selector '{}': {:?}", css, e))
        })?;
    }

    let pattern = Regex::new(&selectors.token_pattern).map_err(|e| {
        ConfigError::InvalidPattern(format!(
            "Invalid token-pattern '{}': {}",
            selectors.token_pattern, e
        ))
    })?;

    if pattern.captures_len() < 2 {
        return Err(ConfigError::InvalidPattern(format!(
            "token-pattern '{}' must contain a capture group",
            selectors.token_pattern
        )));
    }

    Ok(())
}

/// Validates the partition space definition
fn validate_partition_config(config: &PartitionConfig) -> Result<(), ConfigError> {
    if config.facet_values.is_empty() {
        return Err(ConfigError::Validation(
            "facet-values must contain at least one value".to_string(),
        ));
    }

    for value in &config.facet_values {
        validate_facet_value(value)?;
    }
    check_facet_slugs(config.facet_values.iter().map(String::as_str))?;

    if config.range_step <= 0 {
        return Err(ConfigError::Validation(format!(
            "range-step must be > 0, got {}",
            config.range_step
        )));
    }

    if config.range_end <= config.range_start {
        return Err(ConfigError::Validation(format!(
            "range-end ({}) must be greater than range-start ({})",
            config.range_end, config.range_start
        )));
    }

    for (name, param) in [
        ("facet-param", &config.facet_param),
        ("range-lower-param", &config.range_lower_param),
        ("range-upper-param", &config.range_upper_param),
    ] {
        if param.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}

/// Facet values end up in marker lines and batch names
fn validate_facet_value(value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(
            "facet values cannot be empty".to_string(),
        ));
    }

    if value.contains(',') || value.contains('\n') || value.contains('\r') {
        return Err(ConfigError::Validation(format!(
            "facet value '{}' cannot contain commas or line breaks",
            value
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.state_dir.is_empty() {
        return Err(ConfigError::Validation(
            "state-dir cannot be empty".to_string(),
        ));
    }

    match config.format {
        BatchFormat::Json if config.batch_dir.is_empty() => Err(ConfigError::Validation(
            "batch-dir is required for the json format".to_string(),
        )),
        BatchFormat::Sqlite if config.database_path.is_empty() => Err(ConfigError::Validation(
            "database-path is required for the sqlite format".to_string(),
        )),
        _ => Ok(()),
    }
}
