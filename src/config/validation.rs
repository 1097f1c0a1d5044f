//! Configuration validation, split into warnings (non-fatal) and errors.

use super::types::AppConfig;

/// Result of validating an [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Validate an [`AppConfig`], mirroring `API_KEY_MISSING` /
/// `INVALID_REQUEST` categories as pre-flight warnings/errors.
pub fn validate_config(config: &AppConfig) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    if config.provider.api_key.is_none() {
        result = result.with_warning(
            ValidationIssue::new("provider.api_key", "no provider API key configured")
                .with_suggestion("set AGENTCORE_API_KEY or call AgentBuilder::api_key(..)"),
        );
    }

    if config.memory.working_capacity == 0 {
        result = result.with_error(ValidationIssue::new(
            "memory.working_capacity",
            "working memory capacity must be at least 1",
        ));
    }

    if !(0.0..=1.0).contains(&config.memory.episodic_threshold) {
        result = result.with_error(ValidationIssue::new(
            "memory.episodic_threshold",
            "episodic promotion threshold must be within [0.0, 1.0]",
        ));
    }

    if config.retry.max_attempts == 0 {
        result = result.with_warning(ValidationIssue::new(
            "retry.max_attempts",
            "retries disabled; transient provider errors will not be retried",
        ));
    }

    if let Err(err) = url::Url::parse(&config.provider.base_url) {
        result = result.with_error(
            ValidationIssue::new("provider.base_url", format!("not a valid URL: {err}"))
                .with_suggestion("set AGENTCORE_BASE_URL to a fully-qualified http(s) URL"),
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_warns_without_api_key() {
        let result = validate_config(&AppConfig::default());
        assert!(result.errors.is_empty());
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn zero_capacity_is_an_error() {
        let mut config = AppConfig::default();
        config.memory.working_capacity = 0;
        let result = validate_config(&config);
        assert!(!result.valid);
    }

    #[test]
    fn malformed_base_url_is_an_error() {
        let mut config = AppConfig::default();
        config.provider.base_url = "not a url".to_string();
        let result = validate_config(&config);
        assert!(!result.valid);
    }
}
