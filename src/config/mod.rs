//! Modular configuration loading, split into focused modules: types,
//! file/env loading, and validation.

mod io;
mod types;
mod validation;

pub use io::{load_config, load_config_from_env};
pub use types::{AppConfig, CacheMode, CacheSettings, MemorySettings, ProviderSettings, RetrySettings};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
