//! Configuration loading from environment and optional config file.

use secrecy::SecretString;

use super::types::AppConfig;
use crate::error::Result;

/// Load configuration, preferring a `config.toml`/`config.json` in the
/// current directory (via the `config` crate's layered sources) and falling
/// back to environment variables (loaded through `dotenvy` first).
pub fn load_config() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut builder = config::Config::builder();
    if let Some(user_config_dir) = user_config_path() {
        builder = builder.add_source(
            config::File::from(user_config_dir.join("config")).required(false),
        );
    }
    let builder = builder
        .add_source(config::File::with_name("config").required(false))
        .add_source(config::Environment::with_prefix("AGENTCORE").separator("__"));

    let settings = builder.build()?;
    let mut app_config: AppConfig = settings
        .try_deserialize()
        .unwrap_or_else(|_| AppConfig::default());

    apply_env_overrides(&mut app_config);
    Ok(app_config)
}

/// Build a config purely from environment variables, ignoring any config
/// file. Useful for tests and for callers that manage their own file
/// loading.
pub fn load_config_from_env() -> AppConfig {
    dotenvy::dotenv().ok();
    let mut config = AppConfig::default();
    apply_env_overrides(&mut config);
    config
}

/// `~/.config/agentcore` (or the platform equivalent), for an optional
/// user-level `config.toml` layered beneath the working directory's own.
fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|dir| dir.join("agentcore"))
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(api_key) = std::env::var("AGENTCORE_API_KEY") {
        config.provider.api_key = Some(SecretString::from(api_key));
    }
    if let Ok(model) = std::env::var("AGENTCORE_MODEL") {
        config.provider.default_model = model;
    }
    if let Ok(base_url) = std::env::var("AGENTCORE_BASE_URL") {
        config.provider.base_url = base_url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_sets_api_key() {
        std::env::set_var("AGENTCORE_API_KEY", "sk-test");
        let config = load_config_from_env();
        assert!(config.provider.api_key.is_some());
        std::env::remove_var("AGENTCORE_API_KEY");
    }
}
