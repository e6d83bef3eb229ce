mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./readly.toml",
        "~/.config/readly/config.toml",
        "/etc/readly/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let mut config = Config::default();
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Environment variables take precedence over file values.
fn apply_env_overrides(config: &mut Config) {
    if let Some(password) = first_env(&["READLY_ADMIN_PASSWORD", "ADMIN_PASSWORD"]) {
        config.admin.password = Some(password);
    }
    if let Some(environment) = first_env(&["READLY_ENVIRONMENT", "ENVIRONMENT"]) {
        config.server.environment = environment;
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.rate_limit.max_per_day == 0 {
        anyhow::bail!("rate_limit.max_per_day must be at least 1");
    }

    if config.retention.max_age_days == 0 {
        anyhow::bail!("retention.max_age_days must be at least 1");
    }

    if config.cache.max_entries == 0 {
        anyhow::bail!("cache.max_entries must be at least 1");
    }

    if !(-12..=14).contains(&config.analytics.utc_offset_hours) {
        anyhow::bail!(
            "analytics.utc_offset_hours must be between -12 and 14, got {}",
            config.analytics.utc_offset_hours
        );
    }

    if config.converter.program.is_none() {
        tracing::warn!("converter.program is not set; conversions will fail");
    }

    if config.admin.password.is_none() {
        tracing::warn!("No admin password configured; reporting endpoints are disabled");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.rate_limit.max_per_day, 50);
        assert_eq!(config.retention.max_age_days, 7);
        assert_eq!(config.analytics.utc_offset_hours, 8);
        assert!(config.admin.password.is_none());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_parse_partial_file() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [rate_limit]
            max_per_day = 5

            [converter]
            program = "/usr/local/bin/render-page"
            args = ["--headless"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.rate_limit.max_per_day, 5);
        assert_eq!(config.converter.args, vec!["--headless".to_string()]);
        assert_eq!(config.converter.timeout_secs, 300);
        assert_eq!(config.cache.max_entries, 1024);
    }

    #[test]
    fn test_storage_paths() {
        let storage = StorageConfig {
            data_dir: "/srv/readly".into(),
        };
        assert_eq!(storage.db_path(), Path::new("/srv/readly/readly.db"));
        assert_eq!(storage.artifact_dir(), Path::new("/srv/readly/artifacts"));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.rate_limit.max_per_day = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.retention.max_age_days = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.cache.max_entries = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.analytics.utc_offset_hours = 20;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[analytics]\nutc_offset_hours = -5\ntrend_days = 14").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.analytics.utc_offset_hours, -5);
        assert_eq!(config.analytics.trend_days, 14);
    }

    #[test]
    fn test_load_config_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
