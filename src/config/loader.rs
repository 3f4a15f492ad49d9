use super::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Ten minutes: the longest base delay accepted for retries and batch pacing.
pub const MAX_RATE_LIMIT_DELAY_MS: u64 = 600_000;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&contents)
        .with_context(|| format!("Failed to load config file: {}", path.display()))?;

    tracing::debug!("Config loaded from {}", path.display());
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(contents).context("Failed to parse config")?;

    // Perform environment variable substitution
    let config = substitute_env_vars(config);

    // Validate configuration
    validate_config(&config)?;

    Ok(config)
}

fn substitute_env_vars(mut config: Config) -> Config {
    if let Some(key) = &config.llm.api_key {
        if key.starts_with("${") && key.ends_with('}') {
            let var_name = &key[2..key.len() - 1];
            config.llm.api_key = std::env::var(var_name).ok();
        }
    }

    config
}

pub fn validate_config(config: &Config) -> Result<()> {
    // Validate LLM config
    if config.llm.model.trim().is_empty() {
        anyhow::bail!("LLM model must be specified");
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!(
            "LLM temperature must be between 0 and 2, got {}",
            config.llm.temperature
        );
    }

    if config.llm.max_tokens == 0 {
        anyhow::bail!("LLM max_tokens must be greater than zero");
    }

    if config.llm.max_retries == 0 {
        anyhow::bail!("LLM max_retries must be at least 1");
    }

    if config.llm.rate_limit_delay_ms > MAX_RATE_LIMIT_DELAY_MS {
        anyhow::bail!(
            "LLM rate_limit_delay_ms must be at most {}, got {}",
            MAX_RATE_LIMIT_DELAY_MS,
            config.llm.rate_limit_delay_ms
        );
    }

    // Validate batch config
    if config.batch.batch_size == 0 {
        anyhow::bail!("Batch size must be at least 1");
    }

    // Validate logging format
    let valid_formats = ["pretty", "compact", "json"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        anyhow::bail!("Invalid logging format: {}", config.logging.format);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use crate::llm::SafetyPolicy;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.llm.provider, Provider::OpenAi);
        assert_eq!(config.llm.model, "gpt-oss-20b");
        assert_eq!(config.llm.temperature, 0.7);
        assert_eq!(config.llm.max_tokens, 2048);
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.llm.rate_limit_delay_ms, 1000);
        assert!(config.llm.safe_mode);
        assert!(config.llm.enable_logging);
        assert_eq!(config.llm.safety_policy, SafetyPolicy::Advisory);
        assert_eq!(config.batch.batch_size, 5);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_overrides() {
        let config = parse_config(
            r#"
llm:
  provider: echo
  model: local-model
  max_retries: 5
  safety_policy: enforce
batch:
  batch_size: 2
logging:
  format: json
"#,
        )
        .unwrap();

        assert_eq!(config.llm.provider, Provider::Echo);
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.llm.max_retries, 5);
        assert_eq!(config.llm.safety_policy, SafetyPolicy::Enforce);
        assert_eq!(config.batch.batch_size, 2);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_api_key_placeholder_substitution() {
        std::env::set_var("REDTEAM_KIT_LOADER_TEST_KEY", "sk-from-env");
        let config = parse_config("llm:\n  api_key: ${REDTEAM_KIT_LOADER_TEST_KEY}\n").unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-from-env"));

        let config =
            parse_config("llm:\n  api_key: ${REDTEAM_KIT_LOADER_TEST_UNSET_VAR}\n").unwrap();
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(parse_config("llm:\n  max_retries: 0\n").is_err());
        assert!(parse_config("llm:\n  temperature: 3.5\n").is_err());
        assert!(parse_config("llm:\n  model: ''\n").is_err());
        assert!(parse_config("batch:\n  batch_size: 0\n").is_err());
        assert!(parse_config("logging:\n  format: xml\n").is_err());
        assert!(parse_config("llm:\n  safety_policy: block\n").is_err());
        assert!(parse_config("llm:\n  rate_limit_delay_ms: 600001\n").is_err());
        assert!(parse_config("llm:\n  provider: anthropic\n").is_err());
    }

    #[test]
    fn test_delay_bounds() {
        assert!(parse_config("llm:\n  rate_limit_delay_ms: 0\n").is_ok());
        assert!(parse_config("llm:\n  rate_limit_delay_ms: 600000\n").is_ok());
        let err = parse_config("llm:\n  rate_limit_delay_ms: 18446744073709551615\n").unwrap_err();
        assert!(err.to_string().contains("rate_limit_delay_ms"));
    }
}
