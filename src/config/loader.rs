//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::BridgeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Validation(_) => None,
        }
    }
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<BridgeConfig, ConfigError> {
    let config: BridgeConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeUnit;

    const SAMPLE: &str = r#"
initializers = ["setup"]

[context]
path = "/app"

[executor]
core = 4
max = 16
keep_alive = { value = 2, unit = "minutes" }

[[handlers]]
class_name = "sync"
mappings = ["/sync"]
load_on_startup = 5
init_parameters = { greeting = "hello" }

[[handlers]]
class_name = "async"
name = "async-star"
mappings = ["/star/async/*"]
async_supported = true

[[interceptors]]
class_name = "headers"
mappings = ["/*"]
handler_names = ["sync"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.context.path, "/app");
        assert_eq!(config.context.request_encoding, "ISO-8859-1");
        assert_eq!(config.executor.core, 4);
        assert_eq!(config.executor.keep_alive.unit, TimeUnit::Minutes);
        assert_eq!(config.executor.keep_alive.to_duration().as_secs(), 120);
        assert_eq!(config.initializers, vec!["setup".to_string()]);

        let sync = &config.handlers[0];
        assert_eq!(sync.registration_name(), "sync");
        assert_eq!(sync.load_on_startup, 5);
        assert!(!sync.async_supported);
        assert_eq!(sync.init_parameters.get("greeting").map(String::as_str), Some("hello"));

        let star = &config.handlers[1];
        assert_eq!(star.registration_name(), "async-star");
        assert!(star.async_supported);

        assert_eq!(config.interceptors[0].handler_names, vec!["sync".to_string()]);
    }

    #[test]
    fn test_missing_class_name_is_parse_error() {
        let err = parse_config("[[handlers]]\nmappings = [\"/x\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_errors_surface() {
        let err = parse_config("[[handlers]]\nclass_name = \"x\"\nmappings = [\"nope\"]\n").unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
