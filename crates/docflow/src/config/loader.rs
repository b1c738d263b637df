use std::path::Path;
use std::sync::LazyLock;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

// Compiled on first use; the schema is part of the binary.
static VALIDATOR: LazyLock<Result<jsonschema::Validator, String>> = LazyLock::new(|| {
    let schema: serde_json::Value = serde_json::from_str(SCHEMA_JSON)
        .map_err(|e| format!("embedded config schema is not JSON: {}", e))?;
    jsonschema::validator_for(&schema)
        .map_err(|e| format!("embedded config schema does not compile: {}", e))
});

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let validator = VALIDATOR.as_ref().map_err(|message| ConfigError::Validation {
        message: message.clone(),
    })?;

    let problems: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::SchemaValidation {
            errors: problems.join("; "),
        })
    }
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("config version '{}' is not supported (expected 1.0)", config.version),
        });
    }

    if config.data_directory.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "data_directory must not be empty".to_string(),
        });
    }

    if config.converter.program.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "converter.program must not be empty".to_string(),
        });
    }

    let ext = config.converter.rendered_extension.trim_start_matches('.');
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::Validation {
            message: format!(
                "converter.rendered_extension '{}' must be alphanumeric",
                config.converter.rendered_extension
            ),
        });
    }

    if config.jobs.max_concurrent == Some(0) {
        return Err(ConfigError::Validation {
            message: "jobs.max_concurrent must be at least 1".to_string(),
        });
    }

    if config.jobs.progress_channel_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "jobs.progress_channel_capacity must be at least 1".to_string(),
        });
    }

    if !(config.extraction.endpoint.starts_with("http://")
        || config.extraction.endpoint.starts_with("https://"))
    {
        return Err(ConfigError::Validation {
            message: format!(
                "extraction.endpoint '{}' must be an http(s) URL",
                config.extraction.endpoint
            ),
        });
    }

    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.logging.level) {
        return Err(ConfigError::Validation {
            message: format!("Invalid logging.level '{}': {}", config.logging.level, e),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryBackend;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config.data_directory, "~/.docflow");
        assert_eq!(config.registry.backend, RegistryBackend::File);
        assert_eq!(config.converter.args, vec!["{input}"]);
        assert_eq!(config.converter.rendered_extension, "html");
        assert_eq!(config.jobs.max_concurrent, None);
        assert_eq!(
            config.extraction.api_key_env_var.as_deref(),
            Some("OPENAI_API_KEY")
        );
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_config() {
        let config = load_config_from_str(
            r#"{
                "version": "1.0",
                "data_directory": "/srv/docflow",
                "registry": { "backend": "sqlite" },
                "converter": { "program": "ocr-render", "args": ["--html", "{input}"],
                               "rendered_extension": "md" },
                "extraction": { "enabled": false, "timeout_secs": 30 },
                "jobs": { "max_concurrent": 2 },
                "logging": { "level": "docflow=debug", "json": true }
            }"#,
        )
        .unwrap();

        assert_eq!(config.registry.backend, RegistryBackend::Sqlite);
        assert_eq!(config.converter.program, "ocr-render");
        assert_eq!(config.jobs.max_concurrent, Some(2));
        assert!(!config.extraction.enabled);
        assert!(config.logging.json);
        assert_eq!(
            config.outputs_dir(),
            std::path::PathBuf::from("/srv/docflow/outputs")
        );
    }

    #[test]
    fn test_wrong_version_rejected_by_schema() {
        let err = load_config_from_str(r#"{ "version": "2.0" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = load_config_from_str(r#"{ "version": "1.0", "workers": 4 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err =
            load_config_from_str(r#"{ "version": "1.0", "jobs": { "max_concurrent": 0 } }"#)
                .unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));

        let mut config = Config::default();
        config.jobs.max_concurrent = Some(0);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_bad_extension_rejected() {
        let mut config = Config::default();
        config.converter.rendered_extension = "../html".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_json() {
        let err = load_config_from_str("{ version: 1.0 }").unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(_)));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/docflow.json").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docflow.json");
        std::fs::write(&path, r#"{ "version": "1.0", "data_directory": "/data" }"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.data_dir(), std::path::PathBuf::from("/data"));
    }
}
