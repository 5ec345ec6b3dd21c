use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use claimflow_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use toml::Value;

struct ConfigField {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField> {
    vec![
        ConfigField {
            key: "database.url",
            env_keys: &["CLAIMFLOW_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        ConfigField {
            key: "database.max_connections",
            env_keys: &["CLAIMFLOW_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        ConfigField {
            key: "database.timeout_secs",
            env_keys: &["CLAIMFLOW_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        ConfigField {
            key: "workflow.auto_approve_unmatched",
            env_keys: &["CLAIMFLOW_WORKFLOW_AUTO_APPROVE_UNMATCHED"],
            value: config.workflow.auto_approve_unmatched.to_string(),
        },
        ConfigField {
            key: "workflow.min_description_len",
            env_keys: &["CLAIMFLOW_WORKFLOW_MIN_DESCRIPTION_LEN"],
            value: config.workflow.min_description_len.to_string(),
        },
        ConfigField {
            key: "logging.level",
            env_keys: &["CLAIMFLOW_LOGGING_LEVEL", "CLAIMFLOW_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        ConfigField {
            key: "logging.format",
            env_keys: &["CLAIMFLOW_LOGGING_FORMAT", "CLAIMFLOW_LOG_FORMAT"],
            value: config.logging.format.as_str().to_string(),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), Path::new("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
