use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use revpulse_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run(options: LoadOptions) -> String {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for field in fields(&config) {
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

fn fields(config: &AppConfig) -> Vec<Field> {
    let engine = &config.engine;
    let windows = engine
        .upcoming_windows_days
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");

    vec![
        Field {
            key: "warehouse.project_id",
            env_keys: &["REVPULSE_WAREHOUSE_PROJECT_ID"],
            value: config.warehouse.project_id.clone(),
        },
        Field {
            key: "warehouse.dataset",
            env_keys: &["REVPULSE_WAREHOUSE_DATASET"],
            value: config.warehouse.dataset.clone(),
        },
        Field {
            key: "warehouse.timeout_secs",
            env_keys: &["REVPULSE_WAREHOUSE_TIMEOUT_SECS"],
            value: config.warehouse.timeout_secs.to_string(),
        },
        Field {
            key: "warehouse.credentials",
            env_keys: &["REVPULSE_WAREHOUSE_CREDENTIALS"],
            value: redacted(config.warehouse.credentials.is_some()),
        },
        Field {
            key: "crm.enabled",
            env_keys: &["REVPULSE_CRM_ENABLED"],
            value: config.crm.enabled.to_string(),
        },
        Field {
            key: "crm.instance_url",
            env_keys: &["REVPULSE_CRM_INSTANCE_URL"],
            value: config.crm.instance_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        },
        Field {
            key: "crm.access_token",
            env_keys: &["REVPULSE_CRM_ACCESS_TOKEN"],
            value: redacted(config.crm.access_token.is_some()),
        },
        Field {
            key: "crm.timeout_secs",
            env_keys: &["REVPULSE_CRM_TIMEOUT_SECS"],
            value: config.crm.timeout_secs.to_string(),
        },
        Field {
            key: "engine.default_uplift_rate_percent",
            env_keys: &["REVPULSE_ENGINE_DEFAULT_UPLIFT_RATE_PERCENT"],
            value: engine.default_uplift_rate_percent.to_string(),
        },
        Field {
            key: "engine.fiscal_quarter_start",
            env_keys: &["REVPULSE_ENGINE_FISCAL_QUARTER_START"],
            value: engine.fiscal_quarter_start.to_string(),
        },
        Field {
            key: "engine.fiscal_quarter_end",
            env_keys: &["REVPULSE_ENGINE_FISCAL_QUARTER_END"],
            value: engine.fiscal_quarter_end.to_string(),
        },
        Field {
            key: "engine.at_risk_window_days",
            env_keys: &["REVPULSE_ENGINE_AT_RISK_WINDOW_DAYS"],
            value: engine.at_risk_window_days.to_string(),
        },
        Field {
            key: "engine.upcoming_windows_days",
            env_keys: &["REVPULSE_ENGINE_UPCOMING_WINDOWS_DAYS"],
            value: windows,
        },
        Field {
            key: "engine.trend_epsilon_percent",
            env_keys: &["REVPULSE_ENGINE_TREND_EPSILON_PERCENT"],
            value: engine.trend_epsilon_percent.to_string(),
        },
        Field {
            key: "engine.general",
            env_keys: &[],
            value: format!("green>={} yellow>={}", engine.general.green_at, engine.general.yellow_at),
        },
        Field {
            key: "engine.renewal",
            env_keys: &[],
            value: format!("green>={} yellow>={}", engine.renewal.green_at, engine.renewal.yellow_at),
        },
        Field {
            key: "engine.win_rate_benchmarks",
            env_keys: &[],
            value: format!("{} configured", engine.win_rate_benchmarks.len()),
        },
        Field {
            key: "logging.level",
            env_keys: &["REVPULSE_LOGGING_LEVEL", "REVPULSE_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_keys: &["REVPULSE_LOGGING_FORMAT", "REVPULSE_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format),
        },
    ]
}

fn redacted(is_set: bool) -> String {
    let shown = if is_set { "<redacted>" } else { "<unset>" };
    shown.to_string()
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("revpulse.toml"), PathBuf::from("config/revpulse.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
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

/// Engine keys may sit in a nested table (`[engine.renewal]`) in the file,
/// so a key also counts as present when its last segment appears under any
/// table beneath its section.
fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut segments = key_path.split('.');
    let Some(section) = segments.next().and_then(|section| root.get(section)) else {
        return false;
    };
    let Some(leaf) = segments.last() else {
        return true;
    };
    contains_key(section, leaf)
}

fn contains_key(value: &Value, key: &str) -> bool {
    match value {
        Value::Table(table) => {
            table.contains_key(key) || table.values().any(|nested| contains_key(nested, key))
        }
        _ => false,
    }
}
