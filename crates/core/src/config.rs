use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::period::FiscalQuarter;
use crate::metrics::rag::{ThresholdBand, ThresholdTables, WinRateBenchmark, WinRateBenchmarks};
use crate::metrics::renewal::RenewalPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub warehouse: WarehouseConfig,
    pub crm: CrmConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub dataset: String,
    pub timeout_secs: u64,
    pub credentials: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub enabled: bool,
    pub instance_url: Option<String>,
    pub access_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub default_uplift_rate_percent: Decimal,
    pub general: ThresholdBand,
    pub renewal: ThresholdBand,
    pub win_rate_absolute: ThresholdBand,
    pub win_rate_saturation_at: Decimal,
    pub win_rate_band_width: Decimal,
    pub win_rate_benchmarks: Vec<WinRateBenchmark>,
    pub fiscal_quarter_start: NaiveDate,
    pub fiscal_quarter_end: NaiveDate,
    pub at_risk_window_days: u32,
    pub upcoming_windows_days: Vec<u32>,
    pub trend_epsilon_percent: Decimal,
    pub auto_renew_statuses: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub warehouse_project_id: Option<String>,
    pub warehouse_dataset: Option<String>,
    pub crm_enabled: Option<bool>,
    pub crm_instance_url: Option<String>,
    pub crm_access_token: Option<String>,
    pub fiscal_quarter_start: Option<NaiveDate>,
    pub fiscal_quarter_end: Option<NaiveDate>,
    pub default_uplift_rate_percent: Option<Decimal>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for EngineConfig {
    fn default() -> Self {
        let standard = ThresholdBand::new(Decimal::from(90), Decimal::from(70));
        Self {
            default_uplift_rate_percent: Decimal::from(5),
            general: standard,
            renewal: standard,
            win_rate_absolute: standard,
            win_rate_saturation_at: Decimal::from(90),
            win_rate_band_width: Decimal::from(15),
            win_rate_benchmarks: Vec::new(),
            fiscal_quarter_start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap_or(NaiveDate::MIN),
            fiscal_quarter_end: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap_or(NaiveDate::MIN),
            at_risk_window_days: 30,
            upcoming_windows_days: vec![30, 60, 90],
            trend_epsilon_percent: Decimal::new(5, 1),
            auto_renew_statuses: vec!["Future Renewal".to_string()],
        }
    }
}

impl EngineConfig {
    pub fn fiscal_quarter(&self) -> FiscalQuarter {
        FiscalQuarter { start: self.fiscal_quarter_start, end: self.fiscal_quarter_end }
    }

    pub fn threshold_tables(&self) -> ThresholdTables {
        ThresholdTables {
            general: self.general,
            renewal: self.renewal,
            win_rate_absolute: self.win_rate_absolute,
            win_rate_saturation_at: self.win_rate_saturation_at,
            win_rate_band_width: self.win_rate_band_width,
            benchmarks: WinRateBenchmarks::new(&self.win_rate_benchmarks),
        }
    }

    pub fn renewal_policy(&self) -> RenewalPolicy {
        RenewalPolicy {
            default_uplift_rate_percent: self.default_uplift_rate_percent,
            fiscal_quarter: self.fiscal_quarter(),
            at_risk_window_days: i64::from(self.at_risk_window_days),
            upcoming_windows_days: self.upcoming_windows_days.clone(),
            auto_renew_statuses: self.auto_renew_statuses.clone(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            warehouse: WarehouseConfig {
                project_id: "revpulse-analytics".to_string(),
                dataset: "revenue_reporting".to_string(),
                timeout_secs: 30,
                credentials: None,
            },
            crm: CrmConfig {
                enabled: false,
                instance_url: None,
                access_token: None,
                timeout_secs: 20,
            },
            engine: EngineConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("revpulse.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(warehouse) = patch.warehouse {
            if let Some(project_id) = warehouse.project_id {
                self.warehouse.project_id = project_id;
            }
            if let Some(dataset) = warehouse.dataset {
                self.warehouse.dataset = dataset;
            }
            if let Some(timeout_secs) = warehouse.timeout_secs {
                self.warehouse.timeout_secs = timeout_secs;
            }
            if let Some(credentials) = warehouse.credentials {
                self.warehouse.credentials = Some(secret_value(credentials));
            }
        }

        if let Some(crm) = patch.crm {
            if let Some(enabled) = crm.enabled {
                self.crm.enabled = enabled;
            }
            if let Some(instance_url) = crm.instance_url {
                self.crm.instance_url = Some(instance_url);
            }
            if let Some(access_token) = crm.access_token {
                self.crm.access_token = Some(secret_value(access_token));
            }
            if let Some(timeout_secs) = crm.timeout_secs {
                self.crm.timeout_secs = timeout_secs;
            }
        }

        if let Some(engine) = patch.engine {
            self.engine.apply_patch(engine);
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("REVPULSE_WAREHOUSE_PROJECT_ID") {
            self.warehouse.project_id = value;
        }
        if let Some(value) = read_env("REVPULSE_WAREHOUSE_DATASET") {
            self.warehouse.dataset = value;
        }
        if let Some(value) = read_env("REVPULSE_WAREHOUSE_TIMEOUT_SECS") {
            self.warehouse.timeout_secs = parse_u64("REVPULSE_WAREHOUSE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("REVPULSE_WAREHOUSE_CREDENTIALS") {
            self.warehouse.credentials = Some(secret_value(value));
        }

        if let Some(value) = read_env("REVPULSE_CRM_ENABLED") {
            self.crm.enabled = parse_bool("REVPULSE_CRM_ENABLED", &value)?;
        }
        if let Some(value) = read_env("REVPULSE_CRM_INSTANCE_URL") {
            self.crm.instance_url = Some(value);
        }
        if let Some(value) = read_env("REVPULSE_CRM_ACCESS_TOKEN") {
            self.crm.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("REVPULSE_CRM_TIMEOUT_SECS") {
            self.crm.timeout_secs = parse_u64("REVPULSE_CRM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REVPULSE_ENGINE_DEFAULT_UPLIFT_RATE_PERCENT") {
            self.engine.default_uplift_rate_percent =
                parse_decimal("REVPULSE_ENGINE_DEFAULT_UPLIFT_RATE_PERCENT", &value)?;
        }
        if let Some(value) = read_env("REVPULSE_ENGINE_FISCAL_QUARTER_START") {
            self.engine.fiscal_quarter_start =
                parse_date("REVPULSE_ENGINE_FISCAL_QUARTER_START", &value)?;
        }
        if let Some(value) = read_env("REVPULSE_ENGINE_FISCAL_QUARTER_END") {
            self.engine.fiscal_quarter_end =
                parse_date("REVPULSE_ENGINE_FISCAL_QUARTER_END", &value)?;
        }
        if let Some(value) = read_env("REVPULSE_ENGINE_AT_RISK_WINDOW_DAYS") {
            self.engine.at_risk_window_days =
                parse_u32("REVPULSE_ENGINE_AT_RISK_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("REVPULSE_ENGINE_UPCOMING_WINDOWS_DAYS") {
            self.engine.upcoming_windows_days = value
                .split(',')
                .map(|window| parse_u32("REVPULSE_ENGINE_UPCOMING_WINDOWS_DAYS", window.trim()))
                .collect::<Result<_, _>>()?;
        }
        if let Some(value) = read_env("REVPULSE_ENGINE_TREND_EPSILON_PERCENT") {
            self.engine.trend_epsilon_percent =
                parse_decimal("REVPULSE_ENGINE_TREND_EPSILON_PERCENT", &value)?;
        }

        let log_level =
            read_env("REVPULSE_LOGGING_LEVEL").or_else(|| read_env("REVPULSE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("REVPULSE_LOGGING_FORMAT").or_else(|| read_env("REVPULSE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(project_id) = overrides.warehouse_project_id {
            self.warehouse.project_id = project_id;
        }
        if let Some(dataset) = overrides.warehouse_dataset {
            self.warehouse.dataset = dataset;
        }
        if let Some(enabled) = overrides.crm_enabled {
            self.crm.enabled = enabled;
        }
        if let Some(instance_url) = overrides.crm_instance_url {
            self.crm.instance_url = Some(instance_url);
        }
        if let Some(access_token) = overrides.crm_access_token {
            self.crm.access_token = Some(secret_value(access_token));
        }
        if let Some(start) = overrides.fiscal_quarter_start {
            self.engine.fiscal_quarter_start = start;
        }
        if let Some(end) = overrides.fiscal_quarter_end {
            self.engine.fiscal_quarter_end = end;
        }
        if let Some(rate) = overrides.default_uplift_rate_percent {
            self.engine.default_uplift_rate_percent = rate;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_warehouse(&self.warehouse)?;
        validate_crm(&self.crm)?;
        validate_engine(&self.engine)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

impl EngineConfig {
    fn apply_patch(&mut self, patch: EnginePatch) {
        if let Some(rate) = patch.default_uplift_rate_percent {
            self.default_uplift_rate_percent = rate;
        }
        if let Some(general) = patch.general {
            general.apply_to(&mut self.general);
        }
        if let Some(renewal) = patch.renewal {
            renewal.apply_to(&mut self.renewal);
        }
        if let Some(win_rate) = patch.win_rate {
            if let Some(saturation_at) = win_rate.saturation_at {
                self.win_rate_saturation_at = saturation_at;
            }
            if let Some(band_width) = win_rate.band_width {
                self.win_rate_band_width = band_width;
            }
            if let Some(green_at) = win_rate.green_at {
                self.win_rate_absolute.green_at = green_at;
            }
            if let Some(yellow_at) = win_rate.yellow_at {
                self.win_rate_absolute.yellow_at = yellow_at;
            }
        }
        if let Some(benchmarks) = patch.win_rate_benchmarks {
            self.win_rate_benchmarks = benchmarks;
        }
        if let Some(start) = patch.fiscal_quarter_start {
            self.fiscal_quarter_start = start;
        }
        if let Some(end) = patch.fiscal_quarter_end {
            self.fiscal_quarter_end = end;
        }
        if let Some(days) = patch.at_risk_window_days {
            self.at_risk_window_days = days;
        }
        if let Some(windows) = patch.upcoming_windows_days {
            self.upcoming_windows_days = windows;
        }
        if let Some(epsilon) = patch.trend_epsilon_percent {
            self.trend_epsilon_percent = epsilon;
        }
        if let Some(statuses) = patch.auto_renew_statuses {
            self.auto_renew_statuses = statuses;
        }
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("revpulse.toml"), PathBuf::from("config/revpulse.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_warehouse(warehouse: &WarehouseConfig) -> Result<(), ConfigError> {
    if warehouse.project_id.trim().is_empty() {
        return Err(ConfigError::Validation("warehouse.project_id must not be empty".to_string()));
    }
    if warehouse.dataset.trim().is_empty() {
        return Err(ConfigError::Validation("warehouse.dataset must not be empty".to_string()));
    }
    if warehouse.timeout_secs == 0 || warehouse.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "warehouse.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if crm.timeout_secs == 0 || crm.timeout_secs > 300 {
        return Err(ConfigError::Validation("crm.timeout_secs must be in range 1..=300".to_string()));
    }

    if let Some(instance_url) = &crm.instance_url {
        if !instance_url.starts_with("http://") && !instance_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "crm.instance_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if crm.enabled {
        if crm.instance_url.is_none() {
            return Err(ConfigError::Validation(
                "crm.enabled is true but crm.instance_url is not configured".to_string(),
            ));
        }
        let missing_token = crm
            .access_token
            .as_ref()
            .map(|token| token.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing_token {
            return Err(ConfigError::Validation(
                "crm.enabled is true but crm.access_token is missing".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_band(key: &str, band: &ThresholdBand) -> Result<(), ConfigError> {
    if band.yellow_at > band.green_at {
        return Err(ConfigError::Validation(format!(
            "{key}.yellow_at must not exceed {key}.green_at"
        )));
    }
    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.default_uplift_rate_percent.is_sign_negative() {
        return Err(ConfigError::Validation(
            "engine.default_uplift_rate_percent must not be negative".to_string(),
        ));
    }

    validate_band("engine.general", &engine.general)?;
    validate_band("engine.renewal", &engine.renewal)?;
    validate_band("engine.win_rate", &engine.win_rate_absolute)?;

    if engine.win_rate_band_width.is_sign_negative() {
        return Err(ConfigError::Validation(
            "engine.win_rate.band_width must not be negative".to_string(),
        ));
    }

    if engine.fiscal_quarter_end < engine.fiscal_quarter_start {
        return Err(ConfigError::Validation(
            "engine.fiscal_quarter_end must not precede engine.fiscal_quarter_start".to_string(),
        ));
    }

    if engine.upcoming_windows_days.is_empty() {
        return Err(ConfigError::Validation(
            "engine.upcoming_windows_days must list at least one window".to_string(),
        ));
    }
    let increasing = engine.upcoming_windows_days.windows(2).all(|pair| pair[0] < pair[1]);
    if !increasing || engine.upcoming_windows_days[0] == 0 {
        return Err(ConfigError::Validation(
            "engine.upcoming_windows_days must be positive and strictly increasing".to_string(),
        ));
    }

    if engine.trend_epsilon_percent.is_sign_negative() {
        return Err(ConfigError::Validation(
            "engine.trend_epsilon_percent must not be negative".to_string(),
        ));
    }

    let out_of_range = engine.win_rate_benchmarks.iter().find(|entry| {
        entry.benchmark_percent < Decimal::ZERO || entry.benchmark_percent > Decimal::ONE_HUNDRED
    });
    if let Some(benchmark) = out_of_range {
        return Err(ConfigError::Validation(format!(
            "engine.win_rate_benchmarks entry for {} / {} must be within 0..=100",
            benchmark.product, benchmark.category
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid(key, value))
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| invalid(key, value))
}

fn parse_date(key: &str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| invalid(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    warehouse: Option<WarehousePatch>,
    crm: Option<CrmPatch>,
    engine: Option<EnginePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct WarehousePatch {
    project_id: Option<String>,
    dataset: Option<String>,
    timeout_secs: Option<u64>,
    credentials: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    enabled: Option<bool>,
    instance_url: Option<String>,
    access_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    default_uplift_rate_percent: Option<Decimal>,
    general: Option<BandPatch>,
    renewal: Option<BandPatch>,
    win_rate: Option<WinRatePatch>,
    win_rate_benchmarks: Option<Vec<WinRateBenchmark>>,
    fiscal_quarter_start: Option<NaiveDate>,
    fiscal_quarter_end: Option<NaiveDate>,
    at_risk_window_days: Option<u32>,
    upcoming_windows_days: Option<Vec<u32>>,
    trend_epsilon_percent: Option<Decimal>,
    auto_renew_statuses: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct BandPatch {
    green_at: Option<Decimal>,
    yellow_at: Option<Decimal>,
}

impl BandPatch {
    fn apply_to(self, band: &mut ThresholdBand) {
        if let Some(green_at) = self.green_at {
            band.green_at = green_at;
        }
        if let Some(yellow_at) = self.yellow_at {
            band.yellow_at = yellow_at;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WinRatePatch {
    saturation_at: Option<Decimal>,
    band_width: Option<Decimal>,
    green_at: Option<Decimal>,
    yellow_at: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use crate::domain::dimension::{Category, Product};

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn write_config(dir: &TempDir, contents: &str) -> Result<std::path::PathBuf, String> {
        let path = dir.path().join("revpulse.toml");
        fs::write(&path, contents).map_err(|err| err.to_string())?;
        Ok(path)
    }

    #[test]
    fn defaults_match_dashboard_conventions() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;
        let engine = &config.engine;

        ensure(engine.default_uplift_rate_percent == Decimal::from(5), "default uplift is 5%")?;
        ensure(engine.general.green_at == Decimal::from(90), "general green bound is 90")?;
        ensure(engine.renewal.yellow_at == Decimal::from(70), "renewal yellow bound is 70")?;
        ensure(engine.upcoming_windows_days == vec![30, 60, 90], "windows are 30/60/90")?;
        ensure(engine.fiscal_quarter().total_days() == 90, "default quarter has 90 days")?;
        ensure(engine.renewal_policy().at_risk_window_days == 30, "at-risk window is 30 days")?;
        ensure(matches!(config.logging.format, LogFormat::Compact), "default format is compact")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CRM_ACCESS_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = write_config(
                &dir,
                r#"
[crm]
enabled = true
instance_url = "https://example.my.salesforce.com"
access_token = "${TEST_CRM_ACCESS_TOKEN}"
"#,
            )?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let token = config.crm.access_token.as_ref().map(|token| token.expose_secret().to_string());
            ensure(token.as_deref() == Some("token-from-env"), "token should come from environment")
        })();

        clear_vars(&["TEST_CRM_ACCESS_TOKEN"]);
        result
    }

    #[test]
    fn engine_section_overrides_thresholds_and_benchmarks() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = write_config(
            &dir,
            r#"
[engine]
default_uplift_rate_percent = 4.5
fiscal_quarter_start = "2026-04-01"
fiscal_quarter_end = "2026-06-30"
upcoming_windows_days = [14, 45]

[engine.renewal]
green_at = 95

[[engine.win_rate_benchmarks]]
product = "POR"
category = "NEW LOGO"
benchmark_percent = 32
"#,
        )?;

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;
        let tables = config.engine.threshold_tables();
        let policy = config.engine.renewal_policy();

        ensure(
            policy.default_uplift_rate_percent == Decimal::new(45, 1),
            "uplift rate should come from file",
        )?;
        ensure(policy.upcoming_windows_days == vec![14, 45], "windows should come from file")?;
        ensure(
            Some(policy.fiscal_quarter.start) == NaiveDate::from_ymd_opt(2026, 4, 1),
            "quarter start should come from file",
        )?;
        ensure(tables.renewal.green_at == Decimal::from(95), "renewal green bound overridden")?;
        ensure(tables.general.green_at == Decimal::from(90), "general table stays independent")?;
        ensure(
            tables.benchmarks.get(Product::Por, Category::NewLogo) == Some(Decimal::from(32)),
            "benchmark should be loaded as data",
        )
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REVPULSE_WAREHOUSE_DATASET", "from_env");
        env::set_var("REVPULSE_LOG_LEVEL", "warn");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = write_config(
                &dir,
                r#"
[warehouse]
project_id = "from-file"
dataset = "from_file"

[logging]
level = "error"
"#,
            )?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.warehouse.project_id == "from-file", "file value should beat default")?;
            ensure(config.warehouse.dataset == "from_env", "env value should beat file")?;
            ensure(config.logging.level == "debug", "override should beat env")
        })();

        clear_vars(&["REVPULSE_WAREHOUSE_DATASET", "REVPULSE_LOG_LEVEL"]);
        result
    }

    #[test]
    fn invalid_env_override_names_the_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REVPULSE_ENGINE_AT_RISK_WINDOW_DAYS", "thirty");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override error".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "REVPULSE_ENGINE_AT_RISK_WINDOW_DAYS",
                "error should name the offending variable",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["REVPULSE_ENGINE_AT_RISK_WINDOW_DAYS"]);
        result
    }

    #[test]
    fn validation_rejects_unordered_windows() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REVPULSE_ENGINE_UPCOMING_WINDOWS_DAYS", "60,30,90");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected validation failure but config load succeeded".to_string()),
            Err(ConfigError::Validation(message)) => ensure(
                message.contains("engine.upcoming_windows_days"),
                "validation failure should name engine.upcoming_windows_days",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["REVPULSE_ENGINE_UPCOMING_WINDOWS_DAYS"]);
        result
    }

    #[test]
    fn enabled_crm_requires_credentials() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REVPULSE_CRM_ENABLED", "true");
        env::set_var("REVPULSE_CRM_INSTANCE_URL", "https://example.my.salesforce.com");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected validation failure".to_string()),
            Err(ConfigError::Validation(message)) => {
                ensure(message.contains("crm.access_token"), "failure should name crm.access_token")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["REVPULSE_CRM_ENABLED", "REVPULSE_CRM_INSTANCE_URL"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REVPULSE_WAREHOUSE_CREDENTIALS", "sa-secret-value");
        env::set_var("REVPULSE_CRM_ACCESS_TOKEN", "crm-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sa-secret-value"), "debug output should hide credentials")?;
            ensure(!debug.contains("crm-secret-value"), "debug output should hide access token")
        })();

        clear_vars(&["REVPULSE_WAREHOUSE_CREDENTIALS", "REVPULSE_CRM_ACCESS_TOKEN"]);
        result
    }
}
