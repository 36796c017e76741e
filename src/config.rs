use std::path::Path;

use config::{ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Namespace prefix for environment overrides (`prometheus.listen_address`
/// becomes `FRAPP8S_PROMETHEUS_LISTEN_ADDRESS`).
pub const ENV_PREFIX: &str = "FRAPP8S";

/// Every configuration key that accepts a file value or an environment
/// override. Kept as an explicit table so the override name for each key is
/// enumerable rather than derived by reflection.
pub const CONFIG_KEYS: &[&str] = &[
    "prometheus.listen_address",
    "prometheus.metrics_path",
    "frappe.benches",
    "frappe.log_files",
    "frappe.log_format",
    "pipeline.channel_buffer_size",
    "pipeline.consumer_workers",
    "parser.min_sql_duration_ms",
    "parser.exclude_sites",
    "parser.exclude_methods",
    "parser.exclude_doctypes",
    "exporter_logging.level",
    "exporter_logging.format",
];

/// Keys whose values are lists; their environment overrides are split on commas.
const LIST_KEYS: &[&str] = &[
    "frappe.benches",
    "frappe.log_files",
    "parser.exclude_sites",
    "parser.exclude_methods",
    "parser.exclude_doctypes",
];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub prometheus: PrometheusConfig,
    pub frappe: FrappeConfig,
    pub pipeline: PipelineConfig,
    pub parser: ParserConfig,
    pub exporter_logging: ExporterLoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrometheusConfig {
    pub listen_address: String,
    pub metrics_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FrappeConfig {
    /// Bench directories to watch. Required; there is no sensible default,
    /// so an absent key deserializes to an empty list and the validator
    /// reports it.
    #[serde(default)]
    pub benches: Vec<String>,
    pub log_files: Vec<String>,
    pub log_format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    // i64 rather than an unsigned type so a negative value in the file
    // reaches the validator as a violation message, not a serde error.
    pub channel_buffer_size: i64,
    pub consumer_workers: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParserConfig {
    pub min_sql_duration_ms: i64,
    pub exclude_sites: Vec<String>,
    pub exclude_methods: Vec<String>,
    pub exclude_doctypes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExporterLoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Resolve configuration from layered sources and validate it.
    ///
    /// Precedence, lowest to highest: compiled-in defaults, the YAML file at
    /// `path`, environment overrides. A missing file is not fatal (the caller
    /// logs the warning once logging is up); a file that exists but cannot be
    /// parsed or mapped onto this shape is.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();

        let mut builder = defaults().map_err(ConfigError::Builder)?;

        if path.exists() {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        builder = apply_env_overrides(builder, |name| std::env::var(name).ok())
            .map_err(ConfigError::Builder)?;

        let resolved = builder.build().map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let cfg: Config = resolved.try_deserialize().map_err(ConfigError::Shape)?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Pretty-printed effective configuration for the startup debug log.
    pub fn to_formatted_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Environment variable name for a dotted configuration key.
pub fn env_var_name(key: &str) -> String {
    format!("{}_{}", ENV_PREFIX, key.replace('.', "_").to_uppercase())
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    // Every field except frappe.benches carries a compiled-in default.
    config::Config::builder()
        .set_default("prometheus.listen_address", ":9876")?
        .set_default("prometheus.metrics_path", "/metrics")?
        .set_default("frappe.log_files", vec!["frappe.log", "database.log"])?
        .set_default("frappe.log_format", "text")?
        .set_default("pipeline.channel_buffer_size", 10_000)?
        .set_default("pipeline.consumer_workers", 4)?
        .set_default("parser.min_sql_duration_ms", 0)?
        .set_default("parser.exclude_sites", Vec::<String>::new())?
        .set_default("parser.exclude_methods", Vec::<String>::new())?
        .set_default("parser.exclude_doctypes", Vec::<String>::new())?
        .set_default("exporter_logging.level", "info")?
        .set_default("exporter_logging.format", "text")
}

/// Apply overrides from the enumerated key table. `lookup` abstracts the
/// process environment so precedence is testable without mutating it.
fn apply_env_overrides(
    mut builder: ConfigBuilder<DefaultState>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    for key in CONFIG_KEYS {
        let Some(raw) = lookup(&env_var_name(key)) else {
            continue;
        };
        builder = if LIST_KEYS.contains(key) {
            let values: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            builder.set_override(*key, values)?
        } else {
            builder.set_override(*key, raw)?
        };
    }
    Ok(builder)
}
