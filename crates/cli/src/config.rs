use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use engine::format::DEFAULT_TEMPLATE;
use engine::parser::RefinementSpec;
use engine::pipeline::DEFAULT_LIMIT;
use engine::reduce::Aggregator;
use serde::{Deserialize, Serialize};

/// Output field naming the input file on every result line.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NxConfig {
    pub input: InputConfig,
    pub format: FormatConfig,
    #[serde(default)]
    pub refinements: Vec<RefinementSpec>,
    pub group_by: GroupByConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    /// Directory searched recursively for log files
    pub directory: PathBuf,
    /// Substring a file name must contain to be processed
    pub pattern: String,
    /// Maximum parse workers per file
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormatConfig {
    pub template: String,
    /// Template tried when a line does not match `template`
    #[serde(default)]
    pub retry: Option<String>,
    /// Read the template from an nginx config instead
    #[serde(default)]
    pub nginx: Option<NginxSource>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NginxSource {
    pub path: PathBuf,
    #[serde(default = "default_nginx_format")]
    pub name: String,
}

pub fn default_nginx_format() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupByConfig {
    pub keys: Vec<String>,
    pub aggregators: Vec<Aggregator>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Logs never go to stdout, which carries the results.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stderr,
    File { path: String },
}

impl NxConfig {
    /// Load configuration from defaults, config files and environment
    /// variables, in increasing priority. `extra` is an explicitly requested
    /// file and must exist.
    pub fn load(extra: Option<&Path>) -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&NxConfig::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        // 1. /etc/nxreduce/nxreduce.toml (system-wide)
        // 2. config/nxreduce.toml (working directory)
        for path in ["/etc/nxreduce/nxreduce", "config/nxreduce"] {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        if let Some(path) = extra {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        // Nested keys use a double underscore: NXREDUCE_INPUT__CONCURRENCY
        builder = builder.add_source(
            config::Environment::with_prefix("NXREDUCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("group_by.keys"),
        );

        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.concurrency == 0 {
            anyhow::bail!("input.concurrency must be at least 1");
        }

        if self.format.nginx.is_none() && self.format.template.trim().is_empty() {
            anyhow::bail!("format.template is empty and no nginx config is set");
        }

        if self.group_by.aggregators.is_empty() {
            anyhow::bail!("group_by.aggregators must not be empty");
        }

        // Key fields and aggregator outputs share one output line with the
        // file name.
        let mut names: HashSet<String> = HashSet::new();
        for key in &self.group_by.keys {
            if key == FILE_FIELD {
                anyhow::bail!("group_by key '{}' is reserved for the input file name", key);
            }
            if !names.insert(key.clone()) {
                anyhow::bail!("group_by key '{}' is listed twice", key);
            }
        }
        for aggregator in &self.group_by.aggregators {
            let name = aggregator.output_name();
            if name == FILE_FIELD {
                anyhow::bail!(
                    "aggregator {:?} writes '{}', which is reserved for the input file name",
                    aggregator,
                    name
                );
            }
            if !names.insert(name.clone()) {
                anyhow::bail!(
                    "aggregator {:?} writes '{}', which is already an output field",
                    aggregator,
                    name
                );
            }
        }

        Ok(())
    }
}

impl Default for NxConfig {
    fn default() -> Self {
        Self {
            input: InputConfig {
                directory: PathBuf::from("."),
                pattern: ".log.gz".to_string(),
                concurrency: DEFAULT_LIMIT,
            },
            format: FormatConfig {
                template: DEFAULT_TEMPLATE.to_string(),
                retry: None,
                nginx: None,
            },
            refinements: Vec::new(),
            group_by: GroupByConfig {
                keys: vec!["http_referer".to_string()],
                aggregators: vec![Aggregator::sum("body_bytes_sent"), Aggregator::Count],
            },
            logging: LoggingConfig {
                level: "info,nxreduce=debug".to_string(),
                format: LogFormat::Pretty,
                output: LogOutput::Stderr,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = NxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.input.pattern, ".log.gz");
        assert_eq!(config.input.concurrency, 1000);
        assert_eq!(config.format.template, "$remote_addr [$time_local] \"$request\"");
        assert_eq!(config.group_by.keys, vec!["http_referer"]);
    }

    #[test]
    fn test_load_file_overrides_defaults() {
        let file = write_config(
            r#"
[input]
concurrency = 8

[format]
template = '$remote_addr $status'
retry = '$remote_addr'

[[refinements]]
field = "request"
kind = "match"
pattern = "/[^ ]*"

[logging]
format = "json"
output = { file = { path = "nxreduce.log" } }
"#,
        );

        let config = NxConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.input.concurrency, 8);
        // Untouched keys keep their defaults.
        assert_eq!(config.input.pattern, ".log.gz");
        assert_eq!(config.format.template, "$remote_addr $status");
        assert_eq!(config.format.retry.as_deref(), Some("$remote_addr"));
        assert_eq!(config.refinements.len(), 1);
        assert_eq!(config.refinements[0].field, "request");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.logging.output,
            LogOutput::File { path: "nxreduce.log".to_string() }
        );
    }

    #[test]
    fn test_load_nginx_source_with_default_name() {
        let file = write_config("[format.nginx]\npath = \"/etc/nginx/nginx.conf\"\n");
        let config = NxConfig::load(Some(file.path())).unwrap();
        let nginx = config.format.nginx.unwrap();
        assert_eq!(nginx.path, PathBuf::from("/etc/nginx/nginx.conf"));
        assert_eq!(nginx.name, "main");
    }

    #[test]
    fn test_example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/nxreduce.toml");
        let config = NxConfig::load(Some(&path)).unwrap();
        config.validate().unwrap();

        assert_eq!(config.group_by.keys, vec!["status"]);
        assert_eq!(
            config.group_by.aggregators,
            vec![
                Aggregator::sum("body_bytes_sent"),
                Aggregator::avg("body_bytes_sent"),
                Aggregator::Count,
            ]
        );
        assert_eq!(config.logging.output, LogOutput::Stderr);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        assert!(NxConfig::load(Some(Path::new("/nonexistent/nxreduce.toml"))).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = NxConfig::default();
        config.input.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_template_rejected_without_nginx() {
        let mut config = NxConfig::default();
        config.format.template = "  ".to_string();
        assert!(config.validate().is_err());

        config.format.nginx = Some(NginxSource {
            path: PathBuf::from("nginx.conf"),
            name: default_nginx_format(),
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_colliding_output_names_rejected() {
        let mut config = NxConfig::default();
        config.group_by.aggregators = vec![Aggregator::Count, Aggregator::Count];
        assert!(config.validate().is_err());

        config.group_by.keys = vec!["body_bytes_sent".to_string()];
        config.group_by.aggregators = vec![Aggregator::sum("body_bytes_sent")];
        assert!(config.validate().is_err());

        config.group_by.aggregators = vec![Aggregator::avg("body_bytes_sent")];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_output_name_rejected() {
        let mut config = NxConfig::default();
        config.group_by.keys = vec!["file".to_string()];
        assert!(config.validate().is_err());

        config.group_by.keys = vec!["status".to_string()];
        config.group_by.aggregators = vec![Aggregator::sum("file")];
        assert!(config.validate().is_err());

        config.group_by.aggregators = vec![Aggregator::avg("file")];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_aggregators_rejected() {
        let mut config = NxConfig::default();
        config.group_by.aggregators.clear();
        assert!(config.validate().is_err());
    }
}
