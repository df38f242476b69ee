use std::path::PathBuf;

use clap::Parser;

use crate::config::{default_nginx_format, NginxSource, NxConfig};

/// Aggregate nginx access logs.
///
/// Every input file is parsed with the configured log format and reduced on
/// its own; each group becomes one JSON line on stdout.
#[derive(Parser, Debug)]
#[command(name = "nxreduce", version)]
pub struct Args {
    /// Configuration file layered over the defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory searched for log files when no FILES are given
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Substring a file name must contain to be picked up
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Maximum parse workers per file
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Log format template, e.g. '$remote_addr [$time_local] "$request"'
    #[arg(short, long)]
    pub format: Option<String>,

    /// Template tried when a line does not match the primary format
    #[arg(long)]
    pub retry: Option<String>,

    /// nginx configuration to read the log format from
    #[arg(long)]
    pub nginx_conf: Option<PathBuf>,

    /// Name of the log_format directive in --nginx-conf
    #[arg(long, requires = "nginx_conf")]
    pub nginx_format: Option<String>,

    /// Comma-separated fields to group by
    #[arg(short, long, value_delimiter = ',')]
    pub group_by: Option<Vec<String>>,

    /// Log files to process instead of searching --dir
    pub files: Vec<PathBuf>,
}

impl Args {
    /// Command-line flags take priority over every other configuration source.
    pub fn apply(&self, config: &mut NxConfig) {
        if let Some(dir) = &self.dir {
            config.input.directory = dir.clone();
        }
        if let Some(pattern) = &self.pattern {
            config.input.pattern = pattern.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.input.concurrency = concurrency;
        }
        if let Some(format) = &self.format {
            config.format.template = format.clone();
            config.format.nginx = None;
        }
        if let Some(retry) = &self.retry {
            config.format.retry = Some(retry.clone());
        }
        if let Some(path) = &self.nginx_conf {
            config.format.nginx = Some(NginxSource {
                path: path.clone(),
                name: self
                    .nginx_format
                    .clone()
                    .unwrap_or_else(default_nginx_format),
            });
        }
        if let Some(keys) = &self.group_by {
            config.group_by.keys = keys.clone();
        }
    }
}
