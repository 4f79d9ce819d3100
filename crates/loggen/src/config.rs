use crate::{
    generators::TelemetryKind,
    settings::{Settings, SettingsStore},
};
use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use loggen_core::PipelineConfig;
use std::{collections::BTreeMap, path::PathBuf, time::Duration};

/// Command line of the `loggen` binary.
///
/// Values given on the command line or through the environment override the
/// settings file for a single run. The file itself is only written by
/// `loggen config init` or on first use.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "loggen",
    version,
    about = "A fake log, metric and trace generator for qryn-compatible endpoints"
)]
pub struct CliArgs {
    /// Settings file to use instead of `$HOME/.loggen/config.yaml`.
    ///
    /// Environment variable: `LOGGEN_CONFIG`
    #[arg(long, global = true, env = "LOGGEN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl CliArgs {
    /// # Errors
    ///
    /// Returns an error if no explicit path was given and the home directory
    /// cannot be determined.
    pub fn settings_store(&self) -> anyhow::Result<SettingsStore> {
        match &self.config {
            Some(path) => Ok(SettingsStore::new(path)),
            None => SettingsStore::at_default_path(),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate telemetry and send it until interrupted.
    Run(RunArgs),

    /// Inspect or initialize the settings file.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Print the effective settings with the API secret masked.
    Show,

    /// Print the location of the settings file.
    Path,

    /// Write a settings file with default values.
    Init {
        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Kind of telemetry to generate.
    ///
    /// Environment variable: `LOGGEN_KIND`
    #[arg(long, value_enum, env = "LOGGEN_KIND", default_value_t = TelemetryKind::Logs)]
    pub kind: TelemetryKind,

    /// Base URL of the ingestion endpoint.
    ///
    /// Environment variable: `LOGGEN_URL`
    #[arg(long, env = "LOGGEN_URL")]
    pub url: Option<String>,

    /// Environment variable: `LOGGEN_API_KEY`
    #[arg(long, env = "LOGGEN_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Environment variable: `LOGGEN_API_SECRET`
    #[arg(long, env = "LOGGEN_API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,

    /// Items (log lines, samples or spans) per batch.
    ///
    /// Environment variable: `LOGGEN_RATE`
    #[arg(long, env = "LOGGEN_RATE")]
    pub rate: Option<usize>,

    /// Request timeout in seconds.
    ///
    /// Environment variable: `LOGGEN_TIMEOUT_SECS`
    #[arg(long, env = "LOGGEN_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Time between two sends. Each tick sends exactly one batch.
    ///
    /// Environment variable: `LOGGEN_INTERVAL_MS`
    #[arg(long, env = "LOGGEN_INTERVAL_MS", default_value_t = 1_000)]
    pub interval_ms: u64,

    /// Batches buffered ahead of the sender. Generation pauses while the
    /// buffer is full.
    ///
    /// Environment variable: `LOGGEN_QUEUE_CAPACITY`
    #[arg(
        long,
        env = "LOGGEN_QUEUE_CAPACITY",
        default_value_t = loggen_core::DEFAULT_QUEUE_CAPACITY
    )]
    pub queue_capacity: usize,

    /// Pause after a failed generation. Zero retries immediately.
    ///
    /// Environment variable: `LOGGEN_RETRY_DELAY_MS`
    #[arg(long, env = "LOGGEN_RETRY_DELAY_MS", default_value_t = 0)]
    pub retry_delay_ms: u64,

    /// Stop after this many seconds instead of waiting for a signal.
    ///
    /// Environment variable: `LOGGEN_DURATION_SECS`
    #[arg(long, env = "LOGGEN_DURATION_SECS")]
    pub duration_secs: Option<u64>,

    /// Time between two progress reports in the log.
    ///
    /// Environment variable: `LOGGEN_REPORT_INTERVAL_SECS`
    #[arg(long, env = "LOGGEN_REPORT_INTERVAL_SECS", default_value_t = 10)]
    pub report_interval_secs: u64,
}

/// Validated settings for one `loggen run`.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub kind: TelemetryKind,
    /// Base URL without a trailing slash.
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
    pub labels: BTreeMap<String, String>,
    pub rate: usize,
    pub timeout: Duration,
    pub pipeline: PipelineConfig,
    pub duration: Option<Duration>,
    pub report_interval: Duration,
}

impl RunConfig {
    /// Merges `args` over `settings` and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid value.
    pub fn resolve(settings: Settings, args: RunArgs) -> anyhow::Result<Self> {
        let timeout = args
            .timeout_secs
            .map_or_else(|| settings.timeout(), Duration::from_secs);
        if timeout.is_zero() {
            bail!("timeout must be greater than 0");
        }

        let url = args.url.unwrap_or(settings.url);
        let url = validate_url(&url)?;

        let rate = args.rate.unwrap_or(settings.rate);
        if rate == 0 {
            bail!("rate must be greater than 0");
        }

        if args.report_interval_secs == 0 {
            bail!("report interval must be greater than 0");
        }

        let duration = match args.duration_secs {
            Some(0) => bail!("duration must be greater than 0"),
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let pipeline = PipelineConfig {
            queue_capacity: args.queue_capacity,
            send_interval: Duration::from_millis(args.interval_ms),
            generate_retry_delay: Duration::from_millis(args.retry_delay_ms),
        };
        pipeline.validate()?;

        Ok(Self {
            kind: args.kind,
            url,
            api_key: args.api_key.unwrap_or(settings.api_key),
            api_secret: args.api_secret.unwrap_or(settings.api_secret),
            labels: settings.labels,
            rate,
            timeout,
            pipeline,
            duration,
            report_interval: Duration::from_secs(args.report_interval_secs),
        })
    }

    /// Full URL batches of the configured kind are posted to.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.url, self.kind.path())
    }
}

fn validate_url(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("url must not be empty");
    }

    let parsed = reqwest::Url::parse(trimmed).with_context(|| format!("invalid url `{trimmed}`"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("url must use http or https, got `{}`", parsed.scheme());
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}
