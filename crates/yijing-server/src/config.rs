use crate::interpret::{
    DEFAULT_ADVICE_MARKER,
    dashscope::{DashScopeConfig, DEFAULT_BASE_URL, DEFAULT_MODEL},
    retry::RetryConfig,
};
use anyhow::bail;
use clap::Parser;
use std::{path::PathBuf, time::Duration};

/// Runtime configuration for the `yijing-server` binary.
///
/// These settings control the listen address, the worker pool, and the
/// outbound interpretation call. All values are parsed from CLI arguments or
/// environment variables (a `.env` file is loaded first), with defaults that
/// work for local development.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "yijing-server",
    version,
    about = "An HTTP service that casts hexagrams and interprets them in the background"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:3002"))]
    pub server_addr: String,

    /// Number of interpretation workers.
    ///
    /// This is the hard bound on concurrent outbound interpretation calls.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 5)]
    pub num_workers: usize,

    /// Capacity of each worker's request queue.
    ///
    /// When every queue is full, new jobs are completed immediately with the
    /// fallback interpretation instead of waiting.
    ///
    /// Environment variable: `QUEUE_DEPTH`
    #[arg(long, env = "QUEUE_DEPTH", default_value_t = 64)]
    pub queue_depth: usize,

    /// Hard bound, in seconds, on a single interpretation call including
    /// retries.
    ///
    /// Environment variable: `INTERPRET_TIMEOUT_SECS`
    #[arg(long, env = "INTERPRET_TIMEOUT_SECS", default_value_t = 60)]
    pub interpret_timeout_secs: u64,

    /// Seconds to wait for each worker to acknowledge shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// DashScope credential. Without it every interpretation falls back.
    ///
    /// Environment variable: `DASHSCOPE_API_KEY`
    #[arg(long, env = "DASHSCOPE_API_KEY", hide_env_values = true)]
    pub dashscope_api_key: Option<String>,

    /// Text-generation model name.
    ///
    /// Environment variable: `DASHSCOPE_MODEL`
    #[arg(long, env = "DASHSCOPE_MODEL", default_value_t = String::from(DEFAULT_MODEL))]
    pub model: String,

    /// DashScope API base URL.
    ///
    /// Environment variable: `DASHSCOPE_BASE_URL`
    #[arg(long, env = "DASHSCOPE_BASE_URL", default_value_t = String::from(DEFAULT_BASE_URL))]
    pub base_url: String,

    /// Sampling temperature.
    ///
    /// Environment variable: `DASHSCOPE_TEMPERATURE`
    #[arg(long, env = "DASHSCOPE_TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f32,

    /// Maximum tokens in the generated interpretation.
    ///
    /// Environment variable: `DASHSCOPE_MAX_TOKENS`
    #[arg(long, env = "DASHSCOPE_MAX_TOKENS", default_value_t = 800)]
    pub max_tokens: u32,

    /// Nucleus sampling threshold.
    ///
    /// Environment variable: `DASHSCOPE_TOP_P`
    #[arg(long, env = "DASHSCOPE_TOP_P", default_value_t = 0.8)]
    pub top_p: f32,

    /// Retries after the first attempt for transient failures.
    ///
    /// Environment variable: `DASHSCOPE_MAX_RETRIES`
    #[arg(long, env = "DASHSCOPE_MAX_RETRIES", default_value_t = 2)]
    pub max_retries: u32,

    /// Marker separating the interpretation from the advice in generated text.
    ///
    /// Environment variable: `ADVICE_MARKER`
    #[arg(long, env = "ADVICE_MARKER", default_value_t = String::from(DEFAULT_ADVICE_MARKER))]
    pub advice_marker: String,

    /// Directory holding `trigrams.json` and `hexagrams.json`. The built-in
    /// tables are used for any file that is absent.
    ///
    /// Environment variable: `TABLES_DIR`
    #[arg(long, env = "TABLES_DIR")]
    pub tables_dir: Option<PathBuf>,

    /// Directory for `divinations.json`. Records are kept in memory only when
    /// unset.
    ///
    /// Environment variable: `DATA_DIR`
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub num_workers: usize,
    pub queue_depth: usize,
    pub interpret_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub advice_marker: String,
    pub dashscope: DashScopeConfig,
    pub tables_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }
        if args.queue_depth == 0 {
            bail!("QUEUE_DEPTH must be greater than 0");
        }
        if args.interpret_timeout_secs == 0 {
            bail!("INTERPRET_TIMEOUT_SECS must be greater than 0");
        }
        if args.advice_marker.trim().is_empty() {
            bail!("ADVICE_MARKER must not be empty");
        }
        if !(0.0..=2.0).contains(&args.temperature) {
            bail!(
                "DASHSCOPE_TEMPERATURE ({}) must be within 0.0..=2.0",
                args.temperature
            );
        }
        if !(args.top_p > 0.0 && args.top_p <= 1.0) {
            bail!("DASHSCOPE_TOP_P ({}) must be within (0.0, 1.0]", args.top_p);
        }
        if let Err(e) = reqwest::Url::parse(&args.base_url) {
            bail!("DASHSCOPE_BASE_URL ({}) is not a valid URL: {e}", args.base_url);
        }

        // A blank key behaves like an absent one.
        let api_key = args.dashscope_api_key.filter(|key| !key.trim().is_empty());

        Ok(Self {
            server_addr: args.server_addr,
            num_workers: args.num_workers,
            queue_depth: args.queue_depth,
            interpret_timeout: Duration::from_secs(args.interpret_timeout_secs),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            advice_marker: args.advice_marker,
            dashscope: DashScopeConfig {
                api_key,
                base_url: args.base_url.trim_end_matches('/').to_string(),
                model: args.model,
                temperature: args.temperature,
                max_tokens: args.max_tokens,
                top_p: args.top_p,
                retry: RetryConfig {
                    max_retries: args.max_retries,
                    ..RetryConfig::default()
                },
            },
            tables_dir: args.tables_dir,
            data_dir: args.data_dir,
        })
    }
}
