use crate::services::{
    enumerator::{BackfillOptions, DEFAULT_PAGE_SIZE, DEFAULT_WRITE_DELAY_MS},
    retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy},
    source_client::SourceConfig,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{env, path::PathBuf, time::Duration};

const DEFAULT_TABLE_NAME: &str = "healthomics_set_metadata";
const DEFAULT_REGION: &str = "us-east-1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub table_name: String,
    pub source: SourceConfig,
    pub host: String,
    pub port: u16,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Keeps a read set metadata table in sync with a sequence store"
)]
pub struct Args {
    /// Database URL (overrides METADATA_SYNC_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Metadata table name (overrides METADATA_SYNC_TABLE_NAME)
    #[arg(short = 't', long, global = true)]
    pub table: Option<String>,

    /// Region of the sequence store (overrides METADATA_SYNC_REGION / AWS_REGION)
    #[arg(short = 'r', long, global = true)]
    pub region: Option<String>,

    /// Credential profile name (overrides METADATA_SYNC_PROFILE / AWS_PROFILE)
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Sequence store API endpoint (overrides METADATA_SYNC_ENDPOINT)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Attempts per remote call before giving up (overrides METADATA_SYNC_MAX_ATTEMPTS)
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the event endpoint and the record query API
    Serve {
        /// Host to bind to (overrides METADATA_SYNC_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides METADATA_SYNC_PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Report failed messages in `batchItemFailures` instead of failing the batch
        #[arg(long)]
        partial_batch_response: bool,
    },

    /// Write a record for every read set of a sequence store
    Backfill {
        /// The ID of the sequence store to sync
        #[arg(short = 's', long)]
        seq_store_id: String,

        /// Read sets requested per listing call
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,

        /// Pause before each read set, in milliseconds
        #[arg(long, default_value_t = DEFAULT_WRITE_DELAY_MS)]
        write_delay_ms: u64,

        /// Resume from a listing token logged by an earlier run
        #[arg(long)]
        starting_token: Option<String>,
    },

    /// Apply one queue batch read from a file (or stdin) and print the response
    Reconcile {
        /// Batch JSON file; stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,

        /// Report failed messages in `batchItemFailures` instead of failing the batch
        #[arg(long)]
        partial_batch_response: bool,
    },

    /// Create the metadata table and exit
    Migrate,
}

impl Command {
    pub fn backfill_options(&self) -> Option<BackfillOptions> {
        match self {
            Command::Backfill {
                page_size,
                write_delay_ms,
                starting_token,
                ..
            } => Some(BackfillOptions {
                page_size: *page_size,
                write_delay: Duration::from_millis(*write_delay_ms),
                starting_token: starting_token.clone(),
            }),
            _ => None,
        }
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        // Parse CLI once
        let args = Args::parse();
        Self::resolve(args, |key| env::var(key).ok())
    }

    /// Merge parsed args over values looked up through `env`.
    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<(Self, Command)> {
        let first = |keys: &[&str]| keys.iter().find_map(|&key| env(key));

        // --- Environment fallback ---
        let env_db = first(&["METADATA_SYNC_DATABASE_URL"])
            .unwrap_or_else(|| "sqlite://./data/read_set_metadata.db".into());
        let env_table = first(&[
            "METADATA_SYNC_TABLE_NAME",
            "HEALTHOMICS_STORE_METADATA_TABLE_NAME",
        ])
        .unwrap_or_else(|| DEFAULT_TABLE_NAME.into());
        let env_region =
            first(&["METADATA_SYNC_REGION", "AWS_REGION"]).unwrap_or_else(|| DEFAULT_REGION.into());
        let env_profile = first(&["METADATA_SYNC_PROFILE", "AWS_PROFILE"]);
        let env_endpoint = first(&["METADATA_SYNC_ENDPOINT"]);
        let env_attempts = match first(&["METADATA_SYNC_MAX_ATTEMPTS"]) {
            Some(value) => value
                .parse::<u32>()
                .with_context(|| format!("parsing METADATA_SYNC_MAX_ATTEMPTS value `{}`", value))?,
            None => DEFAULT_MAX_ATTEMPTS,
        };
        let env_host = first(&["METADATA_SYNC_HOST"]).unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match first(&["METADATA_SYNC_PORT"]) {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing METADATA_SYNC_PORT value `{}`", value))?,
            None => 3000,
        };

        // --- Merge ---
        let region = args.region.unwrap_or(env_region);
        let endpoint = args
            .endpoint
            .or(env_endpoint)
            .unwrap_or_else(|| SourceConfig::default_endpoint(&region));
        let (host, port) = match &args.command {
            Command::Serve { host, port, .. } => (
                host.clone().unwrap_or(env_host),
                port.unwrap_or(env_port),
            ),
            _ => (env_host, env_port),
        };

        let cfg = Self {
            database_url: args.database_url.unwrap_or(env_db),
            table_name: args.table.unwrap_or(env_table),
            source: SourceConfig {
                endpoint,
                region,
                profile: args.profile.or(env_profile),
                auth_token: first(&["METADATA_SYNC_AUTH_TOKEN"]),
                request_timeout: REQUEST_TIMEOUT,
                retry: RetryPolicy::with_max_attempts(args.max_attempts.unwrap_or(env_attempts)),
            },
            host,
            port,
        };

        Ok((cfg, args.command))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
