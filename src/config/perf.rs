use crate::utils::error::Result;
use crate::utils::validation::{
    validate_bucket_name, validate_prefix, validate_range, validate_url, Validate,
};
use clap::Parser;
use std::path::PathBuf;

/// Flags for the `list_only` performance test. Each flag falls back to the
/// environment variable the CI job exports, so a bare `list_only` run inside
/// the job still works.
#[derive(Debug, Clone, Parser)]
#[command(name = "list_only")]
#[command(about = "Times a full parallel listing of a bucket prefix")]
pub struct PerfConfig {
    /// Cloud project the dataset belongs to (informational).
    #[arg(long, env = "PROJECT")]
    pub project: Option<String>,

    #[arg(long, env = "BUCKET")]
    pub bucket: String,

    /// Expected object count; the run fails when the listing disagrees.
    #[arg(long, env = "FILE_COUNT")]
    pub bucket_file_count: Option<u64>,

    /// Expected aggregate byte size; the run fails when the listing disagrees.
    #[arg(long, env = "TOTAL_FILE_SIZE")]
    pub bucket_file_size: Option<u64>,

    #[arg(long, env = "LIST_WORKERS", default_value_t = 10)]
    pub num_workers: usize,

    /// Carried for parity with the download harness; listing ignores it.
    #[arg(long, env = "MAX_COMPOSE_BYTES", default_value_t = 100_000_000)]
    pub max_compose_bytes: u64,

    #[arg(long, env = "PREFIX", default_value = "")]
    pub prefix: String,

    /// Timeout in seconds for each listing call.
    #[arg(long, env = "LIST_TIMEOUT", default_value_t = 30)]
    pub list_timeout: u64,

    /// Directory where the sponge log artifact is written
    /// (`<results-dir>/integration_tests/sponge_log.xml`).
    #[arg(long, env = "RESULTS_DIR")]
    pub results_dir: Option<PathBuf>,

    /// Override the storage API endpoint (emulators, tests).
    #[arg(long)]
    pub api_endpoint: Option<String>,

    #[arg(long, help = "Log CPU/memory stats around the run")]
    pub monitor: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Emit logs as JSON lines for harnesses that scrape structured output.
    #[arg(long)]
    pub json_logs: bool,
}

impl Validate for PerfConfig {
    fn validate(&self) -> Result<()> {
        validate_bucket_name("bucket", &self.bucket)?;
        validate_prefix("prefix", &self.prefix)?;
        validate_range("num_workers", self.num_workers, 1, 512)?;
        validate_range("list_timeout", self.list_timeout, 1, 3600)?;
        if let Some(endpoint) = &self.api_endpoint {
            validate_url("api_endpoint", endpoint)?;
        }
        Ok(())
    }
}
