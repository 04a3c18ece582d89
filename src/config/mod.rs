pub mod cli;
#[cfg(feature = "cli")]
pub mod perf;

pub use cli::LocalStorage;

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::{
    validate_bucket_name, validate_positive_number, validate_prefix, validate_range,
    validate_url, Validate,
};
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

/// Command-line surface of the `dataflux` binary. Every knob falls back to
/// the environment variable a CI harness would export.
#[cfg(feature = "cli")]
#[derive(Debug, Parser)]
#[command(name = "dataflux")]
#[command(about = "Fast object-storage listing and download client")]
pub struct CliConfig {
    /// Cloud project the dataset belongs to (informational).
    #[arg(long, env = "PROJECT", default_value = "")]
    pub project: String,

    #[arg(long, env = "BUCKET")]
    pub bucket: String,

    #[arg(long, env = "PREFIX", default_value = "")]
    pub prefix: String,

    #[arg(long, env = "LIST_WORKERS", default_value_t = 10)]
    pub num_workers: usize,

    /// Timeout in seconds for each listing call.
    #[arg(long, env = "LIST_TIMEOUT", default_value_t = 30)]
    pub list_timeout: u64,

    /// Override the storage API endpoint (emulators, tests).
    #[arg(long)]
    pub api_endpoint: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Emit logs as JSON lines for harnesses that scrape structured output.
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List every object under the prefix and print a summary.
    List,
    /// List and then download every object under the prefix.
    Download {
        /// Objects up to this size are compose-batched.
        #[arg(long, env = "MAX_COMPOSE_BYTES", default_value_t = 100_000_000)]
        max_compose_bytes: u64,

        /// Timeout in seconds for each download call.
        #[arg(long, env = "DOWNLOAD_TIMEOUT", default_value_t = 60)]
        download_timeout: u64,

        /// Number of concurrent download tasks.
        #[arg(long, env = "PARALLELIZATION", default_value_t = 10)]
        parallelization: usize,

        #[arg(long, default_value = "./output")]
        output_path: PathBuf,
    },
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_bucket_name("bucket", &self.bucket)?;
        validate_prefix("prefix", &self.prefix)?;
        validate_positive_number("num_workers", self.num_workers, 1)?;
        validate_range("num_workers", self.num_workers, 1, 512)?;
        validate_positive_number("list_timeout", self.list_timeout as usize, 1)?;
        if let Some(endpoint) = &self.api_endpoint {
            validate_url("api_endpoint", endpoint)?;
        }
        if let Command::Download {
            parallelization, ..
        } = &self.command
        {
            validate_range("parallelization", *parallelization, 1, 512)?;
        }
        Ok(())
    }
}

/// Test-only scoped environment mutation. Flag parsing falls back to process
/// environment variables, so tests that exercise (or must be isolated from)
/// those fallbacks serialize through one lock and restore the prior values
/// on drop.
#[cfg(all(test, feature = "cli"))]
pub(crate) mod test_env {
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    pub(crate) struct ScopedEnv {
        saved: Vec<(&'static str, Option<String>)>,
        _guard: MutexGuard<'static, ()>,
    }

    impl ScopedEnv {
        pub(crate) fn new(vars: &[(&'static str, Option<&str>)]) -> Self {
            let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let mut saved = Vec::with_capacity(vars.len());
            for (key, value) in vars {
                saved.push((*key, std::env::var(key).ok()));
                match value {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
            Self {
                saved,
                _guard: guard,
            }
        }
    }

    impl Drop for ScopedEnv {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                match value {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
