use anyhow::Context;
use clap::Parser;
use dataflux::utils::logger;
use dataflux::utils::monitor::SystemMonitor;
use dataflux::utils::report::{write_sponge_log, TestCase};
use dataflux::utils::validation::Validate;
use dataflux::{
    DatafluxError, GcsClient, ListingController, ListingReport, ObjectStore, PerfConfig,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() {
    let config = PerfConfig::parse();

    if config.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(config.verbose);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    let monitor = SystemMonitor::new(config.monitor);
    if monitor.is_enabled() {
        monitor.log_stats("startup");
    }

    let started = Instant::now();
    let outcome = run(&config, &monitor).await;
    let elapsed = started.elapsed();
    monitor.log_final_stats();

    let case = match &outcome {
        Ok(report) => TestCase::passed("list_only", report.elapsed),
        Err(e) => TestCase::failed("list_only", elapsed, e.to_string()),
    };
    if let Some(results_dir) = &config.results_dir {
        if let Err(err) = write_artifact(results_dir, &case) {
            tracing::warn!("failed to write sponge log: {:#}", err);
        }
    }

    if let Err(e) = outcome {
        tracing::error!("❌ Performance run failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }
}

async fn run(config: &PerfConfig, monitor: &SystemMonitor) -> dataflux::Result<ListingReport> {
    let mut client = match &config.api_endpoint {
        Some(endpoint) => GcsClient::with_base_url(&config.bucket, endpoint)?,
        None => GcsClient::new(&config.bucket)?,
    };
    if let Some(token) = GcsClient::auth_token_from_env() {
        client = client.with_auth_token(token);
    }
    let store: Arc<dyn ObjectStore> = Arc::new(client);

    if let Some(project) = &config.project {
        tracing::info!("Project: {}", project);
    }
    tracing::info!(
        "Listing operation started: gs://{}/{} with {} workers",
        config.bucket,
        config.prefix,
        config.num_workers
    );

    let controller = ListingController::new(store, config.num_workers, &config.prefix)
        .with_list_timeout(Duration::from_secs(config.list_timeout));

    let list_start = Instant::now();
    let objects = controller.run().await?;
    let elapsed = list_start.elapsed();

    monitor.log_stats("listing complete");

    let report = ListingReport {
        object_count: objects.len() as u64,
        total_bytes: objects.iter().map(|o| o.size).sum(),
        elapsed,
        workers: config.num_workers,
    };

    println!(
        "{} objects listed in {} seconds",
        report.object_count,
        report.elapsed.as_secs_f64()
    );
    tracing::info!(
        "Listed {} objects ({} bytes) at {:.0} objects/second",
        report.object_count,
        report.total_bytes,
        report.objects_per_second()
    );

    if let Some(expected) = config.bucket_file_count {
        if report.object_count != expected {
            return Err(DatafluxError::CountMismatchError {
                expected,
                actual: report.object_count,
            });
        }
    }
    if let Some(expected) = config.bucket_file_size {
        if report.total_bytes != expected {
            return Err(DatafluxError::SizeMismatchError {
                expected,
                actual: report.total_bytes,
            });
        }
    }

    Ok(report)
}

fn write_artifact(results_dir: &Path, case: &TestCase) -> anyhow::Result<()> {
    let suite_dir = results_dir.join("integration_tests");
    let path = write_sponge_log(&suite_dir, "dataflux_perf", std::slice::from_ref(case))
        .context("writing sponge log artifact")?;
    tracing::info!("Test results written to {}", path.display());
    Ok(())
}
