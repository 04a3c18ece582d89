use clap::Parser;
use dataflux::core::download::{parallel_download, DownloadParams};
use dataflux::utils::logger;
use dataflux::utils::validation::Validate;
use dataflux::{CliConfig, Command, GcsClient, ListingController, LocalStorage, ObjectStore, Storage};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() {
    let config = CliConfig::parse();

    if config.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting dataflux CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    if let Err(e) = run(config).await {
        tracing::error!("❌ Run failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }
}

async fn run(config: CliConfig) -> dataflux::Result<()> {
    let mut client = match &config.api_endpoint {
        Some(endpoint) => GcsClient::with_base_url(&config.bucket, endpoint)?,
        None => GcsClient::new(&config.bucket)?,
    };
    if let Some(token) = GcsClient::auth_token_from_env() {
        client = client.with_auth_token(token);
    }
    let store: Arc<dyn ObjectStore> = Arc::new(client);

    if !config.project.is_empty() {
        tracing::info!("Project: {}", config.project);
    }
    tracing::info!(
        "Listing gs://{}/{} with {} workers",
        config.bucket,
        config.prefix,
        config.num_workers
    );

    let controller = ListingController::new(Arc::clone(&store), config.num_workers, &config.prefix)
        .with_list_timeout(Duration::from_secs(config.list_timeout));

    let list_start = Instant::now();
    let objects = controller.run().await?;
    let list_elapsed = list_start.elapsed();
    let total_bytes: u64 = objects.iter().map(|o| o.size).sum();

    tracing::info!(
        "{} objects listed in {:.3} seconds ({} bytes)",
        objects.len(),
        list_elapsed.as_secs_f64(),
        total_bytes
    );
    println!(
        "{} objects listed in {:.3} seconds",
        objects.len(),
        list_elapsed.as_secs_f64()
    );

    match config.command {
        Command::List => Ok(()),
        Command::Download {
            max_compose_bytes,
            download_timeout,
            parallelization,
            output_path,
        } => {
            let params = DownloadParams {
                max_compose_bytes,
                download_timeout: Duration::from_secs(download_timeout),
            };

            let download_start = Instant::now();
            let buffers =
                parallel_download(store, objects.clone(), params, parallelization).await?;
            let download_elapsed = download_start.elapsed();

            let storage = LocalStorage::new(output_path.to_string_lossy().into_owned());
            for (object, data) in objects.iter().zip(&buffers) {
                storage.write_file(&object.name, data).await?;
            }

            tracing::info!(
                "{} objects ({} bytes) downloaded in {:.3} seconds",
                objects.len(),
                total_bytes,
                download_elapsed.as_secs_f64()
            );
            println!(
                "✅ Downloaded {} objects to {}",
                objects.len(),
                output_path.display()
            );
            Ok(())
        }
    }
}
