use crate::domain::model::ObjectEntry;
use crate::domain::ports::ObjectStore;
use crate::utils::error::{DatafluxError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// The object store composes at most this many sources per request.
pub const MAX_OBJECTS_PER_COMPOSE: usize = 32;

/// Staging prefix for temporary composite objects. Listing skips this prefix
/// so concurrent downloads never pollute listing results.
pub const COMPOSED_PREFIX: &str = "dataflux-composed-objects/";

#[derive(Debug, Clone)]
pub struct DownloadParams {
    /// Objects up to this size are candidates for compose batching; larger
    /// ones are always downloaded individually.
    pub max_compose_bytes: u64,
    /// Bound on each individual download call.
    pub download_timeout: Duration,
}

impl Default for DownloadParams {
    fn default() -> Self {
        Self {
            max_compose_bytes: 100_000_000,
            download_timeout: Duration::from_secs(60),
        }
    }
}

async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DatafluxError::TimeoutError {
            operation: operation.to_string(),
            seconds: limit.as_secs(),
        }),
    }
}

/// Downloads the full contents of one object, bounded by `timeout`.
pub async fn download_single(
    store: &dyn ObjectStore,
    object_name: &str,
    timeout: Duration,
) -> Result<Vec<u8>> {
    with_timeout("download", timeout, store.download(object_name)).await
}

/// Downloads a composite object and slices it back into the source objects
/// by their recorded sizes. A length mismatch is logged and the (clamped)
/// slices are still returned; the caller decides whether that is fatal.
pub async fn decompose(
    store: &dyn ObjectStore,
    composite_name: &str,
    objects: &[ObjectEntry],
    timeout: Duration,
) -> Result<Vec<Vec<u8>>> {
    let content = download_single(store, composite_name, timeout).await?;

    let mut slices = Vec::with_capacity(objects.len());
    let mut offset: usize = 0;
    for object in objects {
        let start = offset.min(content.len());
        let end = (offset + object.size as usize).min(content.len());
        slices.push(content[start..end].to_vec());
        offset += object.size as usize;
    }

    if offset != content.len() {
        tracing::error!(
            "decomposed object length = {} bytes, wanted = {} bytes",
            offset,
            content.len()
        );
    }
    Ok(slices)
}

/// Downloads `objects` using the dataflux algorithm: large objects are
/// fetched directly; runs of small objects are composed server-side into a
/// staging object, downloaded once, sliced apart, and the staging object is
/// deleted. Output buffers are positionally aligned with `objects`.
pub async fn download_objects(
    store: &dyn ObjectStore,
    objects: &[ObjectEntry],
    params: &DownloadParams,
) -> Result<Vec<Vec<u8>>> {
    let mut results = Vec::with_capacity(objects.len());
    let mut i = 0;

    while i < objects.len() {
        let current = &objects[i];

        if current.size > params.max_compose_bytes {
            results.push(download_single(store, &current.name, params.download_timeout).await?);
            i += 1;
            continue;
        }

        // Greedily batch while the cumulative size stays under the cap and
        // the compose source limit is not hit.
        let mut batch: Vec<ObjectEntry> = Vec::new();
        let mut batch_bytes: u64 = 0;
        while i < objects.len()
            && batch_bytes <= params.max_compose_bytes
            && batch.len() < MAX_OBJECTS_PER_COMPOSE
        {
            batch_bytes += objects[i].size;
            batch.push(objects[i].clone());
            i += 1;
        }

        if batch.len() == 1 {
            results.push(download_single(store, &batch[0].name, params.download_timeout).await?);
            continue;
        }

        // Composite names are unique so concurrent runs never mutate the
        // same staging object.
        let staged_name = format!("{}{}", COMPOSED_PREFIX, Uuid::new_v4());
        store.compose(&staged_name, &batch).await?;
        let slices = decompose(store, &staged_name, &batch, params.download_timeout).await?;
        results.extend(slices);

        if let Err(err) = store.delete(&staged_name).await {
            tracing::error!("failed to delete composite object {}: {}", staged_name, err);
        }
    }

    Ok(results)
}

/// Fans `objects` out over `parallelization` tasks, each running the compose
/// download over a contiguous chunk. Results keep the input order.
pub async fn parallel_download(
    store: Arc<dyn ObjectStore>,
    objects: Vec<ObjectEntry>,
    params: DownloadParams,
    parallelization: usize,
) -> Result<Vec<Vec<u8>>> {
    if objects.is_empty() {
        return Ok(Vec::new());
    }
    let parallelization = parallelization.max(1);
    let chunk_size = objects.len().div_ceil(parallelization);

    let mut join_set = tokio::task::JoinSet::new();
    for (index, chunk) in objects.chunks(chunk_size).enumerate() {
        let store = Arc::clone(&store);
        let params = params.clone();
        let chunk = chunk.to_vec();
        join_set.spawn(async move {
            let buffers = download_objects(store.as_ref(), &chunk, &params).await?;
            Ok::<_, DatafluxError>((index, buffers))
        });
    }

    let mut chunks: Vec<Option<Vec<Vec<u8>>>> = vec![None; join_set.len()];
    while let Some(joined) = join_set.join_next().await {
        let (index, buffers) = joined.map_err(|e| DatafluxError::WorkerError {
            message: format!("download task panicked: {}", e),
        })??;
        chunks[index] = Some(buffers);
    }

    let mut results = Vec::with_capacity(objects.len());
    for chunk in chunks {
        results.extend(chunk.unwrap_or_default());
    }
    Ok(results)
}
