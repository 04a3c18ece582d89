use crate::core::download::COMPOSED_PREFIX;
use crate::domain::model::{ListRequest, ObjectEntry};
use crate::domain::ports::ObjectStore;
use crate::utils::error::{DatafluxError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DEFAULT_PAGE_SIZE: u32 = 5000;
const IDLE_POLL: Duration = Duration::from_millis(5);

// Printable ASCII alphabet used for range midpoints.
const MIN_CHAR: u8 = b' ';
const MAX_CHAR: u8 = b'~';
const RADIX: u32 = (MAX_CHAR - MIN_CHAR + 1) as u32;

/// A lexicographic slice of the object namespace: `start` inclusive, `end`
/// exclusive, `None` meaning unbounded on that side.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NameRange {
    start: Option<String>,
    end: Option<String>,
}

struct SharedState {
    queue: Mutex<VecDeque<NameRange>>,
    active: AtomicUsize,
}

/// Lists every object under a prefix with `num_workers` concurrent workers.
///
/// Workers pull name ranges from a shared queue. When a range turns out to
/// span multiple pages, the worker splits the unread remainder at a midpoint
/// name and pushes the far half back so idle workers pick it up. The merged
/// result is sorted and de-duplicated; staging objects under
/// [`COMPOSED_PREFIX`] are excluded.
pub struct ListingController {
    store: Arc<dyn ObjectStore>,
    num_workers: usize,
    prefix: String,
    list_timeout: Duration,
    page_size: u32,
}

impl ListingController {
    pub fn new(store: Arc<dyn ObjectStore>, num_workers: usize, prefix: impl Into<String>) -> Self {
        Self {
            store,
            num_workers: num_workers.max(1),
            prefix: prefix.into(),
            list_timeout: Duration::from_secs(30),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn run(&self) -> Result<Vec<ObjectEntry>> {
        let state = Arc::new(SharedState {
            queue: Mutex::new(VecDeque::from([NameRange {
                start: None,
                end: None,
            }])),
            active: AtomicUsize::new(0),
        });

        let mut join_set = tokio::task::JoinSet::new();
        for worker_id in 0..self.num_workers {
            let state = Arc::clone(&state);
            let store = Arc::clone(&self.store);
            let prefix = self.prefix.clone();
            let list_timeout = self.list_timeout;
            let page_size = self.page_size;
            let num_workers = self.num_workers;
            join_set.spawn(async move {
                run_worker(
                    worker_id,
                    state,
                    store,
                    prefix,
                    list_timeout,
                    page_size,
                    num_workers,
                )
                .await
            });
        }

        let mut merged: Vec<ObjectEntry> = Vec::new();
        let mut first_error: Option<DatafluxError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(items)) => merged.extend(items),
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(DatafluxError::WorkerError {
                            message: format!("listing worker panicked: {}", join_err),
                        });
                    }
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        merged.sort_by(|a, b| a.name.cmp(&b.name));
        merged.dedup_by(|a, b| a.name == b.name);
        Ok(merged)
    }
}

async fn run_worker(
    worker_id: usize,
    state: Arc<SharedState>,
    store: Arc<dyn ObjectStore>,
    prefix: String,
    list_timeout: Duration,
    page_size: u32,
    num_workers: usize,
) -> Result<Vec<ObjectEntry>> {
    let mut collected = Vec::new();

    loop {
        // Pop and mark active under the same lock so peers never observe an
        // empty queue with a stale idle count.
        let range = {
            let mut queue = state.queue.lock().expect("queue lock poisoned");
            match queue.pop_front() {
                Some(range) => {
                    state.active.fetch_add(1, Ordering::SeqCst);
                    Some(range)
                }
                None => None,
            }
        };

        let Some(range) = range else {
            if state.active.load(Ordering::SeqCst) == 0 {
                break;
            }
            tokio::time::sleep(IDLE_POLL).await;
            continue;
        };

        let outcome = process_range(
            &state,
            store.as_ref(),
            &prefix,
            range,
            list_timeout,
            page_size,
            num_workers,
            &mut collected,
        )
        .await;
        state.active.fetch_sub(1, Ordering::SeqCst);
        outcome?;
    }

    tracing::debug!("listing worker {} collected {} objects", worker_id, collected.len());
    Ok(collected)
}

#[allow(clippy::too_many_arguments)]
async fn process_range(
    state: &SharedState,
    store: &dyn ObjectStore,
    prefix: &str,
    mut range: NameRange,
    list_timeout: Duration,
    page_size: u32,
    num_workers: usize,
    collected: &mut Vec<ObjectEntry>,
) -> Result<()> {
    let mut page_token: Option<String> = None;

    loop {
        let request = ListRequest {
            prefix: prefix.to_string(),
            start_offset: range.start.clone(),
            end_offset: range.end.clone(),
            page_token: page_token.clone(),
            max_results: Some(page_size),
        };

        let page = match tokio::time::timeout(list_timeout, store.list_page(&request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DatafluxError::TimeoutError {
                    operation: "list".to_string(),
                    seconds: list_timeout.as_secs(),
                })
            }
        };

        let mut last_name: Option<String> = None;
        for item in page.items {
            last_name = Some(item.name.clone());
            if item.name.starts_with(COMPOSED_PREFIX) {
                continue;
            }
            collected.push(item);
        }

        let Some(token) = page.next_page_token else {
            return Ok(());
        };

        // More pages remain. If the queue is running dry, hand the far half
        // of the remainder to an idle worker and restart on the near half.
        if let Some(last) = &last_name {
            let queue_starved = {
                let queue = state.queue.lock().expect("queue lock poisoned");
                queue.len() < num_workers
            };
            if queue_starved {
                if let Some(mid) = midpoint(last, range.end.as_deref()) {
                    let far_half = NameRange {
                        start: Some(mid.clone()),
                        end: range.end.clone(),
                    };
                    state
                        .queue
                        .lock()
                        .expect("queue lock poisoned")
                        .push_back(far_half);
                    // The old page token encodes the old end offset, so the
                    // near half restarts from the last seen name (inclusive;
                    // the merge step drops the duplicate).
                    range.start = Some(last.clone());
                    range.end = Some(mid);
                    page_token = None;
                    continue;
                }
            }
        }

        page_token = Some(token);
    }
}

/// Computes a name strictly between `start` and `end` (`None` = unbounded
/// above), treating names as fractions in base-95 over printable ASCII.
/// Returns `None` when no in-between name exists in that alphabet.
fn midpoint(start: &str, end: Option<&str>) -> Option<String> {
    let in_alphabet = |s: &str| s.bytes().all(|b| (MIN_CHAR..=MAX_CHAR).contains(&b));
    if !in_alphabet(start) {
        return None;
    }
    if let Some(end) = end {
        if !in_alphabet(end) || end <= start {
            return None;
        }
    }

    let start_bytes = start.as_bytes();
    let end_bytes = end.map(str::as_bytes);
    let digits = start_bytes.len().max(end_bytes.map_or(0, <[u8]>::len)) + 1;

    // sum[0] is the integer slot; an unbounded end contributes exactly 1.0.
    let mut sum = vec![0u32; digits + 1];
    sum[0] = if end_bytes.is_none() { 1 } else { 0 };
    for i in 0..digits {
        let s_digit = start_bytes
            .get(i)
            .map_or(0, |&b| u32::from(b - MIN_CHAR));
        let e_digit = end_bytes
            .map_or(0, |e| e.get(i).map_or(0, |&b| u32::from(b - MIN_CHAR)));
        sum[i + 1] = s_digit + e_digit;
    }
    for i in (1..=digits).rev() {
        if sum[i] >= RADIX {
            sum[i] -= RADIX;
            sum[i - 1] += 1;
        }
    }

    // Divide by two, left to right, carrying the remainder down.
    let mut remainder = sum[0] % 2;
    let mut result_bytes = Vec::with_capacity(digits);
    for digit in sum.iter().skip(1) {
        let value = remainder * RADIX + digit;
        result_bytes.push((value / 2) as u8 + MIN_CHAR);
        remainder = value % 2;
    }

    let full = String::from_utf8(result_bytes).ok()?;
    let trimmed = full.trim_end_matches(MIN_CHAR as char).to_string();

    for candidate in [trimmed, full] {
        let above_start = candidate.as_str() > start;
        let below_end = end.map_or(true, |e| candidate.as_str() < e);
        if above_start && below_end {
            return Some(candidate);
        }
    }
    None
}
