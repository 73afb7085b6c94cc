//! Bounded-concurrency download scheduler.
//!
//! Jobs move `queued -> active -> {resolved | retry-queued | dropped}`.
//! The queue is FIFO with high-priority insertions at the front, and at most
//! `max_concurrent_downloads` jobs are active at once. A URL already queued
//! or active is never enqueued again, so no two fetches for the same URL are
//! ever in flight concurrently.
//!
//! On success the raw bytes are written through to the disk cache, the
//! decoded image to the memory cache, and the URL is handed to the
//! [`RequestCoalescer`] for resolution. Transient fetch failures re-enter
//! the queue at normal priority up to `max_retries` times; after that the
//! job is dropped permanently and its subscribers are never notified.
//! Undecodable payloads are dropped without retry.
//!
//! Every job carries a `CancellationToken`; cancelling it drops the job at
//! the next opportunity without resolving subscribers.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ImagePipelineConfig;
use crate::http::{FetchError, HttpClient};

use super::coalescer::RequestCoalescer;
use super::disk::DiskCache;
use super::key::ImageKey;
use super::memory::MemoryCache;
use super::DecodedImage;

/// Priority of a download request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Standard request, appended to the queue.
    #[default]
    Normal,
    /// Urgent request, inserted at the queue front.
    High,
}

/// Counters exposed for monitoring and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    /// Jobs that fetched, decoded and resolved subscribers
    pub resolved: u64,
    /// Jobs dropped permanently (retries exhausted, undecodable payload,
    /// or cancelled)
    pub dropped: u64,
    /// Transient failures that were re-queued
    pub retries: u64,
}

/// A job waiting in the queue or being retried.
struct QueuedJob {
    key: ImageKey,
    url: String,
    retry_count: u32,
    cancel: CancellationToken,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<QueuedJob>,
    queued: HashSet<ImageKey>,
    active: HashMap<ImageKey, CancellationToken>,
}

/// Bounded download worker pool over a priority queue of URLs.
pub struct DownloadScheduler<C: HttpClient + 'static> {
    inner: Arc<SchedulerInner<C>>,
}

struct SchedulerInner<C> {
    http: C,
    memory: Arc<MemoryCache>,
    disk: Arc<DiskCache>,
    coalescer: Arc<RequestCoalescer>,
    config: ImagePipelineConfig,
    runtime: Handle,
    state: Mutex<QueueState>,
    stats: Mutex<SchedulerStats>,
}

impl<C: HttpClient + 'static> DownloadScheduler<C> {
    /// Creates a scheduler that spawns its workers on the given runtime.
    pub fn new(
        http: C,
        memory: Arc<MemoryCache>,
        disk: Arc<DiskCache>,
        coalescer: Arc<RequestCoalescer>,
        config: ImagePipelineConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                http,
                memory,
                disk,
                coalescer,
                config,
                runtime,
                state: Mutex::new(QueueState::default()),
                stats: Mutex::new(SchedulerStats::default()),
            }),
        }
    }

    /// Adds the URL to the queue if it is not already queued or active,
    /// then pumps.
    ///
    /// Returns the job's cancellation token; for an already-tracked URL the
    /// existing job's token is returned.
    pub fn enqueue(&self, url: &str, priority: Priority) -> CancellationToken {
        let key = ImageKey::from_url(url);
        let token = {
            let mut state = self.inner.state.lock().unwrap();

            if let Some(token) = state.active.get(&key) {
                return token.clone();
            }
            if state.queued.contains(&key) {
                if let Some(job) = state.queue.iter().find(|j| j.key == key) {
                    return job.cancel.clone();
                }
            }

            let token = CancellationToken::new();
            let job = QueuedJob {
                key: key.clone(),
                url: url.to_string(),
                retry_count: 0,
                cancel: token.clone(),
            };
            match priority {
                Priority::High => state.queue.push_front(job),
                Priority::Normal => state.queue.push_back(job),
            }
            state.queued.insert(key);
            token
        };

        self.pump();
        token
    }

    /// Starts queued jobs while concurrency slots are free.
    ///
    /// Idempotent and safe to call at any time; never leaves more than
    /// `max_concurrent_downloads` jobs active.
    pub fn pump(&self) {
        self.inner.pump();
    }

    /// Number of downloads currently in flight.
    pub fn active_count(&self) -> usize {
        self.inner.state.lock().unwrap().active.len()
    }

    /// Number of jobs waiting in the queue.
    pub fn queued_count(&self) -> usize {
        self.inner.state.lock().unwrap().queue.len()
    }

    /// Snapshot of the scheduler statistics.
    pub fn stats(&self) -> SchedulerStats {
        *self.inner.stats.lock().unwrap()
    }
}

impl<C: HttpClient + 'static> SchedulerInner<C> {
    fn pump(self: &Arc<Self>) {
        loop {
            let job = {
                let mut state = self.state.lock().unwrap();
                if state.active.len() >= self.config.max_concurrent_downloads {
                    return;
                }
                let Some(job) = state.queue.pop_front() else {
                    return;
                };
                state.queued.remove(&job.key);
                if job.cancel.is_cancelled() {
                    None
                } else {
                    state.active.insert(job.key.clone(), job.cancel.clone());
                    Some(job)
                }
            };

            match job {
                Some(job) => {
                    let inner = Arc::clone(self);
                    self.runtime.spawn(inner.run_job(job));
                }
                None => {
                    self.stats.lock().unwrap().dropped += 1;
                }
            }
        }
    }

    async fn run_job(self: Arc<Self>, job: QueuedJob) {
        let fetched = tokio::select! {
            biased;

            _ = job.cancel.cancelled() => None,
            result = self.http.get(&job.url) => Some(result),
        };

        match fetched {
            None => {
                debug!(url = %job.url, "Download cancelled");
                self.finish(&job.key, |stats| stats.dropped += 1);
            }
            Some(Ok(bytes)) => match image::load_from_memory(&bytes) {
                Ok(decoded) => {
                    let image: DecodedImage = Arc::new(decoded);

                    // Write-through: disk first, then memory, then resolve.
                    // A failed disk write degrades to a memory-only entry.
                    if let Err(e) = self.disk.put(&job.key, &bytes) {
                        warn!(url = %job.url, error = %e, "Disk cache write failed");
                    }
                    self.memory.put(job.key.clone(), DecodedImage::clone(&image));
                    self.coalescer.resolve(&job.key, image);

                    debug!(
                        url = %job.url,
                        retry_count = job.retry_count,
                        "Download resolved"
                    );
                    self.finish(&job.key, |stats| stats.resolved += 1);
                }
                Err(e) => {
                    warn!(url = %job.url, error = %e, "Undecodable image payload dropped");
                    self.finish(&job.key, |stats| stats.dropped += 1);
                }
            },
            Some(Err(error)) => self.retry_or_drop(job, error),
        }
    }

    /// Releases the job's concurrency slot, applies the stat update and
    /// pumps the next queued job.
    fn finish(self: &Arc<Self>, key: &ImageKey, update: impl FnOnce(&mut SchedulerStats)) {
        self.state.lock().unwrap().active.remove(key);
        update(&mut self.stats.lock().unwrap());
        self.pump();
    }

    fn retry_or_drop(self: &Arc<Self>, mut job: QueuedJob, error: FetchError) {
        if job.retry_count < self.config.max_retries {
            job.retry_count += 1;
            debug!(
                url = %job.url,
                retry_count = job.retry_count,
                error = %error,
                "Transient fetch failure, re-queueing"
            );
            self.stats.lock().unwrap().retries += 1;

            // Slot release and re-queue under one lock so a concurrent
            // enqueue cannot duplicate the job. Retries re-enter at
            // normal priority.
            let mut state = self.state.lock().unwrap();
            state.active.remove(&job.key);
            state.queued.insert(job.key.clone());
            state.queue.push_back(job);
        } else {
            warn!(
                url = %job.url,
                attempts = job.retry_count + 1,
                error = %error,
                "Download dropped permanently; subscribers will not be notified"
            );
            self.state.lock().unwrap().active.remove(&job.key);
            self.stats.lock().unwrap().dropped += 1;
        }

        self.pump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Transport serving scripted responses, optionally gated so jobs can
    /// be held in flight by the test.
    struct ScriptedHttp {
        responses: Mutex<VecDeque<Result<Vec<u8>, FetchError>>>,
        requests: Mutex<Vec<String>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl ScriptedHttp {
        fn new(responses: Vec<Result<Vec<u8>, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
                gate: None,
            })
        }

        fn gated(responses: Vec<Result<Vec<u8>, FetchError>>, gate: Arc<Semaphore>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
                gate: Some(gate),
            })
        }

        fn requested(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl HttpClient for Arc<ScriptedHttp> {
        async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            let mut responses = self.responses.lock().unwrap();
            responses
                .pop_front()
                .unwrap_or_else(|| Ok(test_png_bytes()))
        }
    }

    fn test_png_bytes() -> Vec<u8> {
        use image::{Rgba, RgbaImage};
        let img = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        buffer
    }

    struct Fixture {
        scheduler: DownloadScheduler<Arc<ScriptedHttp>>,
        memory: Arc<MemoryCache>,
        disk: Arc<DiskCache>,
        coalescer: Arc<RequestCoalescer>,
        _dir: tempfile::TempDir,
    }

    fn fixture(http: Arc<ScriptedHttp>, config: ImagePipelineConfig) -> Fixture {
        let dir = tempfile::TempDir::new().unwrap();
        let memory = Arc::new(MemoryCache::new(config.memory_cache_bytes));
        let disk = Arc::new(DiskCache::new(dir.path().to_path_buf()).unwrap());
        let coalescer = Arc::new(RequestCoalescer::new());
        let scheduler = DownloadScheduler::new(
            http,
            Arc::clone(&memory),
            Arc::clone(&disk),
            Arc::clone(&coalescer),
            config,
            Handle::current(),
        );
        Fixture {
            scheduler,
            memory,
            disk,
            coalescer,
            _dir: dir,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn test_config(max_concurrent: usize) -> ImagePipelineConfig {
        ImagePipelineConfig::default().with_max_concurrent(max_concurrent)
    }

    #[tokio::test]
    async fn test_single_fetch_resolves_and_fills_caches() {
        let http = ScriptedHttp::new(vec![]);
        let f = fixture(Arc::clone(&http), test_config(5));
        let url = "http://img.example.com/pie.jpg";
        let key = ImageKey::from_url(url);

        f.scheduler.enqueue(url, Priority::Normal);

        wait_until(|| f.scheduler.stats().resolved == 1).await;
        assert!(f.memory.contains(&key));
        assert!(f.disk.contains(&key));
        assert_eq!(http.requested(), vec![url.to_string()]);
        assert_eq!(f.scheduler.active_count(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_dedups_queued_and_active() {
        let gate = Arc::new(Semaphore::new(0));
        let http = ScriptedHttp::gated(vec![], Arc::clone(&gate));
        let f = fixture(Arc::clone(&http), test_config(5));
        let url = "http://img.example.com/pie.jpg";

        f.scheduler.enqueue(url, Priority::Normal);
        wait_until(|| f.scheduler.active_count() == 1).await;

        // Second enqueue while active is a no-op
        f.scheduler.enqueue(url, Priority::Normal);
        assert_eq!(f.scheduler.active_count(), 1);
        assert_eq!(f.scheduler.queued_count(), 0);

        gate.add_permits(1);
        wait_until(|| f.scheduler.stats().resolved == 1).await;

        // Exactly one network fetch happened
        assert_eq!(http.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_bound_is_respected() {
        let gate = Arc::new(Semaphore::new(0));
        let http = ScriptedHttp::gated(vec![], Arc::clone(&gate));
        let f = fixture(Arc::clone(&http), test_config(2));

        for n in 0..5 {
            f.scheduler
                .enqueue(&format!("http://img.example.com/{n}.jpg"), Priority::Normal);
        }

        wait_until(|| f.scheduler.active_count() == 2).await;
        assert_eq!(f.scheduler.queued_count(), 3);

        gate.add_permits(5);
        wait_until(|| f.scheduler.stats().resolved == 5).await;
        assert_eq!(f.scheduler.active_count(), 0);
        assert_eq!(f.scheduler.queued_count(), 0);
    }

    #[tokio::test]
    async fn test_high_priority_jumps_the_queue() {
        let gate = Arc::new(Semaphore::new(0));
        let http = ScriptedHttp::gated(vec![], Arc::clone(&gate));
        let f = fixture(Arc::clone(&http), test_config(1));

        f.scheduler.enqueue("http://img.example.com/busy.jpg", Priority::Normal);
        wait_until(|| f.scheduler.active_count() == 1).await;

        f.scheduler.enqueue("http://img.example.com/a.jpg", Priority::Normal);
        f.scheduler.enqueue("http://img.example.com/b.jpg", Priority::Normal);
        f.scheduler.enqueue("http://img.example.com/urgent.jpg", Priority::High);

        gate.add_permits(4);
        wait_until(|| f.scheduler.stats().resolved == 4).await;

        let requests = http.requested();
        assert_eq!(requests[0], "http://img.example.com/busy.jpg");
        assert_eq!(requests[1], "http://img.example.com/urgent.jpg");
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_succeeds() {
        let http = ScriptedHttp::new(vec![
            Err(FetchError::Transport("reset".to_string())),
            Ok(test_png_bytes()),
        ]);
        let f = fixture(Arc::clone(&http), test_config(5));
        let url = "http://img.example.com/flaky.jpg";

        let got = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&got);
        f.coalescer.register_callback(
            &ImageKey::from_url(url),
            Box::new(move |_| *counter.lock().unwrap() += 1),
        );

        f.scheduler.enqueue(url, Priority::Normal);
        wait_until(|| f.scheduler.stats().resolved == 1).await;

        let stats = f.scheduler.stats();
        assert_eq!(stats.retries, 1, "one transient failure was retried");
        assert_eq!(stats.dropped, 0);
        assert_eq!(*got.lock().unwrap(), 1, "exactly one resolution");
        assert_eq!(http.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_drops_permanently() {
        let http = ScriptedHttp::new(vec![
            Err(FetchError::Transport("reset".to_string())),
            Err(FetchError::Transport("reset".to_string())),
            Err(FetchError::Transport("reset".to_string())),
        ]);
        let f = fixture(Arc::clone(&http), test_config(5).with_max_retries(1));
        let url = "http://img.example.com/dead.jpg";
        let key = ImageKey::from_url(url);

        f.coalescer.register_callback(&key, Box::new(|_| panic!("must never resolve")));
        f.scheduler.enqueue(url, Priority::Normal);

        wait_until(|| f.scheduler.stats().dropped == 1).await;

        // Initial attempt + one retry
        assert_eq!(http.requested().len(), 2);
        assert_eq!(f.scheduler.stats().retries, 1);
        // Subscribers are never notified and stay registered
        assert!(f.coalescer.has_pending(&key));
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_dropped_without_retry() {
        let http = ScriptedHttp::new(vec![Ok(b"not an image".to_vec())]);
        let f = fixture(Arc::clone(&http), test_config(5).with_max_retries(3));
        let url = "http://img.example.com/garbage.jpg";

        f.scheduler.enqueue(url, Priority::Normal);
        wait_until(|| f.scheduler.stats().dropped == 1).await;

        assert_eq!(http.requested().len(), 1, "decode failures are not retried");
        assert_eq!(f.scheduler.stats().retries, 0);
        assert!(!f.memory.contains(&ImageKey::from_url(url)));
    }

    #[tokio::test]
    async fn test_cancelled_queued_job_never_fetches() {
        let gate = Arc::new(Semaphore::new(0));
        let http = ScriptedHttp::gated(vec![], Arc::clone(&gate));
        let f = fixture(Arc::clone(&http), test_config(1));

        f.scheduler.enqueue("http://img.example.com/busy.jpg", Priority::Normal);
        wait_until(|| f.scheduler.active_count() == 1).await;

        let token = f
            .scheduler
            .enqueue("http://img.example.com/doomed.jpg", Priority::Normal);
        token.cancel();

        gate.add_permits(2);
        wait_until(|| f.scheduler.stats().resolved == 1).await;
        wait_until(|| f.scheduler.stats().dropped == 1).await;

        assert_eq!(http.requested(), vec!["http://img.example.com/busy.jpg"]);
    }

    #[tokio::test]
    async fn test_pump_is_idempotent() {
        let http = ScriptedHttp::new(vec![]);
        let f = fixture(Arc::clone(&http), test_config(5));

        f.scheduler.pump();
        f.scheduler.pump();
        assert_eq!(f.scheduler.active_count(), 0);

        f.scheduler.enqueue("http://img.example.com/a.jpg", Priority::Normal);
        f.scheduler.pump();
        f.scheduler.pump();

        wait_until(|| f.scheduler.stats().resolved == 1).await;
        assert_eq!(f.scheduler.stats().resolved, 1);
    }
}
