//! End-to-end tests for the image acquisition pipeline.
//!
//! Exercises the composed service: two-tier cache, coalesced downloads,
//! bounded concurrency, retry and permanent drop.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use recipestream::config::ImagePipelineConfig;
use recipestream::http::{FetchError, HttpClient};
use recipestream::image::{DecodedImage, ImageKey, ImageService, ViewSubscriber};

/// Transport replaying scripted responses; unscripted requests get a valid
/// PNG.
struct ScriptedHttp {
    responses: Mutex<VecDeque<Result<Vec<u8>, FetchError>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedHttp {
    fn new(responses: Vec<Result<Vec<u8>, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Shareable transport handle. The orphan rule forbids implementing the
/// crate-foreign `HttpClient` trait directly for `Arc<ScriptedHttp>` from this
/// (integration-test) crate, so a local newtype carries the impl and forwards
/// to the shared `ScriptedHttp`.
#[derive(Clone)]
struct SharedHttp(Arc<ScriptedHttp>);

impl HttpClient for SharedHttp {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.0.requests.lock().unwrap().push(url.to_string());
        self.0
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(png_bytes()))
    }
}

fn png_bytes() -> Vec<u8> {
    use image::{Rgba, RgbaImage};
    let img = RgbaImage::from_pixel(4, 4, Rgba([12, 34, 56, 255]));
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
    buffer
}

fn new_service(
    http: Arc<ScriptedHttp>,
    cache_dir: &std::path::Path,
) -> ImageService<SharedHttp> {
    let config = ImagePipelineConfig::default().with_cache_dir(cache_dir.to_path_buf());
    ImageService::new(SharedHttp(http), config, Handle::current()).unwrap()
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

#[tokio::test]
async fn cold_fetch_resolves_subscribers_and_warms_both_tiers() {
    let http = ScriptedHttp::new(vec![]);
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(Arc::clone(&http), dir.path());

    let url = "http://img.example.com/apple-pie.jpg";
    let (tx, mut rx) = mpsc::unbounded_channel();
    let callback_hits = Arc::new(Mutex::new(0u32));

    let counter = Arc::clone(&callback_hits);
    let first = service.fetch(
        url,
        Some(ViewSubscriber::new(tx)),
        Some(Box::new(move |_| *counter.lock().unwrap() += 1)),
    );
    assert!(first.is_none(), "cold fetch is pending");

    wait_until(|| service.scheduler().stats().resolved == 1).await;

    let update = rx.recv().await.expect("view update delivered");
    assert_eq!(update.key, ImageKey::from_url(url));
    assert_eq!(*callback_hits.lock().unwrap(), 1);

    // Both tiers are now warm and the next fetch is synchronous
    assert!(service.memory().contains(&ImageKey::from_url(url)));
    assert!(service.disk().contains(&ImageKey::from_url(url)));
    assert!(service.fetch(url, None, None).is_some());
    assert_eq!(http.request_count(), 1);
}

#[tokio::test]
async fn disk_tier_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = "http://img.example.com/apple-pie.jpg";

    {
        let http = ScriptedHttp::new(vec![]);
        let service = new_service(Arc::clone(&http), dir.path());
        service.fetch(url, None, None);
        wait_until(|| service.scheduler().stats().resolved == 1).await;
    }

    // A fresh service over the same cache dir serves from disk, no network
    let http = ScriptedHttp::new(vec![]);
    let service = new_service(Arc::clone(&http), dir.path());

    let image = service.fetch(url, None, None);
    assert!(image.is_some());
    assert_eq!(http.request_count(), 0);
}

#[tokio::test]
async fn concurrent_fetches_for_same_url_share_one_download() {
    let http = ScriptedHttp::new(vec![]);
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(Arc::clone(&http), dir.path());

    let url = "http://img.example.com/shared.jpg";
    let delivered: Arc<Mutex<Vec<DecodedImage>>> = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..3 {
        let sink = Arc::clone(&delivered);
        let pending = service.fetch(
            url,
            None,
            Some(Box::new(move |image| sink.lock().unwrap().push(image))),
        );
        assert!(pending.is_none());
    }

    wait_until(|| delivered.lock().unwrap().len() == 3).await;

    assert_eq!(http.request_count(), 1, "one network fetch for all callers");
    let delivered = delivered.lock().unwrap();
    assert!(Arc::ptr_eq(&delivered[0], &delivered[1]));
    assert!(Arc::ptr_eq(&delivered[1], &delivered[2]));
}

#[tokio::test]
async fn transient_failure_retries_and_subscribers_resolve_once() {
    let http = ScriptedHttp::new(vec![
        Err(FetchError::Transport("connection reset".to_string())),
        Ok(png_bytes()),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(Arc::clone(&http), dir.path());

    let url = "http://img.example.com/flaky.jpg";
    let hits = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&hits);
    service.fetch(url, None, Some(Box::new(move |_| *counter.lock().unwrap() += 1)));

    wait_until(|| service.scheduler().stats().resolved == 1).await;

    let stats = service.scheduler().stats();
    assert_eq!(stats.retries, 1, "retry count observed at success time");
    assert_eq!(*hits.lock().unwrap(), 1, "exactly one resolution");
    assert_eq!(http.request_count(), 2);
}

#[tokio::test]
async fn exhausted_retries_drop_silently() {
    let http = ScriptedHttp::new(vec![
        Err(FetchError::Status {
            status: 503,
            url: "http://img.example.com/dead.jpg".to_string(),
        }),
        Err(FetchError::Status {
            status: 503,
            url: "http://img.example.com/dead.jpg".to_string(),
        }),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(Arc::clone(&http), dir.path());

    let url = "http://img.example.com/dead.jpg";
    service.fetch(url, None, Some(Box::new(|_| panic!("dropped jobs never resolve"))));

    wait_until(|| service.scheduler().stats().dropped == 1).await;

    // Default max_retries is 1: initial attempt plus one retry
    assert_eq!(http.request_count(), 2);
    assert!(!service.memory().contains(&ImageKey::from_url(url)));
    assert!(!service.disk().contains(&ImageKey::from_url(url)));
}

#[tokio::test]
async fn active_downloads_never_exceed_bound() {
    let http = ScriptedHttp::new(vec![]);
    let dir = tempfile::tempdir().unwrap();
    let config = ImagePipelineConfig::default()
        .with_cache_dir(dir.path().to_path_buf())
        .with_max_concurrent(2);
    let service = ImageService::new(SharedHttp(Arc::clone(&http)), config, Handle::current()).unwrap();

    for n in 0..10 {
        service.fetch(&format!("http://img.example.com/{n}.jpg"), None, None);
        assert!(service.scheduler().active_count() <= 2);
    }

    wait_until(|| service.scheduler().stats().resolved == 10).await;
    assert_eq!(service.scheduler().active_count(), 0);
    assert_eq!(service.scheduler().queued_count(), 0);
}
