//! Image acquisition façade.
//!
//! [`ImageService`] composes the two cache tiers, the request coalescer and
//! the download scheduler behind a single non-blocking `fetch`:
//!
//! 1. memory cache hit - the decoded image is returned synchronously with
//!    no side effects
//! 2. disk cache hit - the bytes are decoded, the memory cache populated,
//!    and the image returned synchronously
//! 3. otherwise the caller's subscribers are registered, the URL enqueued,
//!    and `None` returned; subscribers are notified when the download
//!    resolves

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::warn;

use crate::config::ImagePipelineConfig;
use crate::http::HttpClient;

use super::coalescer::{ImageCallback, RequestCoalescer, ViewSubscriber, ViewToken};
use super::disk::DiskCache;
use super::key::ImageKey;
use super::memory::MemoryCache;
use super::scheduler::{DownloadScheduler, Priority};
use super::{CacheError, DecodedImage};

/// Top-level domains recognized when stripping a site URL down to its host
/// for favicon lookup.
const FAVICON_TLDS: [&str; 5] = ["com", "org", "net", "gov", "co"];

/// Two-tier cached image acquisition with coalesced downloads.
pub struct ImageService<C: HttpClient + 'static> {
    memory: Arc<MemoryCache>,
    disk: Arc<DiskCache>,
    coalescer: Arc<RequestCoalescer>,
    scheduler: DownloadScheduler<C>,
    favicon_base: String,
}

impl<C: HttpClient + 'static> ImageService<C> {
    /// Creates the service, its caches and its scheduler.
    ///
    /// # Errors
    ///
    /// Returns an error if the disk cache directory cannot be created.
    pub fn new(http: C, config: ImagePipelineConfig, runtime: Handle) -> Result<Self, CacheError> {
        let memory = Arc::new(MemoryCache::new(config.memory_cache_bytes));
        let disk = Arc::new(DiskCache::new(config.cache_dir.clone())?);
        let coalescer = Arc::new(RequestCoalescer::new());
        let favicon_base = config.favicon_base.clone();

        let scheduler = DownloadScheduler::new(
            http,
            Arc::clone(&memory),
            Arc::clone(&disk),
            Arc::clone(&coalescer),
            config,
            runtime,
        );

        Ok(Self {
            memory,
            disk,
            coalescer,
            scheduler,
            favicon_base,
        })
    }

    /// Retrieves the image for the given URL at normal priority.
    ///
    /// Returns the image synchronously on a cache hit. Otherwise registers
    /// `view` (replacing any previous view registered for this URL) and
    /// appends `callback`, enqueues the download, and returns `None`.
    pub fn fetch(
        &self,
        url: &str,
        view: Option<ViewSubscriber>,
        callback: Option<ImageCallback>,
    ) -> Option<DecodedImage> {
        self.fetch_prioritized(url, Priority::Normal, view, callback)
    }

    /// Like [`fetch`](Self::fetch) with an explicit queue priority.
    pub fn fetch_prioritized(
        &self,
        url: &str,
        priority: Priority,
        view: Option<ViewSubscriber>,
        callback: Option<ImageCallback>,
    ) -> Option<DecodedImage> {
        let key = ImageKey::from_url(url);

        if let Some(image) = self.memory.get(&key) {
            return Some(image);
        }

        if let Some(bytes) = self.disk.get(&key) {
            match image::load_from_memory(&bytes) {
                Ok(decoded) => {
                    let image: DecodedImage = Arc::new(decoded);
                    self.memory.put(key, DecodedImage::clone(&image));
                    return Some(image);
                }
                Err(e) => {
                    // Corrupt file; fall through to a fresh download
                    warn!(url = url, error = %e, "Cached image failed to decode");
                }
            }
        }

        // Register before enqueueing so a fast resolution cannot slip
        // between the two.
        if let Some(view) = view {
            self.coalescer.register_view(&key, view);
        }
        if let Some(callback) = callback {
            self.coalescer.register_callback(&key, callback);
        }
        self.scheduler.enqueue(url, priority);

        None
    }

    /// Retrieves the favicon for a site URL via the favicon service.
    ///
    /// The site URL is stripped down to its domain, which is appended to
    /// the configured favicon base. One-shot image fetch; no view slot.
    pub fn fetch_favicon(
        &self,
        site_url: &str,
        callback: Option<ImageCallback>,
    ) -> Option<DecodedImage> {
        let domain = strip_to_domain(site_url);
        let url = format!("{}{}", self.favicon_base, domain);
        self.fetch(&url, None, callback)
    }

    /// Removes the view registration for a URL if it still belongs to the
    /// given token. Views call this on teardown.
    pub fn unregister_view(&self, url: &str, token: ViewToken) {
        self.coalescer
            .unregister_view(&ImageKey::from_url(url), token);
    }

    /// The memory cache tier.
    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    /// The disk cache tier.
    pub fn disk(&self) -> &DiskCache {
        &self.disk
    }

    /// The download scheduler.
    pub fn scheduler(&self) -> &DownloadScheduler<C> {
        &self.scheduler
    }

    /// The request coalescer.
    pub fn coalescer(&self) -> &RequestCoalescer {
        &self.coalescer
    }
}

/// Strips a site URL down to its domain-and-TLD component.
///
/// Walks the slash-separated components and returns the first one whose
/// final dot-separated label is a recognized TLD. Falls back to the input
/// unchanged when nothing matches.
fn strip_to_domain(url: &str) -> String {
    for component in url.split('/') {
        if let Some(last) = component.rsplit('.').next() {
            if FAVICON_TLDS.contains(&last) {
                return component.trim_start_matches("www.").to_string();
            }
        }
    }
    url.to_string()
}
