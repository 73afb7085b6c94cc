//! Image acquisition pipeline.
//!
//! A bounded-concurrency download scheduler behind a two-tier cache:
//!
//! ```text
//! fetch(url) ──► MemoryCache ──► DiskCache ──► DownloadScheduler
//!                (decoded)       (raw bytes)    (bounded queue)
//!                    ▲               ▲               │
//!                    └───────────────┴── write-through on success
//!                                                    │
//!                              RequestCoalescer ◄────┘
//!                       (view slot + callbacks, fired once)
//! ```
//!
//! Callers never block: a fetch returns a cached image synchronously or
//! registers interest and returns nothing, with subscribers notified when
//! the download resolves. A job that exhausts its retries is dropped
//! permanently and its subscribers are never notified.

mod coalescer;
mod disk;
mod key;
mod memory;
mod scheduler;
mod service;

pub use coalescer::{
    CoalescerStats, ImageCallback, RequestCoalescer, ViewSubscriber, ViewToken, ViewUpdate,
};
pub use disk::{DiskCache, DiskCacheStats};
pub use key::ImageKey;
pub use memory::{MemoryCache, MemoryCacheStats};
pub use scheduler::{DownloadScheduler, Priority, SchedulerStats};
pub use service::ImageService;

use std::sync::Arc;

use thiserror::Error;

/// A decoded image, shared cheaply between cache, subscribers and callers.
pub type DecodedImage = Arc<image::DynamicImage>;

/// Cache-related errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during cache operations
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}
