//! Request coalescing for image downloads.
//!
//! Multiple callers asking for the same URL before it resolves share one
//! underlying download. Per URL the coalescer tracks:
//!
//! - at most one **view subscriber**: the most recent caller that wants a
//!   display update. Registration overwrites any previous subscriber for
//!   the URL (last-requester-wins); a cell being recycled to show a
//!   different recipe must not be repainted with the old image.
//! - an ordered list of **one-shot callbacks**, all of which are preserved
//!   and all of which fire.
//!
//! On `resolve` the view subscriber is notified first, then every callback
//! in registration order, then both are cleared - each URL resolves its
//! subscribers exactly once per successful fetch. A permanently dropped
//! download never resolves, so its subscribers are never notified.
//!
//! View notifications are delivered over an `mpsc` channel the embedding
//! application drains on its coordination context (the UI thread
//! equivalent); callback invocation happens wherever `resolve` runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::key::ImageKey;
use super::DecodedImage;

/// Global counter for view tokens.
static VIEW_TOKEN_COUNTER: AtomicU64 = AtomicU64::new(1);

/// One-shot callback invoked with the resolved image.
pub type ImageCallback = Box<dyn FnOnce(DecodedImage) + Send>;

/// Identity of a registered view subscriber.
///
/// Holding the token lets a view unregister itself on teardown instead of
/// relying on weak-reference expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewToken(u64);

impl ViewToken {
    fn next() -> Self {
        Self(VIEW_TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Update delivered to the view channel when a URL resolves.
#[derive(Debug, Clone)]
pub struct ViewUpdate {
    /// Key of the resolved URL.
    pub key: ImageKey,
    /// The decoded image.
    pub image: DecodedImage,
}

/// A view's registration for image updates.
pub struct ViewSubscriber {
    token: ViewToken,
    updates: mpsc::UnboundedSender<ViewUpdate>,
}

impl ViewSubscriber {
    /// Creates a subscriber sending updates on the given channel.
    pub fn new(updates: mpsc::UnboundedSender<ViewUpdate>) -> Self {
        Self {
            token: ViewToken::next(),
            updates,
        }
    }

    /// The token identifying this registration.
    pub fn token(&self) -> ViewToken {
        self.token
    }
}

/// Statistics for monitoring coalescing behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoalescerStats {
    /// View registrations that replaced a previous subscriber
    pub view_replacements: u64,
    /// Callbacks registered in total
    pub callbacks_registered: u64,
    /// URLs resolved with at least one subscriber
    pub resolved: u64,
}

/// Per-URL subscriber state.
#[derive(Default)]
struct PendingEntry {
    view: Option<ViewSubscriber>,
    callbacks: Vec<ImageCallback>,
}

/// Tracks subscribers per URL and fans the resolved image out to them
/// exactly once.
pub struct RequestCoalescer {
    pending: Mutex<HashMap<ImageKey, PendingEntry>>,
    stats: Mutex<CoalescerStats>,
}

impl RequestCoalescer {
    /// Creates a new coalescer with no pending registrations.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            stats: Mutex::new(CoalescerStats::default()),
        }
    }

    /// Registers the view interested in this URL, replacing any previous
    /// registration for it.
    pub fn register_view(&self, key: &ImageKey, subscriber: ViewSubscriber) {
        let mut pending = self.pending.lock().unwrap();
        let entry = pending.entry(key.clone()).or_default();
        if entry.view.is_some() {
            self.stats.lock().unwrap().view_replacements += 1;
            trace!(key = %key, "Replacing view registration");
        }
        entry.view = Some(subscriber);
    }

    /// Appends a one-shot callback for this URL. Callbacks accumulate and
    /// all fire on resolution, in registration order.
    pub fn register_callback(&self, key: &ImageKey, callback: ImageCallback) {
        let mut pending = self.pending.lock().unwrap();
        pending.entry(key.clone()).or_default().callbacks.push(callback);
        self.stats.lock().unwrap().callbacks_registered += 1;
    }

    /// Removes the view registration for this URL if it still belongs to
    /// the given token. Callbacks are unaffected.
    pub fn unregister_view(&self, key: &ImageKey, token: ViewToken) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(entry) = pending.get_mut(key) {
            if entry.view.as_ref().is_some_and(|v| v.token == token) {
                entry.view = None;
            }
        }
    }

    /// Resolves the URL: notifies the registered view (if any), then fires
    /// every callback in registration order, then forgets the URL.
    ///
    /// A second resolve for the same URL is a no-op unless subscribers
    /// have registered again in between.
    pub fn resolve(&self, key: &ImageKey, image: DecodedImage) {
        let entry = {
            let mut pending = self.pending.lock().unwrap();
            pending.remove(key)
        };

        let Some(entry) = entry else {
            return;
        };

        self.stats.lock().unwrap().resolved += 1;
        debug!(
            key = %key,
            has_view = entry.view.is_some(),
            callbacks = entry.callbacks.len(),
            "Resolving image subscribers"
        );

        if let Some(view) = entry.view {
            // Receiver may be gone; a torn-down view is simply skipped
            let _ = view.updates.send(ViewUpdate {
                key: key.clone(),
                image: DecodedImage::clone(&image),
            });
        }

        for callback in entry.callbacks {
            callback(DecodedImage::clone(&image));
        }
    }

    /// Whether any subscriber is waiting on this URL.
    pub fn has_pending(&self, key: &ImageKey) -> bool {
        self.pending.lock().unwrap().contains_key(key)
    }

    /// Number of URLs with waiting subscribers.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Snapshot of the coalescing statistics.
    pub fn stats(&self) -> CoalescerStats {
        *self.stats.lock().unwrap()
    }
}

impl Default for RequestCoalescer {
    fn default() -> Self {
        Self::new()
    }
}
