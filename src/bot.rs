use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rand::rngs::StdRng;

use crate::config::{Config, ImageSource};
use crate::error::Result;
use crate::images::{self, ImageCandidate, selector};
use crate::platform::Platform;
use crate::poster::{PostOutcome, Poster};

/// Latest refreshed candidate list. Written only by the refresh path; readers
/// take an `Arc` snapshot and never hold the lock across an await.
#[derive(Default)]
pub struct ImageStore {
    images: RwLock<Arc<Vec<ImageCandidate>>>,
}

impl ImageStore {
    pub fn replace(&self, images: Vec<ImageCandidate>) {
        *self.images.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(images);
    }

    pub fn snapshot(&self) -> Arc<Vec<ImageCandidate>> {
        self.images
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// The read -> select -> post pipeline plus the state the daemon shares
/// between its two triggers.
pub struct Bot {
    platform: Arc<dyn Platform>,
    source: ImageSource,
    target: String,
    window_size: u8,
    include_inline_links: bool,
    poster: Poster,
    rng: Mutex<StdRng>,
    store: ImageStore,
    // Single-slot guards: a tick that finds the previous run in flight is skipped.
    post_guard: tokio::sync::Mutex<()>,
    refresh_guard: tokio::sync::Mutex<()>,
}

impl Bot {
    pub fn new(platform: Arc<dyn Platform>, config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            platform,
            source: config.image_source()?,
            target: config.target_channel()?.to_string(),
            window_size: config.reader.window_size,
            include_inline_links: config.reader.include_inline_links,
            poster: Poster::from_config(&config.message)?,
            rng: Mutex::new(selector::rng_from_seed(config.selector.seed)),
            store: ImageStore::default(),
            post_guard: tokio::sync::Mutex::new(()),
            refresh_guard: tokio::sync::Mutex::new(()),
        })
    }

    /// Collect candidates from the configured source right now.
    pub async fn collect_images(&self) -> Vec<ImageCandidate> {
        images::collect(
            self.platform.as_ref(),
            &self.source,
            self.window_size,
            self.include_inline_links,
        )
        .await
    }

    /// Re-read the source and swap the result into the store. Returns the new
    /// image count, or `None` when a refresh was already running.
    pub async fn refresh(&self) -> Option<usize> {
        let Ok(_running) = self.refresh_guard.try_lock() else {
            tracing::warn!("Image list update already in progress, skipping");
            return None;
        };
        tracing::info!("Updating image list...");
        let images = self.collect_images().await;
        let count = images.len();
        self.store.replace(images);
        tracing::info!("Image list updated. Total images: {count}");
        Some(count)
    }

    /// Post using the most recently refreshed list (daemon mode).
    pub async fn post_from_store(&self) -> Option<PostOutcome> {
        let Ok(_running) = self.post_guard.try_lock() else {
            tracing::warn!("Previous post still in flight, skipping this tick");
            return None;
        };
        let images = self.store.snapshot();
        let candidate = self.pick(&images);
        Some(self.post(candidate.as_ref()).await)
    }

    /// Fetch, pick and post in one go (one-shot mode).
    pub async fn run_once(&self) -> PostOutcome {
        let _running = self.post_guard.lock().await;
        let images = self.collect_images().await;
        let candidate = self.pick(&images);
        self.post(candidate.as_ref()).await
    }

    pub fn pick(&self, candidates: &[ImageCandidate]) -> Option<ImageCandidate> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        selector::select(candidates, &mut *rng).cloned()
    }

    async fn post(&self, candidate: Option<&ImageCandidate>) -> PostOutcome {
        self.poster
            .post(self.platform.as_ref(), &self.target, candidate)
            .await
    }
}
