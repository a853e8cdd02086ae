//! Neighbor prefetch: two slots (previous / next) decoded on background threads.
//!
//! Flow:
//!   1. `request_load(dir, path, gen)` → slot becomes `Loading(gen)` → thread
//!      classifies + decodes to RGBA
//!   2. on completion the thread stores `Ready(gen)` only if the slot still is
//!      `Loading` for the same generation and path; anything else is dropped
//!   3. `consume(dir, gen, path)` hands a matching `Ready` payload to the
//!      display path and empties the slot
//!
//! Only plain stills are prefetched. Animations need a transcode and videos
//! are streamed, both too costly to run speculatively.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use image::GenericImageView;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::classify::{Classifier, MediaKind};
use crate::config::{ext_of, Config};
use crate::error::DecodeError;

/// Decoded image: raw RGBA pixels ready for display.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl DecodedImage {
    pub fn from_file(path: &Path) -> Result<Self, DecodeError> {
        let img = image::open(path).map_err(|source| DecodeError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        let (width, height) = img.dimensions();
        Ok(DecodedImage {
            rgba: img.into_rgba8().into_raw(),
            width,
            height,
        })
    }
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DecodedImage({}x{})", self.width, self.height)
    }
}

/// Still-image decoder used for both prefetch and the inline cache-miss path.
pub trait ImageDecoder: Send + Sync + 'static {
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError>;
}

/// Decodes through the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct RgbaDecoder;

impl ImageDecoder for RgbaDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError> {
        DecodedImage::from_file(path)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Direction {
    Prev,
    Next,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Prev => Direction::Next,
            Direction::Next => Direction::Prev,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Prev => "prev",
            Direction::Next => "next",
        }
    }

    fn slot(self) -> usize {
        match self {
            Direction::Prev => 0,
            Direction::Next => 1,
        }
    }
}

/// State of one neighbor slot. The path is the identity check: a payload is
/// only ever handed out for the file it was decoded from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
    #[default]
    Empty,
    Loading {
        generation: u64,
        path: PathBuf,
    },
    Ready {
        generation: u64,
        path: PathBuf,
        image: Arc<DecodedImage>,
    },
    /// Invalidated by a cursor move with nothing new requested.
    Stale,
}

impl SlotState {
    pub fn generation(&self) -> Option<u64> {
        match self {
            SlotState::Loading { generation, .. } | SlotState::Ready { generation, .. } => {
                Some(*generation)
            }
            SlotState::Empty | SlotState::Stale => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SlotState::Ready { .. })
    }

    fn is_loading(&self, generation: u64, path: &Path) -> bool {
        matches!(self, SlotState::Loading { generation: g, path: p } if *g == generation && p == path)
    }
}

/// What happened to a background load.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LoadOutcome {
    /// Stored as `Ready`.
    Stored,
    /// The slot moved on before the decode finished; result dropped.
    Discarded,
    /// Not a still image after probing; slot emptied.
    Skipped,
    /// Decode failed; slot emptied.
    Failed,
}

/// A background load in flight. Dropping it detaches the thread; joining
/// returns what happened to the result.
pub struct PrefetchTask {
    pub direction: Direction,
    pub generation: u64,
    pub path: PathBuf,
    handle: JoinHandle<LoadOutcome>,
}

impl PrefetchTask {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> LoadOutcome {
        self.handle.join().unwrap_or(LoadOutcome::Failed)
    }
}

pub struct PrefetchCache {
    slots: [Arc<Mutex<SlotState>>; 2],
    classifier: Classifier,
    config: Arc<Config>,
    decoder: Arc<dyn ImageDecoder>,
}

impl PrefetchCache {
    pub fn new(config: Arc<Config>, decoder: Arc<dyn ImageDecoder>) -> Self {
        PrefetchCache {
            slots: [
                Arc::new(Mutex::new(SlotState::Empty)),
                Arc::new(Mutex::new(SlotState::Empty)),
            ],
            classifier: Classifier::new(config.clone()),
            config,
            decoder,
        }
    }

    fn slot(&self, direction: Direction) -> &Arc<Mutex<SlotState>> {
        &self.slots[direction.slot()]
    }

    /// Start decoding `path` into the `direction` slot for `generation`.
    ///
    /// Returns `None` when no decode was started: the extension can never be
    /// a still (slot goes `Stale`), or the slot already holds this very file
    /// (re-tagged with the new generation).
    pub fn request_load(
        &self,
        direction: Direction,
        path: &Path,
        generation: u64,
    ) -> Option<PrefetchTask> {
        if !self.config.is_still_ext(&ext_of(path)) {
            *self.slot(direction).lock() = SlotState::Stale;
            return None;
        }

        {
            let mut state = self.slot(direction).lock();
            if let SlotState::Ready { path: p, image, .. } = &*state {
                if p == path {
                    let image = image.clone();
                    *state = SlotState::Ready {
                        generation,
                        path: path.to_path_buf(),
                        image,
                    };
                    trace!("prefetch: {} kept {}", direction.name(), path.display());
                    return None;
                }
            }
            *state = SlotState::Loading {
                generation,
                path: path.to_path_buf(),
            };
        }

        let slot = self.slot(direction).clone();
        let classifier = self.classifier.clone();
        let decoder = self.decoder.clone();
        let owned = path.to_path_buf();

        let spawned = thread::Builder::new()
            .name(format!("prefetch-{}", direction.name()))
            .spawn(move || load(&slot, &classifier, decoder.as_ref(), &owned, generation));

        match spawned {
            Ok(handle) => Some(PrefetchTask {
                direction,
                generation,
                path: path.to_path_buf(),
                handle,
            }),
            Err(e) => {
                warn!("prefetch: failed to spawn loader: {}", e);
                let mut state = self.slot(direction).lock();
                if state.is_loading(generation, path) {
                    *state = SlotState::Empty;
                }
                None
            }
        }
    }

    /// Mark a slot as invalidated, e.g. when there is no neighbor.
    pub fn invalidate(&self, direction: Direction) {
        *self.slot(direction).lock() = SlotState::Stale;
    }

    /// Take the payload if the slot is `Ready` for exactly this generation
    /// and path. Generation and readiness are checked under one lock.
    pub fn consume(
        &self,
        direction: Direction,
        generation: u64,
        path: &Path,
    ) -> Option<Arc<DecodedImage>> {
        let mut state = self.slot(direction).lock();
        match &*state {
            SlotState::Ready {
                generation: g,
                path: p,
                image,
            } if *g == generation && p == path => {
                let image = image.clone();
                *state = SlotState::Empty;
                Some(image)
            }
            _ => None,
        }
    }

    /// Put an already decoded still into a slot, used for the image the
    /// cursor just left.
    pub fn seed(&self, direction: Direction, generation: u64, path: &Path, image: Arc<DecodedImage>) {
        *self.slot(direction).lock() = SlotState::Ready {
            generation,
            path: path.to_path_buf(),
            image,
        };
    }

    pub fn state(&self, direction: Direction) -> SlotState {
        self.slot(direction).lock().clone()
    }

    pub fn clear(&self) {
        for slot in &self.slots {
            *slot.lock() = SlotState::Empty;
        }
    }
}

/// Body of a prefetch thread.
fn load(
    slot: &Mutex<SlotState>,
    classifier: &Classifier,
    decoder: &dyn ImageDecoder,
    path: &Path,
    generation: u64,
) -> LoadOutcome {
    if !matches!(classifier.classify(path), Ok(MediaKind::StillImage)) {
        let mut state = slot.lock();
        if state.is_loading(generation, path) {
            *state = SlotState::Empty;
            return LoadOutcome::Skipped;
        }
        return LoadOutcome::Discarded;
    }

    let decoded = decoder.decode(path);

    let mut state = slot.lock();
    if !state.is_loading(generation, path) {
        debug!(
            "prefetch: dropped stale gen {} {} (slot now {:?})",
            generation,
            path.display(),
            state.generation()
        );
        return LoadOutcome::Discarded;
    }

    match decoded {
        Ok(img) => {
            trace!("prefetch: stored gen {} {}", generation, path.display());
            *state = SlotState::Ready {
                generation,
                path: path.to_path_buf(),
                image: Arc::new(img),
            };
            LoadOutcome::Stored
        }
        Err(e) => {
            debug!("prefetch: {}", e);
            *state = SlotState::Empty;
            LoadOutcome::Failed
        }
    }
}
