//! Navigation cursor: owns the position in the item list and drives display
//! and neighbor prefetch on every move.
//!
//! Flow per move:
//!   1. resolve the new index, bail out if it did not change
//!   2. show the new target (prefetch hit, or classify + inline decode /
//!      transcode / stream)
//!   3. bump the generation, seed the opposite slot with the still we left,
//!      re-request both neighbors
//!
//! Everything here runs on the interactive thread. Only the directory scan
//! and the neighbor decodes run elsewhere.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::classify::{Classifier, MediaKind};
use crate::config::Config;
use crate::error::NavError;
use crate::host::PresentationHost;
use crate::preload::{
    DecodedImage, Direction, ImageDecoder, LoadOutcome, PrefetchCache, PrefetchTask, RgbaDecoder,
    SlotState,
};
use crate::scanner::{parent_dir, spawn_scan, ItemList, ScanHandle};
use crate::transcode::{FfmpegTranscoder, TranscodeCache, Transcoder};

pub struct Navigator<H> {
    config: Arc<Config>,
    classifier: Classifier,
    decoder: Arc<dyn ImageDecoder>,
    prefetch: PrefetchCache,
    transcode: TranscodeCache,
    host: H,

    target: PathBuf,
    items: Option<Arc<ItemList>>,
    scan: Option<ScanHandle>,
    index: usize,
    generation: u64,
    /// Still currently on screen, handed to the opposite slot when we leave it.
    shown: Option<Arc<DecodedImage>>,
    tasks: Vec<PrefetchTask>,
    rng: StdRng,
}

impl<H: PresentationHost> Navigator<H> {
    /// Navigator with the `image` decoder and the ffmpeg transcoder.
    pub fn new(config: Arc<Config>, host: H) -> Self {
        let transcoder = Arc::new(FfmpegTranscoder::from_config(&config));
        Self::with_parts(config, host, Arc::new(RgbaDecoder), transcoder)
    }

    pub fn with_parts(
        config: Arc<Config>,
        host: H,
        decoder: Arc<dyn ImageDecoder>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Navigator {
            classifier: Classifier::new(config.clone()),
            prefetch: PrefetchCache::new(config.clone(), decoder.clone()),
            transcode: TranscodeCache::new(config.clone(), transcoder),
            config,
            decoder,
            host,
            target: PathBuf::new(),
            items: None,
            scan: None,
            index: 0,
            generation: 0,
            shown: None,
            tasks: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Fixed seed for the random jump.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    // ── session ─────────────────────────────────────────────────────────

    /// Show `target` right away and start scanning its directory.
    pub fn open(&mut self, target: &Path) -> Result<(), NavError> {
        self.target = target.to_path_buf();
        self.items = None;
        self.index = 0;
        self.tasks.clear();
        self.prefetch.clear();
        self.scan = Some(spawn_scan(parent_dir(target), self.config.clone()));
        self.display_current()
    }

    /// Adopt a finished scan, if any. Never blocks. Returns whether a new
    /// list was taken.
    pub fn poll(&mut self) -> bool {
        let list = match self.scan.as_ref().and_then(ScanHandle::try_take) {
            Some(list) => list,
            None => return false,
        };
        self.scan = None;
        self.adopt(list);
        true
    }

    /// Like [`poll`](Self::poll) but waits up to `timeout` for the scan.
    pub fn wait_ready(&mut self, timeout: Duration) -> bool {
        let list = match self.scan.as_ref().and_then(|s| s.wait(timeout)) {
            Some(list) => list,
            None => return false,
        };
        self.scan = None;
        self.adopt(list);
        true
    }

    /// Re-read the directory in the background. The current list stays in
    /// use until the new one is adopted by `poll`.
    pub fn rescan(&mut self) {
        let dir = match &self.items {
            Some(items) => items.dir().to_path_buf(),
            None => parent_dir(&self.target),
        };
        self.scan = Some(spawn_scan(dir, self.config.clone()));
    }

    /// Take a scan result. When the target is not in it, the cursor lands
    /// on the clamped index (0 on first adoption) and that entry becomes the
    /// target and is shown.
    fn adopt(&mut self, list: Arc<ItemList>) {
        let found = list.position(&self.target);
        let index = match found {
            Some(i) => i,
            None if self.items.is_some() => self.index.min(list.len().saturating_sub(1)),
            None => 0,
        };
        info!(
            "nav: {} items in {}, cursor at {}",
            list.len(),
            list.dir().display(),
            index
        );
        self.index = index;
        let replacement = match found {
            Some(_) => None,
            None => list.get(index).map(|e| e.path.clone()),
        };
        self.items = Some(list);

        if let Some(path) = replacement {
            debug!(
                "nav: {} not listed, showing {}",
                self.target.display(),
                path.display()
            );
            self.target = path;
            if let Err(e) = self.display_current() {
                warn!("nav: {}", e);
            }
        }

        self.generation += 1;
        self.refresh_neighbors();
    }

    // ── commands ────────────────────────────────────────────────────────

    pub fn next(&mut self) -> Result<(), NavError> {
        self.move_to(self.index.saturating_add(1))
    }

    pub fn prev(&mut self) -> Result<(), NavError> {
        match self.index.checked_sub(1) {
            Some(i) => self.move_to(i),
            None => Ok(()),
        }
    }

    /// Move by `n`, stopping at either end of the list.
    pub fn skip_by(&mut self, n: isize) -> Result<(), NavError> {
        let index = if n < 0 {
            self.index.saturating_sub(n.unsigned_abs())
        } else {
            self.index.saturating_add(n as usize)
        };
        self.move_to(index)
    }

    pub fn first(&mut self) -> Result<(), NavError> {
        self.move_to(0)
    }

    pub fn last(&mut self) -> Result<(), NavError> {
        self.move_to(self.len().saturating_sub(1))
    }

    /// Jump to a uniformly drawn index. Landing on the current one shows it
    /// again.
    pub fn random(&mut self) -> Result<(), NavError> {
        if !self.is_ready() {
            return Ok(());
        }
        let index = self.rng.gen_range(0..self.len() as u64) as usize;
        if index == self.index {
            return self.display_current();
        }
        self.move_to(index)
    }

    /// Show the current target again. Allowed before the list is ready.
    pub fn reload(&mut self) -> Result<(), NavError> {
        self.display_current()
    }

    fn move_to(&mut self, index: usize) -> Result<(), NavError> {
        let items = match &self.items {
            Some(items) if !items.is_empty() => items.clone(),
            _ => return Ok(()),
        };
        let index = index.min(items.len() - 1);
        if index == self.index {
            return Ok(());
        }

        let direction = if index == self.index + 1 {
            Some(Direction::Next)
        } else if index + 1 == self.index {
            Some(Direction::Prev)
        } else {
            None
        };

        let left = std::mem::replace(&mut self.target, items.entries()[index].path.clone());
        let left_still = self.shown.take();
        self.index = index;

        let hit = direction.and_then(|d| self.prefetch.consume(d, self.generation, &self.target));
        let shown = match hit {
            Some(image) => {
                debug!("nav: prefetch hit {}", self.target.display());
                self.set_title();
                self.show_still(image);
                Ok(())
            }
            None => self.display_current(),
        };

        self.generation += 1;
        if let (Some(d), Some(image)) = (direction, left_still) {
            self.prefetch.seed(d.opposite(), self.generation, &left, image);
        }
        self.refresh_neighbors();
        shown
    }

    fn refresh_neighbors(&mut self) {
        let items = match &self.items {
            Some(items) => items.clone(),
            None => return,
        };
        self.tasks.retain(|t| !t.is_finished());

        let neighbors = [
            (Direction::Prev, self.index.checked_sub(1)),
            (Direction::Next, Some(self.index + 1)),
        ];
        for (direction, index) in neighbors {
            match index.and_then(|i| items.get(i)) {
                Some(entry) => {
                    if let Some(task) =
                        self.prefetch
                            .request_load(direction, &entry.path, self.generation)
                    {
                        self.tasks.push(task);
                    }
                }
                None => self.prefetch.invalidate(direction),
            }
        }
    }

    // ── display ─────────────────────────────────────────────────────────

    fn display_current(&mut self) -> Result<(), NavError> {
        self.shown = None;
        self.set_title();
        let path = self.target.clone();

        match self.classifier.classify(&path)? {
            MediaKind::StillImage => {
                let image = self.decoder.decode(&path)?;
                self.show_still(Arc::new(image));
            }
            MediaKind::AnimatedImage => {
                let playable = self.transcode.get(&path)?;
                self.host.display_video(&playable);
            }
            MediaKind::Video => {
                advise_willneed(&path);
                self.host.display_video(&path);
            }
        }
        Ok(())
    }

    fn show_still(&mut self, image: Arc<DecodedImage>) {
        self.shown = Some(image.clone());
        self.host.display_still(image);
    }

    fn set_title(&mut self) {
        let title = self
            .target
            .file_name()
            .unwrap_or(self.target.as_os_str())
            .to_string_lossy()
            .into_owned();
        self.host.set_title(&title);
    }

    // ── accessors ───────────────────────────────────────────────────────

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.items.as_ref().map_or(0, |l| l.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Navigation is enabled once a non-empty list has been adopted.
    pub fn is_ready(&self) -> bool {
        !self.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn items(&self) -> Option<&ItemList> {
        self.items.as_deref()
    }

    pub fn slot(&self, direction: Direction) -> SlotState {
        self.prefetch.state(direction)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Block until every outstanding neighbor decode has finished.
    pub fn wait_prefetch(&mut self) -> Vec<LoadOutcome> {
        self.tasks.drain(..).map(PrefetchTask::join).collect()
    }
}

/// Advise the OS to prefetch a file into the page cache (helps on network FS).
#[cfg(target_os = "linux")]
fn advise_willneed(path: &Path) {
    use std::os::unix::io::AsRawFd;
    if let Ok(f) = std::fs::File::open(path) {
        unsafe {
            libc::posix_fadvise(f.as_raw_fd(), 0, 0, libc::POSIX_FADV_WILLNEED);
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn advise_willneed(_path: &Path) {}
