//! igal: open one media file, then browse every image, animation and video
//! next to it, newest first.
//!
//! The engine keeps input responsive by scanning the directory and decoding
//! the two neighbors of the cursor on background threads. Animations are
//! transcoded once into a per-directory cache and played back as video.

pub mod classify;
pub mod config;
pub mod error;
pub mod host;
pub mod navigator;
pub mod preload;
pub mod scanner;
pub mod transcode;

pub use classify::{Classifier, MediaKind};
pub use config::Config;
pub use error::{ClassifyError, DecodeError, IndexError, NavError, TranscodeError};
pub use host::{ConsoleHost, PresentationHost};
pub use navigator::Navigator;
pub use preload::{DecodedImage, Direction, ImageDecoder, PrefetchCache, SlotState};
pub use scanner::{scan, DirectoryEntry, ItemList};
pub use transcode::{FfmpegTranscoder, TranscodeCache, Transcoder};
