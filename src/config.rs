//! Session configuration: extension sets, cache layout, transcoder settings.
//!
//! Built once at startup and shared as `Arc<Config>`. Nothing reads these
//! values from globals.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Formats decoded directly to pixels.
    pub still_extensions: Vec<String>,
    /// Formats that are transcoded to a video before display. Overlaps with
    /// `still_extensions` for png; the content probe decides.
    pub animation_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
    /// Hidden per-directory folder holding transcoded animations.
    pub cache_dir_name: String,
    pub cached_video_extension: String,
    /// Transcoder binary, resolved through PATH when not absolute.
    pub ffmpeg: PathBuf,
    pub pixel_format: String,
    pub transcode_timeout_secs: u64,
    /// Bytes read from the head of a png when looking for the animation chunk.
    pub probe_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        let mut video = vec!["mp4".to_string(), "webm".to_string(), "avi".to_string()];
        if cfg!(windows) {
            video.push("wmv".to_string());
        }
        Config {
            still_extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
            animation_extensions: vec!["png".into(), "gif".into()],
            video_extensions: video,
            cache_dir_name: ".igal_cache".into(),
            cached_video_extension: "mp4".into(),
            ffmpeg: PathBuf::from("ffmpeg"),
            pixel_format: "yuv420p".into(),
            transcode_timeout_secs: 120,
            probe_window: 4096,
        }
    }
}

impl Config {
    /// Load `config.json` from the platform config dir, falling back to
    /// defaults when the file is missing or broken.
    pub fn load() -> Self {
        match default_config_path() {
            Some(path) => Self::load_from(&path),
            None => Config::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => {
                debug!("config: no file at {}, using defaults", path.display());
                return Config::default();
            }
        };
        match serde_json::from_str::<Config>(&text) {
            Ok(cfg) => {
                debug!("config: loaded {}", path.display());
                cfg.normalized()
            }
            Err(e) => {
                warn!("config: ignoring {}: {}", path.display(), e);
                Config::default()
            }
        }
    }

    /// Lowercase every extension and strip leading dots, so files written by
    /// hand (".JPG") match what the scanner produces.
    fn normalized(mut self) -> Self {
        for set in [
            &mut self.still_extensions,
            &mut self.animation_extensions,
            &mut self.video_extensions,
        ] {
            for ext in set.iter_mut() {
                *ext = ext.trim_start_matches('.').to_lowercase();
            }
        }
        self.cached_video_extension = self
            .cached_video_extension
            .trim_start_matches('.')
            .to_lowercase();
        self
    }

    pub fn is_still_ext(&self, ext: &str) -> bool {
        contains_ext(&self.still_extensions, ext)
    }

    pub fn is_animation_ext(&self, ext: &str) -> bool {
        contains_ext(&self.animation_extensions, ext)
    }

    pub fn is_video_ext(&self, ext: &str) -> bool {
        contains_ext(&self.video_extensions, ext)
    }

    /// Union of the three extension sets.
    pub fn supported_extensions(&self) -> Vec<&str> {
        let mut all: Vec<&str> = self
            .still_extensions
            .iter()
            .chain(&self.animation_extensions)
            .chain(&self.video_extensions)
            .map(String::as_str)
            .collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    pub fn is_supported(&self, ext: &str) -> bool {
        self.is_still_ext(ext) || self.is_animation_ext(ext) || self.is_video_ext(ext)
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }
}

fn contains_ext(set: &[String], ext: &str) -> bool {
    let ext = ext.to_lowercase();
    set.iter().any(|e| *e == ext)
}

pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "igal").map(|d| d.config_dir().join("config.json"))
}

/// Lowercased extension of `path` without the dot, or "" when there is none.
pub fn ext_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}
