//! On-disk cache of animations transcoded to video.
//!
//! `<dir>/a.gif` is played from `<dir>/.igal_cache/a.gif.mp4`. A non-empty
//! cache file is trusted as-is: no checksum, no mtime comparison, no
//! eviction.
//!
//! Output is written to a temp file inside the cache folder and moved into
//! place with a no-clobber rename, so readers only ever see a complete file
//! even when several processes race on the same source.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use crate::config::Config;
use crate::error::TranscodeError;
use crate::scanner::parent_dir;

/// Converts an animated image into a playable video at `output`.
pub trait Transcoder: Send + Sync {
    fn transcode(&self, source: &Path, output: &Path) -> Result<(), TranscodeError>;
}

/// Runs the external ffmpeg binary.
#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    pixel_format: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(program: PathBuf, pixel_format: String, timeout: Duration) -> Self {
        FfmpegTranscoder {
            program,
            pixel_format,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.ffmpeg.clone(),
            config.pixel_format.clone(),
            config.transcode_timeout(),
        )
    }

    /// `-y -i <source> -pix_fmt <fmt> <output>`
    pub fn args(&self, source: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-i".into(),
            source.as_os_str().to_owned(),
            "-pix_fmt".into(),
            self.pixel_format.clone().into(),
            output.as_os_str().to_owned(),
        ]
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, source: &Path, output: &Path) -> Result<(), TranscodeError> {
        let mut child = Command::new(&self.program)
            .args(self.args(source, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        match child.wait_timeout(self.timeout) {
            Ok(Some(status)) if status.success() => Ok(()),
            Ok(Some(status)) => Err(TranscodeError::Failed {
                path: source.to_path_buf(),
                status,
            }),
            Ok(None) => {
                // Timed out, kill it
                child.kill().ok();
                child.wait().ok();
                Err(TranscodeError::TimedOut {
                    path: source.to_path_buf(),
                    timeout: self.timeout,
                })
            }
            Err(e) => {
                child.kill().ok();
                child.wait().ok();
                Err(TranscodeError::Wait(e))
            }
        }
    }
}

pub struct TranscodeCache {
    config: Arc<Config>,
    transcoder: Arc<dyn Transcoder>,
    /// Cache path → lock, so callers in this process run one transcode per file.
    inflight: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl TranscodeCache {
    pub fn new(config: Arc<Config>, transcoder: Arc<dyn Transcoder>) -> Self {
        TranscodeCache {
            config,
            transcoder,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Where the playable version of `source` lives, whether or not it exists yet.
    pub fn cache_path(&self, source: &Path) -> Result<PathBuf, TranscodeError> {
        let name = source
            .file_name()
            .ok_or_else(|| TranscodeError::BadSource(source.to_path_buf()))?;
        let mut file = name.to_os_string();
        file.push(".");
        file.push(&self.config.cached_video_extension);
        Ok(parent_dir(source).join(&self.config.cache_dir_name).join(file))
    }

    pub fn is_cached(&self, source: &Path) -> bool {
        self.cache_path(source).map(|p| is_complete(&p)).unwrap_or(false)
    }

    /// Playable path for `source`, transcoding on first access. Blocks the
    /// caller for the whole transcode.
    pub fn get(&self, source: &Path) -> Result<PathBuf, TranscodeError> {
        let cached = self.cache_path(source)?;
        if is_complete(&cached) {
            debug!("transcode: hit {}", cached.display());
            return Ok(cached);
        }

        let lock = self
            .inflight
            .lock()
            .entry(cached.clone())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock();
            self.fill(source, &cached)
        };

        let mut inflight = self.inflight.lock();
        drop(lock);
        if inflight.get(&cached).is_some_and(|l| Arc::strong_count(l) == 1) {
            inflight.remove(&cached);
        }

        result.map(|()| cached)
    }

    fn fill(&self, source: &Path, cached: &Path) -> Result<(), TranscodeError> {
        // Another caller may have finished while we waited for the lock.
        if is_complete(cached) {
            return Ok(());
        }
        // A zero-length leftover would block the no-clobber rename below.
        if cached.exists() {
            debug!("transcode: removing empty {}", cached.display());
            std::fs::remove_file(cached).ok();
        }

        let cache_dir = cached.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(cache_dir).map_err(|source| TranscodeError::CreateCacheDir {
            path: cache_dir.to_path_buf(),
            source,
        })?;

        let suffix = format!(".part.{}", self.config.cached_video_extension);
        let tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(&suffix)
            .tempfile_in(cache_dir)
            .map_err(|source| TranscodeError::TempFile {
                path: cache_dir.to_path_buf(),
                source,
            })?
            .into_temp_path();

        let t = Instant::now();
        info!("transcode: {} -> {}", source.display(), cached.display());
        self.transcoder.transcode(source, &tmp)?;

        if !is_complete(&tmp) {
            return Err(TranscodeError::EmptyOutput(source.to_path_buf()));
        }

        match tmp.persist_noclobber(cached) {
            Ok(()) => {
                debug!("transcode: done in {:?}", t.elapsed());
                Ok(())
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists && is_complete(cached) => {
                // Lost the race to another process; its file is complete.
                debug!("transcode: kept existing {}", cached.display());
                Ok(())
            }
            Err(e) => {
                warn!("transcode: persist failed: {}", e.error);
                Err(TranscodeError::Persist {
                    path: cached.to_path_buf(),
                    source: e.error,
                })
            }
        }
    }
}

/// A cache file counts only once it exists and has content.
fn is_complete(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
