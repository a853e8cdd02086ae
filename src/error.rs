//! Error types for the navigation engine.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Directory scan failures. Callers treat these as an empty item list.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("directory unavailable: {path}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    /// Extension is in none of the configured sets.
    #[error("unsupported file type: {0}")]
    UnsupportedKind(PathBuf),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to decode {path}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("cannot create cache dir {path}")]
    CreateCacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot create temp file in {path}")]
    TempFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source has no file name: {0}")]
    BadSource(PathBuf),

    #[error("failed to start transcoder {program}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("waiting on transcoder failed")]
    Wait(#[source] std::io::Error),

    #[error("transcoder timed out after {}s on {path}", timeout.as_secs())]
    TimedOut { path: PathBuf, timeout: Duration },

    #[error("transcoder exited with {status} on {path}")]
    Failed {
        path: PathBuf,
        status: std::process::ExitStatus,
    },

    #[error("transcoder produced no output for {0}")]
    EmptyOutput(PathBuf),

    #[error("cannot move transcoded file into {path}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced on the blocking display path of a navigation command.
#[derive(Error, Debug)]
pub enum NavError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),
}

impl NavError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, NavError::Classify(ClassifyError::UnsupportedKind(_)))
    }
}
