//! Media classification by extension, with a content probe for png.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::{ext_of, Config};
use crate::error::ClassifyError;

/// Animation control chunk type. Its presence near the head of a png marks
/// an APNG.
pub const ANIMATION_MARKER: &[u8; 4] = b"acTL";

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MediaKind {
    StillImage,
    AnimatedImage,
    Video,
}

impl MediaKind {
    pub fn name(&self) -> &'static str {
        match self {
            MediaKind::StillImage => "still",
            MediaKind::AnimatedImage => "animated",
            MediaKind::Video => "video",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Classifier {
    config: Arc<Config>,
}

impl Classifier {
    pub fn new(config: Arc<Config>) -> Self {
        Classifier { config }
    }

    /// Decide the kind of `path`. png is the only extension that needs its
    /// content read; everything else is settled by the extension sets, with
    /// the animation set taking precedence.
    pub fn classify(&self, path: &Path) -> Result<MediaKind, ClassifyError> {
        let ext = ext_of(path);
        let animation = self.config.is_animation_ext(&ext);
        let still = self.config.is_still_ext(&ext);

        if ext == "png" && (animation || still) {
            let kind = if animation && self.probe_png(path) {
                MediaKind::AnimatedImage
            } else {
                MediaKind::StillImage
            };
            return Ok(kind);
        }
        if animation {
            return Ok(MediaKind::AnimatedImage);
        }
        if still {
            return Ok(MediaKind::StillImage);
        }
        if self.config.is_video_ext(&ext) {
            return Ok(MediaKind::Video);
        }
        Err(ClassifyError::UnsupportedKind(path.to_path_buf()))
    }

    /// Extension-only check, no file access.
    pub fn is_supported(&self, path: &Path) -> bool {
        self.config.is_supported(&ext_of(path))
    }

    fn probe_png(&self, path: &Path) -> bool {
        match File::open(path).and_then(|f| is_animated_png(f, self.config.probe_window)) {
            Ok(animated) => animated,
            Err(e) => {
                debug!("classify: probe failed for {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// Read up to `window` bytes from `reader` and look for the animation marker.
/// Short inputs are probed as-is.
pub fn is_animated_png<R: Read>(reader: R, window: usize) -> io::Result<bool> {
    let mut head = Vec::with_capacity(window);
    reader.take(window as u64).read_to_end(&mut head)?;
    Ok(contains_marker(&head))
}

pub fn contains_marker(bytes: &[u8]) -> bool {
    bytes.windows(ANIMATION_MARKER.len()).any(|w| w == ANIMATION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn classifier() -> Classifier {
        Classifier::new(Arc::new(Config::default()))
    }

    fn png_head(with_marker_at: Option<usize>, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        bytes[..8].copy_from_slice(b"\x89PNG\r\n\x1a\n");
        if let Some(at) = with_marker_at {
            bytes[at..at + 4].copy_from_slice(ANIMATION_MARKER);
        }
        bytes
    }

    // ── is_animated_png ─────────────────────────────────────────────────

    #[test]
    fn marker_inside_window() {
        let bytes = png_head(Some(37), 8192);
        assert!(is_animated_png(Cursor::new(bytes), 4096).unwrap());
    }

    #[test]
    fn marker_straddling_window_end_is_missed() {
        let bytes = png_head(Some(4094), 8192);
        assert!(!is_animated_png(Cursor::new(bytes), 4096).unwrap());
    }

    #[test]
    fn marker_after_window_is_missed() {
        let bytes = png_head(Some(5000), 8192);
        assert!(!is_animated_png(Cursor::new(bytes), 4096).unwrap());
    }

    #[test]
    fn short_input_is_not_an_error() {
        assert!(!is_animated_png(Cursor::new(b"\x89PNG".to_vec()), 4096).unwrap());
        assert!(!is_animated_png(Cursor::new(Vec::new()), 4096).unwrap());
        assert!(is_animated_png(Cursor::new(b"xxacTL".to_vec()), 4096).unwrap());
    }

    #[test]
    fn contains_marker_edges() {
        assert!(contains_marker(b"acTL"));
        assert!(!contains_marker(b"acT"));
        assert!(!contains_marker(b"ACTL"));
    }

    // ── classify ────────────────────────────────────────────────────────

    #[test]
    fn classify_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let c = classifier();
        for (name, kind) in [
            ("a.jpg", MediaKind::StillImage),
            ("a.JPEG", MediaKind::StillImage),
            ("a.gif", MediaKind::AnimatedImage),
            ("a.mp4", MediaKind::Video),
            ("a.webm", MediaKind::Video),
            ("a.avi", MediaKind::Video),
        ] {
            let p = dir.path().join(name);
            std::fs::write(&p, b"x").unwrap();
            assert_eq!(c.classify(&p).unwrap(), kind, "{}", name);
        }
    }

    #[test]
    fn classify_png_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let still = dir.path().join("still.png");
        let anim = dir.path().join("anim.png");
        std::fs::write(&still, png_head(None, 600)).unwrap();
        std::fs::write(&anim, png_head(Some(37), 600)).unwrap();

        let c = classifier();
        assert_eq!(c.classify(&still).unwrap(), MediaKind::StillImage);
        assert_eq!(c.classify(&anim).unwrap(), MediaKind::AnimatedImage);
    }

    #[test]
    fn unreadable_png_counts_as_still() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.png");
        assert_eq!(classifier().classify(&missing).unwrap(), MediaKind::StillImage);
    }

    #[test]
    fn png_only_in_animation_set_falls_back_to_still() {
        let cfg = Config {
            still_extensions: vec!["jpg".into()],
            ..Config::default()
        };
        let c = Classifier::new(Arc::new(cfg));
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("plain.png");
        std::fs::write(&p, png_head(None, 100)).unwrap();
        assert_eq!(c.classify(&p).unwrap(), MediaKind::StillImage);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let c = classifier();
        let err = c.classify(Path::new("/tmp/readme.txt")).unwrap_err();
        assert!(matches!(err, ClassifyError::UnsupportedKind(_)));
        assert!(c.classify(Path::new("/tmp/noext")).is_err());
    }
}
