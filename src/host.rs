//! Presentation side of a session. The engine decides what to show; the host
//! shows it.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::preload::DecodedImage;

/// Implemented by whatever embeds the navigator (a window, a terminal, a test).
pub trait PresentationHost {
    fn display_still(&mut self, image: Arc<DecodedImage>);
    fn display_video(&mut self, path: &Path);
    fn set_title(&mut self, title: &str);
}

/// Writes one line per display event. Used by the `igal` binary.
pub struct ConsoleHost<W: Write> {
    out: W,
}

impl ConsoleHost<std::io::Stdout> {
    pub fn stdout() -> Self {
        ConsoleHost {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write> ConsoleHost<W> {
    pub fn new(out: W) -> Self {
        ConsoleHost { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: std::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            warn!("host: write failed: {}", e);
        }
    }
}

impl<W: Write> PresentationHost for ConsoleHost<W> {
    fn display_still(&mut self, image: Arc<DecodedImage>) {
        self.emit(format_args!("still {}x{}", image.width, image.height));
    }

    fn display_video(&mut self, path: &Path) {
        self.emit(format_args!("video {}", path.display()));
    }

    fn set_title(&mut self, title: &str) {
        self.emit(format_args!("title {}", title));
    }
}
