//! Directory scanner: snapshot the media files next to the opened target.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use crossbeam_channel::{bounded, Receiver};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{ext_of, Config};
use crate::error::IndexError;

/// One media file. Immutable once read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
    /// Lowercase, without the dot.
    pub ext: String,
}

impl DirectoryEntry {
    pub fn file_name(&self) -> &OsStr {
        self.path.file_name().unwrap_or_default()
    }
}

/// Media files of one directory, newest first. Replaced wholesale on rescan,
/// never edited in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemList {
    dir: PathBuf,
    entries: Vec<DirectoryEntry>,
}

impl ItemList {
    pub fn empty(dir: &Path) -> Self {
        ItemList {
            dir: dir.to_path_buf(),
            entries: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DirectoryEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter()
    }

    /// Index of `path` in the list. Every entry lives in the same directory,
    /// so the file name alone identifies it regardless of how the directory
    /// part was spelled.
    pub fn position(&self, path: &Path) -> Option<usize> {
        let name = path.file_name()?;
        self.entries.iter().position(|e| e.file_name() == name)
    }
}

/// Directory the scan should cover for `target`. A bare file name resolves
/// to the current directory.
pub fn parent_dir(target: &Path) -> PathBuf {
    match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// List the immediate regular files of `dir` whose extension is supported,
/// newest first. Ties on modification time fall back to file name.
pub fn scan(dir: &Path, config: &Config) -> Result<ItemList, IndexError> {
    let mut entries = Vec::new();

    for item in WalkDir::new(dir).max_depth(1).follow_links(true) {
        let entry = match item {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("directory walk failed"));
                return Err(IndexError::DirectoryUnavailable {
                    path: dir.to_path_buf(),
                    source,
                });
            }
            Err(e) => {
                debug!("scan: skipping entry: {}", e);
                continue;
            }
        };

        if entry.depth() == 0 || !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let ext = ext_of(path);
        if !config.is_supported(&ext) {
            continue;
        }

        let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
            Some(t) => t,
            None => {
                debug!("scan: no mtime for {}", path.display());
                continue;
            }
        };

        entries.push(DirectoryEntry {
            path: path.to_path_buf(),
            modified,
            ext,
        });
    }

    entries.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| a.file_name().cmp(b.file_name()))
    });

    Ok(ItemList {
        dir: dir.to_path_buf(),
        entries,
    })
}

/// Handle to a scan running on a background thread.
pub struct ScanHandle {
    rx: Receiver<Arc<ItemList>>,
}

impl ScanHandle {
    /// Take the finished list if the scan is done. Never blocks.
    pub fn try_take(&self) -> Option<Arc<ItemList>> {
        self.rx.try_recv().ok()
    }

    /// Block until the scan finishes or `timeout` passes.
    pub fn wait(&self, timeout: Duration) -> Option<Arc<ItemList>> {
        self.rx.recv_timeout(timeout).ok()
    }
}

/// Run `scan` on a detached thread. A failed scan is logged and delivered
/// as an empty list so navigation simply stays disabled.
pub fn spawn_scan(dir: PathBuf, config: Arc<Config>) -> ScanHandle {
    let (tx, rx) = bounded(1);

    let spawned = thread::Builder::new()
        .name("dir-scan".into())
        .spawn(move || {
            let t = std::time::Instant::now();
            let list = match scan(&dir, &config) {
                Ok(list) => {
                    info!(
                        "scan: {} ({} files, {:?})",
                        dir.display(),
                        list.len(),
                        t.elapsed()
                    );
                    list
                }
                Err(e) => {
                    warn!("scan: {}", e);
                    ItemList::empty(&dir)
                }
            };
            tx.send(Arc::new(list)).ok();
        });

    if let Err(e) = spawned {
        warn!("scan: failed to spawn scanner thread: {}", e);
    }

    ScanHandle { rx }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs::File;

    /// Write `name` under `dir` and stamp it `secs` after the epoch.
    pub(crate) fn touch(dir: &Path, name: &str, contents: &[u8], secs: u64) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        let f = File::options().write(true).open(&path).unwrap();
        f.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
        path
    }

    fn names(list: &ItemList) -> Vec<String> {
        list.iter()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn scan_sorts_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "old.jpg", b"x", 1_000);
        touch(dir.path(), "new.png", b"x", 3_000);
        touch(dir.path(), "mid.mp4", b"x", 2_000);

        let list = scan(dir.path(), &Config::default()).unwrap();
        assert_eq!(names(&list), ["new.png", "mid.mp4", "old.jpg"]);
        for pair in list.entries().windows(2) {
            assert!(pair[0].modified > pair[1].modified);
        }
    }

    #[test]
    fn scan_returns_every_supported_file() {
        let dir = tempfile::tempdir().unwrap();
        let supported = ["a.jpg", "b.jpeg", "c.png", "d.gif", "e.mp4", "f.webm", "g.avi"];
        for (i, name) in supported.iter().enumerate() {
            touch(dir.path(), name, b"x", 100 + i as u64);
        }
        let list = scan(dir.path(), &Config::default()).unwrap();
        assert_eq!(list.len(), supported.len());
    }

    #[test]
    fn scan_skips_unsupported_and_extensionless() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "keep.JPG", b"x", 10);
        touch(dir.path(), "notes.txt", b"x", 20);
        touch(dir.path(), "README", b"x", 30);
        touch(dir.path(), "archive.zip", b"x", 40);

        let list = scan(dir.path(), &Config::default()).unwrap();
        assert_eq!(names(&list), ["keep.JPG"]);
        assert_eq!(list.get(0).unwrap().ext, "jpg");
    }

    #[test]
    fn scan_is_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "top.jpg", b"x", 10);
        let sub = dir.path().join("nested.jpg");
        std::fs::create_dir(&sub).unwrap();
        touch(&sub, "deep.jpg", b"x", 20);
        let cache = dir.path().join(".igal_cache");
        std::fs::create_dir(&cache).unwrap();
        touch(&cache, "anim.png.mp4", b"x", 30);

        let list = scan(dir.path(), &Config::default()).unwrap();
        assert_eq!(names(&list), ["top.jpg"]);
    }

    #[test]
    fn scan_ties_break_on_name() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.jpg", b"x", 50);
        touch(dir.path(), "a.jpg", b"x", 50);
        touch(dir.path(), "c.jpg", b"x", 50);
        let list = scan(dir.path(), &Config::default()).unwrap();
        assert_eq!(names(&list), ["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn scan_missing_dir_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        let err = scan(&gone, &Config::default()).unwrap_err();
        assert!(matches!(err, IndexError::DirectoryUnavailable { .. }));
    }

    #[test]
    fn scan_empty_dir_no_panic() {
        let dir = tempfile::tempdir().unwrap();
        let list = scan(dir.path(), &Config::default()).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn position_matches_on_file_name() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "x.jpg", b"x", 2);
        touch(dir.path(), "y.jpg", b"x", 1);
        let list = scan(dir.path(), &Config::default()).unwrap();
        assert_eq!(list.position(&dir.path().join("y.jpg")), Some(1));
        assert_eq!(list.position(Path::new("x.jpg")), Some(0));
        assert_eq!(list.position(Path::new("z.jpg")), None);
    }

    #[test]
    fn parent_dir_of_bare_name_is_cwd() {
        assert_eq!(parent_dir(Path::new("pic.jpg")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("/a/b/pic.jpg")), PathBuf::from("/a/b"));
    }

    // ── spawn_scan ──────────────────────────────────────────────────────

    #[test]
    fn spawn_scan_delivers_list() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.jpg", b"x", 1);
        let handle = spawn_scan(dir.path().to_path_buf(), Arc::new(Config::default()));
        let list = handle.wait(Duration::from_secs(10)).expect("scan finished");
        assert_eq!(list.len(), 1);
        assert!(handle.try_take().is_none(), "result is delivered once");
    }

    #[test]
    fn spawn_scan_failure_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn_scan(dir.path().join("missing"), Arc::new(Config::default()));
        let list = handle.wait(Duration::from_secs(10)).expect("scan finished");
        assert!(list.is_empty());
    }
}
