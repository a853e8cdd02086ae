//! CLI subcommand implementations and the interactive console session.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use tracing::{debug, warn};

use igal::{
    scanner, Classifier, ClassifyError, Config, ConsoleHost, FfmpegTranscoder, MediaKind,
    NavError, Navigator, PresentationHost, TranscodeCache,
};

/// How often the session checks for a finished scan while waiting on input.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// PageUp / PageDown distance.
const PAGE: isize = 10;

pub fn scan(config: &Config, dir: &Path) -> Result<()> {
    let list = scanner::scan(dir, config).with_context(|| format!("igal scan: {}", dir.display()))?;
    let classifier = Classifier::new(Arc::new(config.clone()));

    for (i, entry) in list.iter().enumerate() {
        let kind = classifier
            .classify(&entry.path)
            .map(|k| k.name())
            .unwrap_or("?");
        println!("{:>4}  {:<8}  {}", i, kind, entry.file_name().to_string_lossy());
    }
    println!("{} media files in {}", list.len(), dir.display());
    Ok(())
}

/// Print each file's kind. Unsupported files are reported and make the
/// command fail once every file has been printed.
pub fn classify(config: Arc<Config>, files: &[PathBuf]) -> Result<()> {
    let classifier = Classifier::new(config);
    let mut unsupported = None;

    for file in files {
        match classifier.classify(file) {
            Ok(kind) => println!("{:<8}  {}", kind.name(), file.display()),
            Err(e) => {
                println!("{:<8}  {}", "-", file.display());
                unsupported.get_or_insert(e);
            }
        }
    }

    match unsupported {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Warm the transcode cache for one animation and print the playable path.
pub fn transcode(config: Arc<Config>, file: &Path) -> Result<()> {
    let kind = Classifier::new(config.clone()).classify(file)?;
    if kind != MediaKind::AnimatedImage {
        bail!("igal transcode: {} is a {}, not an animation", file.display(), kind.name());
    }

    let transcoder = Arc::new(FfmpegTranscoder::from_config(&config));
    let cache = TranscodeCache::new(config, transcoder);
    let cached = cache
        .get(file)
        .with_context(|| format!("igal transcode: {}", file.display()))?;
    println!("{}", cached.display());
    Ok(())
}

// ── interactive session ─────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Next,
    Prev,
    First,
    Last,
    Random,
    Skip(isize),
    Reload,
    Rescan,
    Quit,
}

pub fn parse_command(line: &str) -> Option<Command> {
    let word = line.trim();
    let cmd = match word {
        "n" | "next" => Command::Next,
        "p" | "prev" => Command::Prev,
        "f" | "first" => Command::First,
        "l" | "last" => Command::Last,
        "r" | "random" => Command::Random,
        "pgdn" => Command::Skip(PAGE),
        "pgup" => Command::Skip(-PAGE),
        "reload" => Command::Reload,
        "rescan" => Command::Rescan,
        "q" | "quit" => Command::Quit,
        _ if word.starts_with('+') || word.starts_with('-') => {
            Command::Skip(word.parse::<isize>().ok()?)
        }
        _ => return None,
    };
    Some(cmd)
}

/// Open `target` on `nav`. Only an unsupported file ends the session; any
/// other display failure is logged and browsing continues, since the scan
/// is already running.
pub fn start<H: PresentationHost>(nav: &mut Navigator<H>, target: &Path) -> Result<()> {
    match nav.open(target) {
        Ok(()) => Ok(()),
        Err(e) if e.is_unsupported() => Err(e.into()),
        Err(e) => {
            warn!("session: {}", e);
            Ok(())
        }
    }
}

/// Open `target` and drive the navigator from stdin until `q` or EOF.
pub fn session(config: Arc<Config>, target: &Path) -> Result<()> {
    let mut nav = Navigator::new(config, ConsoleHost::stdout());
    start(&mut nav, target)?;

    let lines = spawn_stdin_reader();
    loop {
        if nav.poll() {
            debug!("session: ready, {}/{}", nav.index() + 1, nav.len());
        }

        let line = match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        };
        if line.trim().is_empty() {
            continue;
        }

        let cmd = match parse_command(&line) {
            Some(cmd) => cmd,
            None => {
                eprintln!(
                    "unknown command {:?} (n p f l r +N -N pgdn pgup reload rescan q)",
                    line.trim()
                );
                continue;
            }
        };

        let result = match cmd {
            Command::Next => nav.next(),
            Command::Prev => nav.prev(),
            Command::First => nav.first(),
            Command::Last => nav.last(),
            Command::Random => nav.random(),
            Command::Skip(n) => nav.skip_by(n),
            Command::Reload => nav.reload(),
            Command::Rescan => {
                nav.rescan();
                Ok(())
            }
            Command::Quit => return Ok(()),
        };

        match result {
            Ok(()) => debug!("session: {}/{}", nav.index() + 1, nav.len()),
            Err(e) if e.is_unsupported() => return Err(e.into()),
            Err(e) => warn!("session: {}", e),
        }
    }
}

/// Lines from stdin on a channel, so the session can keep polling while
/// nobody types.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    let spawned = thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("session: stdin: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        warn!("session: failed to spawn stdin reader: {}", e);
    }
    rx
}

/// Exit status for a failed run: 3 for an unsupported file, 1 otherwise.
pub fn exit_status(err: &anyhow::Error) -> u8 {
    let unsupported = err.chain().any(|cause| {
        cause.downcast_ref::<ClassifyError>().is_some()
            || cause
                .downcast_ref::<NavError>()
                .is_some_and(NavError::is_unsupported)
    });
    if unsupported {
        3
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_commands() {
        assert_eq!(parse_command("n"), Some(Command::Next));
        assert_eq!(parse_command("next\n"), Some(Command::Next));
        assert_eq!(parse_command(" p "), Some(Command::Prev));
        assert_eq!(parse_command("first"), Some(Command::First));
        assert_eq!(parse_command("l"), Some(Command::Last));
        assert_eq!(parse_command("random"), Some(Command::Random));
        assert_eq!(parse_command("reload"), Some(Command::Reload));
        assert_eq!(parse_command("rescan"), Some(Command::Rescan));
        assert_eq!(parse_command("q"), Some(Command::Quit));
    }

    #[test]
    fn parses_skips() {
        assert_eq!(parse_command("+3"), Some(Command::Skip(3)));
        assert_eq!(parse_command("-12"), Some(Command::Skip(-12)));
        assert_eq!(parse_command("pgdn"), Some(Command::Skip(10)));
        assert_eq!(parse_command("pgup"), Some(Command::Skip(-10)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_command("jump"), None);
        assert_eq!(parse_command("+x"), None);
        assert_eq!(parse_command("-"), None);
    }

    #[test]
    fn unsupported_maps_to_status_3() {
        let err: anyhow::Error = ClassifyError::UnsupportedKind("a.txt".into()).into();
        assert_eq!(exit_status(&err), 3);

        let nav: anyhow::Error =
            NavError::from(ClassifyError::UnsupportedKind("a.txt".into())).into();
        assert_eq!(exit_status(&nav.context("igal: a.txt")), 3);

        assert_eq!(exit_status(&anyhow::anyhow!("boom")), 1);
    }

    fn console_navigator(config: Config) -> Navigator<ConsoleHost<Vec<u8>>> {
        Navigator::new(Arc::new(config), ConsoleHost::new(Vec::new()))
    }

    #[test]
    fn start_survives_undecodable_first_still() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.jpg");
        let good = dir.path().join("good.jpg");
        std::fs::write(&bad, b"not a jpeg").unwrap();
        std::fs::write(&good, b"x").unwrap();

        let mut nav = console_navigator(Config::default());
        start(&mut nav, &bad).unwrap();
        assert!(nav.wait_ready(Duration::from_secs(10)));
        assert_eq!(nav.len(), 2);
    }

    #[test]
    fn start_survives_missing_transcoder() {
        let dir = tempfile::tempdir().unwrap();
        let anim = dir.path().join("anim.gif");
        std::fs::write(&anim, b"GIF89a").unwrap();

        let config = Config {
            ffmpeg: dir.path().join("no-such-ffmpeg"),
            ..Config::default()
        };
        let mut nav = console_navigator(config);
        start(&mut nav, &anim).unwrap();
        assert!(nav.wait_ready(Duration::from_secs(10)));
        assert!(nav.is_ready());
    }

    #[test]
    fn start_fails_on_unsupported_target() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, b"x").unwrap();

        let mut nav = console_navigator(Config::default());
        let err = start(&mut nav, &notes).unwrap_err();
        assert_eq!(exit_status(&err), 3);
    }

    #[test]
    fn classify_reports_unsupported_after_printing_all() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.jpg");
        let bad = dir.path().join("b.txt");
        std::fs::write(&good, b"x").unwrap();
        std::fs::write(&bad, b"x").unwrap();

        let err = classify(Arc::new(Config::default()), &[good, bad]).unwrap_err();
        assert_eq!(exit_status(&err), 3);
    }
}
