//! Line-delimited JSON trace output.
//!
//! [`TraceEmitter`] has two variants: [`TraceEmitter::Active`] writes to a
//! file or stdout, [`TraceEmitter::Disabled`] accepts every call and does
//! nothing. Callers hold a `TraceEmitter` unconditionally and never check
//! whether tracing is configured.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::TraceError;
use crate::types::AuthzEvent;

/// Destination value that selects the process standard output.
pub const STDOUT_DESTINATION: &str = "stdout";

/// Authorization trace sink.
#[derive(Debug, Clone, Default)]
pub enum TraceEmitter {
    Active(ActiveEmitter),
    #[default]
    Disabled,
}

impl TraceEmitter {
    /// Open a trace sink.
    ///
    /// `"stdout"` (any case) writes to standard output; any other value is a
    /// file path that is created or appended to.
    ///
    /// # Errors
    ///
    /// - [`TraceError::EmptyDestination`] if `destination` is empty
    /// - [`TraceError::Open`] if the file cannot be opened for appending
    pub fn open(destination: &str) -> Result<Self, TraceError> {
        ActiveEmitter::open(destination).map(Self::Active)
    }

    /// Build an emitter from an optional destination; `None` or a blank
    /// value yields [`TraceEmitter::Disabled`].
    ///
    /// # Errors
    ///
    /// Same as [`TraceEmitter::open`].
    pub fn from_output(output: Option<&str>) -> Result<Self, TraceError> {
        match output.filter(|dest| !dest.trim().is_empty()) {
            Some(dest) => Self::open(dest),
            None => Ok(Self::Disabled),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Append one event as a single JSON line. Does not flush.
    ///
    /// # Errors
    ///
    /// - [`TraceError::Closed`] after [`TraceEmitter::close`]
    /// - [`TraceError::Serialize`] / [`TraceError::Io`] on encoding or write failure
    pub fn emit(&self, event: &AuthzEvent) -> Result<(), TraceError> {
        match self {
            Self::Active(active) => active.emit(event),
            Self::Disabled => Ok(()),
        }
    }

    /// Push buffered lines to the sink. A no-op once closed.
    ///
    /// # Errors
    ///
    /// [`TraceError::Io`] if the underlying write fails.
    pub fn flush(&self) -> Result<(), TraceError> {
        match self {
            Self::Active(active) => active.flush(),
            Self::Disabled => Ok(()),
        }
    }

    /// Flush and release the sink. Standard output is never closed.
    /// Calling `close` again succeeds without doing anything.
    ///
    /// # Errors
    ///
    /// [`TraceError::Io`] if the final flush fails. The emitter is closed
    /// regardless.
    pub fn close(&self) -> Result<(), TraceError> {
        match self {
            Self::Active(active) => active.close(),
            Self::Disabled => Ok(()),
        }
    }
}

/// Shared handle to an open trace sink. Clones write to the same sink.
#[derive(Clone)]
pub struct ActiveEmitter {
    destination: Arc<str>,
    state: Arc<Mutex<Option<BufWriter<Sink>>>>,
}

enum Sink {
    Stdout(Stdout),
    File(File),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(out) => out.write(buf),
            Self::File(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(out) => out.flush(),
            Self::File(file) => file.flush(),
        }
    }
}

impl ActiveEmitter {
    fn open(destination: &str) -> Result<Self, TraceError> {
        if destination.is_empty() {
            return Err(TraceError::EmptyDestination);
        }

        let sink = if destination.eq_ignore_ascii_case(STDOUT_DESTINATION) {
            Sink::Stdout(io::stdout())
        } else {
            Sink::File(open_append(destination).map_err(|source| TraceError::Open {
                path: PathBuf::from(destination),
                source,
            })?)
        };

        tracing::debug!(destination, "authz trace output opened");

        Ok(Self {
            destination: Arc::from(destination),
            state: Arc::new(Mutex::new(Some(BufWriter::new(sink)))),
        })
    }

    /// Destination this emitter was opened with.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    fn emit(&self, event: &AuthzEvent) -> Result<(), TraceError> {
        // Encode outside the lock; a line is written with a single call
        // under it so concurrent emits never interleave.
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut state = self.state.lock();
        let writer = state.as_mut().ok_or(TraceError::Closed)?;
        writer.write_all(&line)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), TraceError> {
        let mut state = self.state.lock();
        match state.as_mut() {
            Some(writer) => Ok(writer.flush()?),
            None => Ok(()),
        }
    }

    fn close(&self) -> Result<(), TraceError> {
        let taken = self.state.lock().take();
        let Some(mut writer) = taken else {
            return Ok(());
        };
        writer.flush()?;
        // Dropping the writer closes a file sink; a stdout handle only
        // releases its reference.
        drop(writer);
        Ok(())
    }
}

impl std::fmt::Debug for ActiveEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveEmitter")
            .field("destination", &self.destination)
            .field("closed", &self.state.lock().is_none())
            .finish()
    }
}

fn open_append(path: &str) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::types::{Action, Actor, Decision, Outcome, Target};

    fn sample_event(principal: &str) -> AuthzEvent {
        AuthzEvent::check(
            Actor::new(principal),
            Target::new("projects/test-project/secrets/prod-db-password"),
            Action::new("secretmanager.versions.access"),
            Decision::new(Outcome::Allow),
        )
    }

    #[test]
    fn emit_to_file_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authz.jsonl");
        let emitter = TraceEmitter::open(path.to_str().unwrap()).unwrap();

        emitter.emit(&sample_event("user:a@example.com")).unwrap();
        emitter.emit(&sample_event("user:b@example.com")).unwrap();
        emitter.flush().unwrap();

        let data = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = data.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuthzEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            first.actor.map(|a| a.principal).as_deref(),
            Some("user:a@example.com")
        );
        emitter.close().unwrap();
    }

    #[test]
    fn emit_is_buffered_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffered.jsonl");
        let emitter = TraceEmitter::open(path.to_str().unwrap()).unwrap();

        emitter.emit(&sample_event("user:a@example.com")).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 0);

        emitter.flush().unwrap();
        assert!(!std::fs::read(&path).unwrap().is_empty());
    }

    #[test]
    fn open_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("append.jsonl");
        std::fs::write(&path, "{\"existing\":true}\n").unwrap();

        let emitter = TraceEmitter::open(path.to_str().unwrap()).unwrap();
        emitter.emit(&sample_event("user:a@example.com")).unwrap();
        emitter.close().unwrap();

        let data = std::fs::read_to_string(&path).unwrap();
        assert_eq!(data.lines().count(), 2);
        assert!(data.starts_with("{\"existing\":true}"));
    }

    #[test]
    fn empty_destination_is_rejected() {
        assert!(matches!(
            TraceEmitter::open(""),
            Err(TraceError::EmptyDestination)
        ));
    }

    #[test]
    fn unopenable_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("trace.jsonl");
        let err = TraceEmitter::open(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, TraceError::Open { .. }), "got {err}");
    }

    #[test]
    fn from_output_none_or_blank_is_disabled() {
        assert!(!TraceEmitter::from_output(None).unwrap().is_enabled());
        assert!(!TraceEmitter::from_output(Some("")).unwrap().is_enabled());
        assert!(!TraceEmitter::from_output(Some("  ")).unwrap().is_enabled());
    }

    #[test]
    fn stdout_destination_is_case_insensitive() {
        let emitter = TraceEmitter::from_output(Some("STDOUT")).unwrap();
        let TraceEmitter::Active(active) = &emitter else {
            panic!("expected active emitter");
        };
        assert_eq!(active.destination(), "STDOUT");
        emitter.close().unwrap();
        emitter.close().unwrap();
    }

    #[test]
    fn disabled_emitter_is_a_no_op() {
        let emitter = TraceEmitter::Disabled;
        emitter.emit(&sample_event("user:a@example.com")).unwrap();
        emitter.flush().unwrap();
        emitter.close().unwrap();
        emitter.close().unwrap();
    }

    #[test]
    fn close_is_idempotent_and_emit_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("closed.jsonl");
        let emitter = TraceEmitter::open(path.to_str().unwrap()).unwrap();

        emitter.emit(&sample_event("user:a@example.com")).unwrap();
        emitter.close().unwrap();
        emitter.close().unwrap();

        assert!(matches!(
            emitter.emit(&sample_event("user:b@example.com")),
            Err(TraceError::Closed)
        ));
        emitter.flush().unwrap();

        // the buffered line was flushed on close
        let data = std::fs::read_to_string(&path).unwrap();
        assert_eq!(data.lines().count(), 1);
    }

    #[test]
    fn concurrent_emits_never_interleave_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concurrent.jsonl");
        let emitter = TraceEmitter::open(path.to_str().unwrap()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let emitter = emitter.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let principal = format!("user:w{worker}-{i}@example.com");
                        emitter.emit(&sample_event(&principal)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        emitter.close().unwrap();

        let data = std::fs::read_to_string(&path).unwrap();
        let mut count = 0;
        for line in data.lines() {
            let ev: AuthzEvent = serde_json::from_str(line).unwrap();
            assert!(ev.actor.is_some());
            count += 1;
        }
        assert_eq!(count, 400);
    }
}
