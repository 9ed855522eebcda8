//! Append-only prediction audit log.

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use crate::error::AuditWriteError;

/// Destination for one-line audit records.
pub trait AuditSink: Send + Sync {
    /// Appends `line` plus a newline as a single write.
    fn append(&self, line: &str) -> Result<(), AuditWriteError>;
}

/// Formats `<text>, <label>`.
///
/// Text containing a comma, a double quote, CR or LF is quoted: line breaks
/// become spaces and inner quotes are doubled, so each record stays on one line.
#[must_use]
pub fn format_audit_line(raw_text: &str, label: &str) -> String {
    if raw_text.contains([',', '"', '\r', '\n']) {
        let escaped = raw_text.replace(['\r', '\n'], " ").replace('"', "\"\"");
        format!("\"{escaped}\", {label}")
    } else {
        format!("{raw_text}, {label}")
    }
}

/// Audit log backed by a file opened in append mode.
///
/// The file is opened on first use and reopened after any failed write, so an
/// unwritable path only fails individual appends and recovers once it is fixed.
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileAuditSink {
    /// Targets `path` without touching the filesystem yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    /// Log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the log now if it is not open yet.
    pub fn ensure_open(&self) -> Result<(), AuditWriteError> {
        let mut slot = self.file.lock();
        if slot.is_none() {
            *slot = Some(self.open_file()?);
        }
        Ok(())
    }

    fn open_file(&self) -> Result<File, AuditWriteError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> AuditWriteError {
        AuditWriteError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl AuditSink for FileAuditSink {
    fn append(&self, line: &str) -> Result<(), AuditWriteError> {
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');
        let mut slot = self.file.lock();
        if slot.is_none() {
            *slot = Some(self.open_file()?);
        }
        let Some(file) = slot.as_mut() else {
            return Err(AuditWriteError::Unavailable(format!(
                "{} is not open",
                self.path.display()
            )));
        };
        let written = file.write_all(record.as_bytes()).and_then(|()| file.flush());
        if let Err(source) = written {
            *slot = None;
            return Err(self.io_error(source));
        }
        Ok(())
    }
}

/// In-memory sink for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    lines: Mutex<Vec<String>>,
    failing: bool,
}

impl MemoryAuditSink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every append fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            lines: Mutex::default(),
            failing: true,
        }
    }

    /// Lines appended so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, line: &str) -> Result<(), AuditWriteError> {
        if self.failing {
            return Err(AuditWriteError::Unavailable("sink configured to fail".into()));
        }
        self.lines.lock().push(line.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};
    use tempfile::tempdir;

    #[test]
    fn plain_text_is_written_verbatim() {
        assert_eq!(format_audit_line("so happy today", "Happy"), "so happy today, Happy");
    }

    #[test]
    fn special_characters_are_quoted() {
        assert_eq!(
            format_audit_line("well, \"fine\"\nthanks", "Neutral"),
            "\"well, \"\"fine\"\" thanks\", Neutral"
        );
        assert!(!format_audit_line("a\r\nb", "Sad").contains('\n'));
    }

    #[test]
    fn file_sink_appends_whole_lines_across_threads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/predictions.log");
        let sink = Arc::new(FileAuditSink::new(&path));
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for i in 0..50 {
                        sink.append(&format_audit_line(&format!("tweet {worker}-{i}"), "Happy"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 200);
        assert!(lines.iter().all(|line| line.starts_with("tweet ") && line.ends_with(", Happy")));
    }

    #[test]
    fn reopening_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        FileAuditSink::new(&path).append("one, Sad").unwrap();
        FileAuditSink::new(&path).append("two, Happy").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one, Sad\ntwo, Happy\n");
    }

    #[test]
    fn unwritable_path_fails_appends_and_recovers_later() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let path = blocker.join("predictions.log");

        let sink = FileAuditSink::new(&path);
        assert!(matches!(sink.ensure_open(), Err(AuditWriteError::Io { .. })));
        assert!(matches!(sink.append("lost, Sad"), Err(AuditWriteError::Io { .. })));

        fs::remove_file(&blocker).unwrap();
        sink.append("kept, Happy").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "kept, Happy\n");
    }

    #[test]
    fn memory_sink_records_and_fails_on_demand() {
        let sink = MemoryAuditSink::new();
        sink.append("x, Sad").unwrap();
        assert_eq!(sink.lines(), vec!["x, Sad".to_owned()]);
        assert!(MemoryAuditSink::failing().append("x, Sad").is_err());
    }
}
