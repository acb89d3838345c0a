use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::Datelike;

use crate::app::App;
use crate::app::constants::{
    LOG_MAX_ENTRIES, LOG_PARSE_FORMAT, LOG_RETENTION_DAYS, LOG_SEPARATOR, LOG_TIMESTAMP_FORMAT,
};

impl App {
    /// Updates the status line and records it in the activity log.
    pub(crate) fn set_status(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.status = message.clone();
        self.log_line(&message);
    }

    fn log_line(&self, message: &str) {
        let timestamp = chrono::Local::now().format(LOG_TIMESTAMP_FORMAT);
        let line = format!("{timestamp}{LOG_SEPARATOR}{message}");
        if let Some(parent) = self.log_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
        {
            Ok(mut file) => {
                if let Err(err) = writeln!(file, "{line}") {
                    tracing::debug!(path = %self.log_path.display(), error = %err, "activity log write failed");
                }
            }
            Err(err) => {
                tracing::debug!(path = %self.log_path.display(), error = %err, "activity log unavailable");
            }
        }
    }
}

/// Drops entries older than the retention window, and unparseable lines,
/// then caps the entry count. Returns how many lines were dropped.
pub(crate) fn prune_log_file(path: &Path) -> usize {
    let Ok(content) = fs::read_to_string(path) else {
        return 0;
    };
    let now = chrono::Local::now();
    let cutoff = now.naive_local() - chrono::Duration::days(LOG_RETENTION_DAYS);
    let year = now.year();
    let is_recent = |line: &&str| {
        line.split_once(LOG_SEPARATOR)
            .and_then(|(stamp, _)| {
                chrono::NaiveDateTime::parse_from_str(&format!("{year}-{stamp}"), LOG_PARSE_FORMAT)
                    .ok()
            })
            .is_some_and(|stamp| stamp >= cutoff)
    };

    let total = content.lines().count();
    let mut kept: Vec<&str> = content.lines().filter(is_recent).collect();
    let overflow = kept.len().saturating_sub(LOG_MAX_ENTRIES);
    kept.drain(..overflow);
    let dropped = total - kept.len();
    if dropped == 0 {
        return 0;
    }

    let result = if kept.is_empty() {
        fs::remove_file(path)
    } else {
        fs::write(path, kept.join("\n") + "\n")
    };
    if let Err(err) = result {
        tracing::debug!(path = %path.display(), error = %err, "could not prune activity log");
    }
    tracing::debug!(path = %path.display(), dropped, "pruned activity log");
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_log_file_removes_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.log");
        let now = chrono::Local::now().naive_local();
        let old = now - chrono::Duration::days(LOG_RETENTION_DAYS + 1);
        let recent = now - chrono::Duration::days(1);
        let old_line = format!("{}{}old", old.format(LOG_TIMESTAMP_FORMAT), LOG_SEPARATOR);
        let recent_line = format!(
            "{}{}recent",
            recent.format(LOG_TIMESTAMP_FORMAT),
            LOG_SEPARATOR
        );
        fs::write(&path, format!("{old_line}\n{recent_line}\ngarbage\n")).unwrap();
        assert_eq!(prune_log_file(&path), 2);
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("old"));
        assert!(!content.contains("garbage"));
        assert!(content.contains("recent"));
    }

    #[test]
    fn prune_log_file_deletes_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.log");
        fs::write(&path, "not a log line\n").unwrap();
        assert_eq!(prune_log_file(&path), 1);
        assert!(!path.exists());
        assert_eq!(prune_log_file(&path), 0);
    }

    #[test]
    fn set_status_appends_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::for_test(dir.path());
        app.set_status("Saved config");
        assert_eq!(app.status, "Saved config");
        let content = fs::read_to_string(&app.log_path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.trim_end().ends_with(" | Saved config"));
        assert_eq!(prune_log_file(&app.log_path), 0);
    }
}
