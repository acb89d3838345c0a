//! Saving a config: backup, atomic replace, then read-back verification.
//!
//! A save goes through three stages. The existing file is copied aside,
//! the new text is staged in a temp file next to the target and renamed
//! over it, and finally the target is re-read and re-parsed. Only when all
//! of that succeeds is the config's snapshot refreshed.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tempfile::NamedTempFile;

use crate::error::{ConfigError, Result};
use crate::model::Config;
use crate::parser;
use crate::serializer;

pub const DEFAULT_KEEP_BACKUPS: usize = 10;
const BACKUP_MARKER: &str = ".bak.";
const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Where backups go and how many are kept. `keep_backups == 0` keeps all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persister {
    backup_dir: Option<PathBuf>,
    keep_backups: usize,
}

impl Default for Persister {
    fn default() -> Self {
        Self {
            backup_dir: None,
            keep_backups: DEFAULT_KEEP_BACKUPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
    pub bytes: usize,
}

impl Persister {
    pub fn new(backup_dir: Option<PathBuf>, keep_backups: usize) -> Self {
        Self {
            backup_dir,
            keep_backups,
        }
    }

    pub fn keep_backups(&self) -> usize {
        self.keep_backups
    }

    /// Directory backups of `target` are written to.
    pub fn backup_dir_for(&self, target: &Path) -> PathBuf {
        match &self.backup_dir {
            Some(dir) => dir.clone(),
            None => parent_dir(target),
        }
    }

    /// Serializes `config` and replaces its file on disk.
    ///
    /// On any error the config keeps its snapshot, so it stays dirty.
    pub fn write(&self, config: &mut Config, backup: bool) -> Result<WriteReport> {
        if let Some(idx) = config
            .hosts()
            .iter()
            .position(|host| host.patterns().is_empty())
        {
            return Err(ConfigError::InvalidHost(format!(
                "host block #{} has no patterns",
                idx + 1
            )));
        }

        let path = config.path().to_path_buf();
        let text = serializer::serialize(config);

        let backup = if backup { self.backup(&path)? } else { None };

        stage(&path, &text)?.commit()?;
        verify_written(&path, &text)?;

        let reparsed = parser::parse_file(&path)?;
        if serializer::serialize(&reparsed) != text {
            tracing::warn!(path = %path.display(), "written config does not round-trip");
            return Err(ConfigError::Verification {
                path,
                reason: "re-parsed file does not serialize to the written text".to_string(),
            });
        }

        config.checkpoint();
        tracing::info!(
            path = %path.display(),
            bytes = text.len(),
            backup = ?backup,
            "saved ssh config"
        );
        Ok(WriteReport {
            path,
            backup,
            bytes: text.len(),
        })
    }

    /// Copies `target` aside. Returns `None` when there is nothing to back up.
    pub fn backup(&self, target: &Path) -> Result<Option<PathBuf>> {
        match fs::metadata(target) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ConfigError::io(
                    format!("inspect {}", target.display()),
                    err,
                ));
            }
        }

        let dir = self.backup_dir_for(target);
        fs::create_dir_all(&dir)
            .map_err(|err| ConfigError::io(format!("create backup dir {}", dir.display()), err))?;

        let stem = format!(
            "{}{}{}",
            file_name(target),
            BACKUP_MARKER,
            Local::now().format(STAMP_FORMAT)
        );
        let mut destination = dir.join(&stem);
        let mut n = 1;
        while destination.exists() {
            destination = dir.join(format!("{stem}-{n}"));
            n += 1;
        }

        fs::copy(target, &destination)
            .map_err(|err| ConfigError::io("create backup", err))?;
        tracing::info!(backup = %destination.display(), "backed up ssh config");

        self.rotate(target);
        Ok(Some(destination))
    }

    /// Backups of `target`, newest first.
    pub fn list_backups(&self, target: &Path) -> Result<Vec<PathBuf>> {
        let dir = self.backup_dir_for(target);
        let prefix = format!("{}{}", file_name(target), BACKUP_MARKER);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(ConfigError::io(
                    format!("list backups in {}", dir.display()),
                    err,
                ));
            }
        };

        let mut backups: Vec<(String, u32, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let suffix = name.strip_prefix(&prefix)?;
                let (stamp, n) = split_stamp(suffix)?;
                Some((stamp.to_string(), n, entry.path()))
            })
            .collect();
        backups.sort_by(|a, b| (&b.0, b.1).cmp(&(&a.0, a.1)));
        Ok(backups.into_iter().map(|(_, _, path)| path).collect())
    }

    fn rotate(&self, target: &Path) {
        if self.keep_backups == 0 {
            return;
        }
        let backups = match self.list_backups(target) {
            Ok(backups) => backups,
            Err(err) => {
                tracing::warn!(error = %err, "could not list backups for rotation");
                return;
            }
        };
        for old in backups.iter().skip(self.keep_backups) {
            match fs::remove_file(old) {
                Ok(()) => tracing::debug!(backup = %old.display(), "removed old backup"),
                Err(err) => {
                    tracing::warn!(backup = %old.display(), error = %err, "could not remove old backup");
                }
            }
        }
    }
}

// `YYYYmmdd-HHMMSS` optionally followed by `-N`.
fn split_stamp(suffix: &str) -> Option<(&str, u32)> {
    let stamp_len = "YYYYmmdd-HHMMSS".len();
    if suffix.len() < stamp_len || !suffix.is_char_boundary(stamp_len) {
        return None;
    }
    let (stamp, rest) = suffix.split_at(stamp_len);
    let digits = stamp.chars().filter(char::is_ascii_digit).count();
    if digits != stamp_len - 1 {
        return None;
    }
    if rest.is_empty() {
        return Some((stamp, 0));
    }
    let n = rest.strip_prefix('-')?.parse().ok()?;
    Some((stamp, n))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string())
}

/// New contents written and fsynced next to the target, not yet renamed
/// over it. Dropping it without `commit` deletes the temp file.
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.temp.persist(&target).map_err(|err| {
            ConfigError::io(format!("rename temp file over {}", target.display()), err.error)
        })?;

        #[cfg(unix)]
        if let Err(err) = fs::File::open(parent_dir(&target)).and_then(|dir| dir.sync_all()) {
            tracing::debug!(error = %err, "could not fsync config directory");
        }
        Ok(())
    }
}

/// Writes `contents` to a temp file in the target's directory, creating the
/// directory if needed. The temp file takes the target's permission bits,
/// or `0600` when the target does not exist yet.
pub fn stage(target: &Path, contents: &str) -> Result<StagedWrite> {
    let resolved = resolve_target(target);
    let target = resolved.as_path();
    let dir = parent_dir(target);
    fs::create_dir_all(&dir)
        .map_err(|err| ConfigError::io(format!("create {}", dir.display()), err))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".ss-config-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(|err| ConfigError::io(format!("create temp file in {}", dir.display()), err))?;
    temp.write_all(contents.as_bytes())
        .map_err(|err| ConfigError::io("write temp file", err))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| ConfigError::io("fsync temp file", err))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(target)
            .map(|meta| meta.permissions().mode() & 0o7777)
            .unwrap_or(0o600);
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(mode))
            .map_err(|err| ConfigError::io("set temp file permissions", err))?;
    }

    Ok(StagedWrite {
        temp,
        target: target.to_path_buf(),
    })
}

/// The file a write to `target` should replace. A symlinked config is
/// written through to the file it points at, so the link survives.
fn resolve_target(target: &Path) -> PathBuf {
    let is_link = fs::symlink_metadata(target).is_ok_and(|meta| meta.file_type().is_symlink());
    if !is_link {
        return target.to_path_buf();
    }
    let resolved = fs::canonicalize(target).or_else(|_| {
        fs::read_link(target).map(|link| {
            if link.is_relative() {
                parent_dir(target).join(link)
            } else {
                link
            }
        })
    });
    match resolved {
        Ok(resolved) => {
            tracing::debug!(link = %target.display(), target = %resolved.display(), "writing through symlink");
            resolved
        }
        Err(err) => {
            tracing::debug!(path = %target.display(), error = %err, "could not resolve symlink");
            target.to_path_buf()
        }
    }
}

/// Re-reads `path` and compares it byte for byte with `expected`.
pub fn verify_written(path: &Path, expected: &str) -> Result<()> {
    let actual = fs::read(path)
        .map_err(|err| ConfigError::io(format!("re-read {}", path.display()), err))?;
    if actual == expected.as_bytes() {
        return Ok(());
    }
    let reason = if actual.len() == expected.len() {
        "content differs from what was written".to_string()
    } else {
        format!(
            "expected {} bytes, found {}",
            expected.len(),
            actual.len()
        )
    };
    tracing::warn!(path = %path.display(), %reason, "write verification failed");
    Err(ConfigError::Verification {
        path: path.to_path_buf(),
        reason,
    })
}

/// Saves with the default backup policy.
pub fn write(config: &mut Config, backup: bool) -> Result<WriteReport> {
    Persister::default().write(config, backup)
}
