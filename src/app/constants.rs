pub(crate) const STATUS_READY: &str = "Ready";
pub(crate) const STATUS_NO_CHANGES: &str = "No changes to save";
pub(crate) const STATUS_DRY_RUN: &str = "Dry run: nothing was written";

pub(crate) const LOG_TIMESTAMP_FORMAT: &str = "%m-%d %H:%M:%S";
pub(crate) const LOG_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub(crate) const LOG_SEPARATOR: &str = " | ";

pub(crate) const LOG_RETENTION_DAYS: i64 = 7;
pub(crate) const LOG_MAX_ENTRIES: usize = 10_000;

// Unchanged lines shown around each change in a dry-run diff.
pub(crate) const DIFF_CONTEXT_LINES: usize = 2;

pub(crate) const NO_HOSTS_MESSAGE: &str = "No hosts";
pub(crate) const NO_WARNINGS_MESSAGE: &str = "No problems found";
pub(crate) const NO_BACKUPS_MESSAGE: &str = "No backups yet";
pub(crate) const NO_KEYS_MESSAGE: &str = "No private keys found";
