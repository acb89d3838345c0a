//! The editable object graph of one ssh_config file: `SshOption` lines grouped
//! into `Host` blocks, owned by a `Config`.
//!
//! Every `Host` keeps two views of itself: the structured `patterns`/`options`
//! and the `raw_lines` it occupies in the file. Structured mutations splice
//! their change into `raw_lines` so that comments, blank lines and the
//! formatting of untouched directives survive an edit.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::parser::{self, LineKind};
use crate::serializer;
use crate::tracker;

/// Indentation used for directives created programmatically.
pub const DEFAULT_INDENT: &str = "    ";

/// One `Key Value` directive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshOption {
    key: String,
    value: String,
    indentation: String,
    separator: String,
    trailing: String,
    // Position in the owning host's raw_lines; None until the line is placed.
    pub(crate) line: Option<usize>,
}

impl SshOption {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into().trim().to_string(),
            indentation: DEFAULT_INDENT.to_string(),
            separator: " ".to_string(),
            trailing: String::new(),
            line: None,
        }
    }

    pub(crate) fn parsed(
        indentation: &str,
        key: &str,
        separator: &str,
        value: &str,
        trailing: &str,
    ) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            indentation: indentation.to_string(),
            separator: separator.to_string(),
            trailing: trailing.to_string(),
            line: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn indentation(&self) -> &str {
        &self.indentation
    }

    /// Case-insensitive key comparison, as ssh itself does.
    pub fn matches(&self, key: &str) -> bool {
        self.key.eq_ignore_ascii_case(key)
    }

    fn with_indentation(mut self, indentation: &str) -> Self {
        self.indentation = indentation.to_string();
        self
    }
}

impl fmt::Display for SshOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.indentation, self.key, self.separator, self.value, self.trailing
        )
    }
}

/// A `Host <pattern...>` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    patterns: Vec<String>,
    options: Vec<SshOption>,
    raw_lines: Vec<String>,
    // Index of the `Host` line inside raw_lines.
    header: usize,
}

impl Host {
    /// Creates a host block containing only its `Host` line.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let header_line = serializer::render_header(&patterns);
        Self {
            patterns,
            options: Vec::new(),
            raw_lines: vec![header_line],
            header: 0,
        }
    }

    pub(crate) fn from_parts(
        patterns: Vec<String>,
        options: Vec<SshOption>,
        raw_lines: Vec<String>,
        header: usize,
    ) -> Self {
        Self {
            patterns,
            options,
            raw_lines,
            header,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn options(&self) -> &[SshOption] {
        &self.options
    }

    pub fn raw_lines(&self) -> &[String] {
        &self.raw_lines
    }

    /// Patterns joined the way they appear on the `Host` line.
    pub fn label(&self) -> String {
        self.patterns.join(" ")
    }

    /// Value of the first directive named `key`; ssh uses the first match.
    pub fn get_option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|option| option.matches(key))
            .map(SshOption::value)
    }

    /// Values of every directive named `key`, in file order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.options
            .iter()
            .filter(move |option| option.matches(key))
            .map(SshOption::value)
    }

    /// Updates the first directive named `key` in place, or appends a new one.
    pub fn set_option(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if let Some(option) = self.options.iter_mut().find(|option| option.matches(key)) {
            if option.value == value {
                return;
            }
            option.value = value.to_string();
        } else {
            self.options.push(SshOption::new(key, value));
        }
        self.rebuild_raw_lines();
    }

    /// Removes every directive named `key` and returns how many were dropped.
    pub fn remove_option(&mut self, key: &str) -> usize {
        let before = self.options.len();
        self.options.retain(|option| !option.matches(key));
        let removed = before - self.options.len();
        if removed > 0 {
            self.rebuild_raw_lines();
        }
        removed
    }

    pub fn set_patterns<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        if patterns == self.patterns {
            return;
        }
        self.patterns = patterns;
        self.rebuild_raw_lines();
    }

    /// Copy of this block with every pattern suffixed `-copy`.
    pub fn duplicate(&self) -> Host {
        let mut copy = Host::new(self.patterns.iter().map(|pattern| format!("{pattern}-copy")));
        copy.options = self
            .options
            .iter()
            .map(|option| {
                SshOption::new(option.key.clone(), option.value.clone())
                    .with_indentation(&option.indentation)
            })
            .collect();
        copy.rebuild_raw_lines();
        copy
    }

    /// Switches every line of the block to CRLF endings.
    pub(crate) fn adopt_crlf(&mut self) {
        for line in &mut self.raw_lines {
            if !line.ends_with('\r') {
                line.push('\r');
            }
        }
        for option in &mut self.options {
            if option.line.is_some() && !option.trailing.ends_with('\r') {
                option.trailing.push('\r');
            }
        }
    }

    /// Prepends a blank separator line unless the block already starts with one.
    pub(crate) fn ensure_leading_blank(&mut self) {
        if self
            .raw_lines
            .first()
            .is_some_and(|line| !line.trim().is_empty())
        {
            self.raw_lines.insert(0, String::new());
            self.header += 1;
            for option in &mut self.options {
                if let Some(line) = option.line.as_mut() {
                    *line += 1;
                }
            }
        }
    }

    fn rebuild_raw_lines(&mut self) {
        let mut old = std::mem::take(&mut self.raw_lines);
        if old.is_empty() {
            old.push(serializer::render_header(&self.patterns));
            self.header = 0;
        }
        let header_index = self.header.min(old.len() - 1);

        let mut slots: Vec<Option<usize>> = vec![None; old.len()];
        let mut placed = vec![false; self.options.len()];
        for (idx, option) in self.options.iter().enumerate() {
            if let Some(line) = option.line.filter(|line| *line < old.len()) {
                if slots[line].is_none() {
                    slots[line] = Some(idx);
                    placed[idx] = true;
                }
            }
        }

        // New directives go after the last directive line of the block, ahead
        // of any trailing comments or blank lines.
        let anchor = old
            .iter()
            .enumerate()
            .rev()
            .find(|(idx, line)| *idx == header_index || is_directive(line))
            .map_or(header_index, |(idx, _)| idx);

        // Generated lines follow the block's line endings.
        let eol = if old.iter().any(|line| line.ends_with('\r')) { "\r" } else { "" };

        let mut lines = Vec::with_capacity(old.len() + 2);
        let mut header = 0;
        let mut last_content = 0;
        for (idx, line) in old.iter().enumerate() {
            if idx == header_index {
                header = lines.len();
                let unchanged = matches!(
                    parser::classify(line),
                    LineKind::Host(ref patterns) if *patterns == self.patterns
                );
                if unchanged {
                    lines.push(line.clone());
                } else {
                    lines.push(serializer::render_header(&self.patterns) + eol);
                }
                last_content = header;
            } else if let Some(option_idx) = slots[idx] {
                let option = &mut self.options[option_idx];
                option.line = Some(lines.len());
                last_content = lines.len();
                lines.push(option.to_string());
            } else if !is_directive(line) {
                lines.push(line.clone());
            }

            if idx == anchor {
                for (option_idx, option) in self.options.iter_mut().enumerate() {
                    if !placed[option_idx] {
                        if !option.trailing.ends_with('\r') {
                            option.trailing.push_str(eol);
                        }
                        option.line = Some(lines.len());
                        last_content = lines.len();
                        lines.push(option.to_string());
                    }
                }
            }
        }

        // Separate the block from the next one only when it ends on a
        // directive; trailing comments or blank lines are left alone.
        if !self.options.is_empty() && last_content + 1 == lines.len() {
            lines.push(eol.to_string());
        }

        self.raw_lines = lines;
        self.header = header;
    }
}

fn is_directive(line: &str) -> bool {
    matches!(parser::classify(line), LineKind::Directive(_))
}

/// State captured at load/save time for whole-file dirty detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub(crate) preamble: Vec<String>,
    pub(crate) hosts: Vec<Host>,
}

/// A whole ssh_config file.
#[derive(Debug, Clone)]
pub struct Config {
    path: PathBuf,
    preamble: Vec<String>,
    hosts: Vec<Host>,
    trailing_newline: bool,
    snapshot: Snapshot,
}

impl Config {
    /// An empty config that will be written to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            preamble: Vec::new(),
            hosts: Vec::new(),
            trailing_newline: true,
            snapshot: Snapshot::default(),
        }
    }

    pub(crate) fn from_parts(
        path: PathBuf,
        preamble: Vec<String>,
        hosts: Vec<Host>,
        trailing_newline: bool,
    ) -> Self {
        let mut config = Self {
            path,
            preamble,
            hosts,
            trailing_newline,
            snapshot: Snapshot::default(),
        };
        config.checkpoint();
        config
    }

    /// Reads and parses `path`; a missing file yields an empty config.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        parser::parse_file(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
    }

    pub fn preamble(&self) -> &[String] {
        &self.preamble
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn host(&self, index: usize) -> Option<&Host> {
        self.hosts.get(index)
    }

    /// Borrowed editing handle into the live host list.
    pub fn host_mut(&mut self, index: usize) -> Option<&mut Host> {
        self.hosts.get_mut(index)
    }

    /// Appends a host block and returns its index.
    pub fn add_host(&mut self, mut host: Host) -> usize {
        let previous = self
            .hosts
            .last()
            .map(Host::raw_lines)
            .unwrap_or(self.preamble.as_slice());
        if previous.last().is_some_and(|line| !line.trim().is_empty()) {
            host.ensure_leading_blank();
        }
        if previous.last().is_some_and(|line| line.ends_with('\r')) {
            host.adopt_crlf();
        }
        self.hosts.push(host);
        self.hosts.len() - 1
    }

    /// Puts a host back at `index` (clamped), e.g. to undo a removal.
    pub fn insert_host(&mut self, index: usize, host: Host) {
        let index = index.min(self.hosts.len());
        self.hosts.insert(index, host);
    }

    pub fn remove_host(&mut self, index: usize) -> Option<Host> {
        if index < self.hosts.len() {
            Some(self.hosts.remove(index))
        } else {
            None
        }
    }

    /// Index of the first host whose `Host` line lists `pattern` verbatim.
    pub fn find_host(&self, pattern: &str) -> Option<usize> {
        self.hosts
            .iter()
            .position(|host| host.patterns.iter().any(|candidate| candidate == pattern))
    }

    /// Indices of hosts whose patterns, HostName, User or IdentityFile
    /// contain `query` (case-insensitive). An empty query matches all hosts.
    pub fn filter_hosts(&self, query: &str) -> Vec<usize> {
        let query = query.trim().to_lowercase();
        self.hosts
            .iter()
            .enumerate()
            .filter(|(_, host)| {
                if query.is_empty() {
                    return true;
                }
                let searchable = format!(
                    "{} {} {} {}",
                    host.label(),
                    host.get_option("HostName").unwrap_or_default(),
                    host.get_option("User").unwrap_or_default(),
                    host.get_option("IdentityFile").unwrap_or_default(),
                )
                .to_lowercase();
                searchable.contains(&query)
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// `base`, or `base-N` with the smallest N not already used as a pattern.
    pub fn unique_pattern(&self, base: &str) -> String {
        let taken = |candidate: &str| {
            self.hosts
                .iter()
                .any(|host| host.patterns.iter().any(|pattern| pattern == candidate))
        };
        if !taken(base) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base}-{n}");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// First global directive named `key` from the lines before any `Host`.
    pub fn global_option(&self, key: &str) -> Option<String> {
        self.preamble.iter().find_map(|line| match parser::classify(line) {
            LineKind::Directive(option) if option.matches(key) => Some(option.value),
            _ => None,
        })
    }

    /// True when anything differs from the last load or successful save.
    pub fn is_dirty(&self) -> bool {
        tracker::config_is_dirty(self)
    }

    /// Discards every unsaved change.
    pub fn revert(&mut self) {
        self.preamble = self.snapshot.preamble.clone();
        self.hosts = self.snapshot.hosts.clone();
    }

    pub(crate) fn trailing_newline(&self) -> bool {
        self.trailing_newline
    }

    pub(crate) fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub(crate) fn checkpoint(&mut self) {
        self.snapshot = Snapshot {
            preamble: self.preamble.clone(),
            hosts: self.hosts.clone(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, parse_host};
    use crate::serializer::serialize;

    fn sample() -> Config {
        parse(
            "# global\nUser root\n\nHost web web.local\n    HostName 10.0.0.5\n    User deploy\n\n# databases\nHost db\n\tHostName db.internal\n\tIdentityFile ~/.ssh/db\n",
            "/tmp/config",
        )
        .unwrap()
    }

    #[test]
    fn get_option_is_case_insensitive_and_first_wins() {
        let host = parse_host(&[
            "Host a",
            "  IdentityFile ~/.ssh/one",
            "  identityfile ~/.ssh/two",
        ])
        .unwrap();
        assert_eq!(host.get_option("IDENTITYFILE"), Some("~/.ssh/one"));
        assert_eq!(
            host.get_all("IdentityFile").collect::<Vec<_>>(),
            vec!["~/.ssh/one", "~/.ssh/two"]
        );
    }

    #[test]
    fn set_option_updates_in_place_and_keeps_indentation() {
        let mut host = parse_host(&["Host a", "\tPort 22", "\tUser me"]).unwrap();
        host.set_option("port", "2222");
        assert_eq!(host.raw_lines(), &["Host a", "\tPort 2222", "\tUser me", ""]);
        assert_eq!(host.options()[0].key(), "Port");
    }

    #[test]
    fn set_option_with_same_value_changes_nothing() {
        let mut host = parse_host(&["Host a", "  Port 22"]).unwrap();
        let before = host.clone();
        host.set_option("Port", "22");
        assert_eq!(host, before);
    }

    #[test]
    fn new_option_lands_after_last_directive_before_comments() {
        let mut host =
            parse_host(&["Host a", "  # jump box", "  HostName a.example", "", "# next"]).unwrap();
        host.set_option("User", "ops");
        assert_eq!(
            host.raw_lines(),
            &[
                "Host a",
                "  # jump box",
                "  HostName a.example",
                "    User ops",
                "",
                "# next",
            ]
        );
    }

    #[test]
    fn remove_option_drops_every_duplicate() {
        let mut host = parse_host(&[
            "Host a",
            "  LocalForward 8080 localhost:80",
            "  # keep me",
            "  LocalForward 8443 localhost:443",
            "",
        ])
        .unwrap();
        assert_eq!(host.remove_option("localforward"), 2);
        assert_eq!(host.raw_lines(), &["Host a", "  # keep me", ""]);
        assert_eq!(host.remove_option("LocalForward"), 0);
    }

    #[test]
    fn set_patterns_rewrites_only_the_header() {
        let mut host = parse_host(&["Host   a", "  Port 22", ""]).unwrap();
        host.set_patterns(["a", "b"]);
        assert_eq!(host.raw_lines(), &["Host a b", "  Port 22", ""]);
        host.set_patterns(["a", "b"]);
        assert_eq!(host.raw_lines()[0], "Host a b");
    }

    #[test]
    fn duplicate_suffixes_patterns_and_copies_options() {
        let config = sample();
        let copy = config.hosts()[1].duplicate();
        assert_eq!(copy.patterns(), &["db-copy"]);
        assert_eq!(
            copy.raw_lines(),
            &[
                "Host db-copy",
                "\tHostName db.internal",
                "\tIdentityFile ~/.ssh/db",
                ""
            ]
        );
    }

    #[test]
    fn add_host_separates_from_previous_block() {
        let mut config = parse("Host a\n  Port 22\n", "/tmp/config").unwrap();
        let mut host = Host::new(["b"]);
        host.set_option("User", "bob");
        config.add_host(host);
        assert_eq!(
            serialize(&config),
            "Host a\n  Port 22\n\nHost b\n    User bob\n\n"
        );
        assert!(config.is_dirty());
    }

    #[test]
    fn remove_and_insert_restores_clean_state() {
        let mut config = sample();
        let removed = config.remove_host(0).unwrap();
        assert!(config.is_dirty());
        config.insert_host(0, removed);
        assert!(!config.is_dirty());
        assert!(config.remove_host(7).is_none());
    }

    #[test]
    fn edit_keeps_comment_that_introduces_next_host() {
        let text = "Host a\n  Port 22\n\n# production boxes\nHost b\n  User x\n";
        let mut config = parse(text, "/tmp/config").unwrap();
        config.host_mut(0).unwrap().set_option("Port", "2222");
        assert_eq!(
            serialize(&config),
            "Host a\n  Port 2222\n\n# production boxes\nHost b\n  User x\n"
        );

        let text = "Host a\n  Port 22\n# jump hosts\nHost b\n";
        let mut config = parse(text, "/tmp/config").unwrap();
        config.host_mut(0).unwrap().set_option("User", "ops");
        assert_eq!(
            serialize(&config),
            "Host a\n  Port 22\n    User ops\n# jump hosts\nHost b\n"
        );
    }

    #[test]
    fn match_inside_block_is_an_ordinary_directive() {
        let mut host =
            parse_host(&["Host a", "  User ops", "Match host a", "  Port 2222", ""]).unwrap();
        host.set_option("HostName", "a.example");
        assert_eq!(
            host.raw_lines(),
            &["Host a", "  User ops", "Match host a", "  Port 2222", "    HostName a.example", ""]
        );
        assert_eq!(host.get_option("match"), Some("host a"));
    }

    #[test]
    fn reordered_hosts_are_dirty() {
        let mut config = sample();
        let first = config.remove_host(0).unwrap();
        config.insert_host(1, first);
        assert_eq!(config.hosts()[0].patterns(), ["db"]);
        assert!(config.is_dirty());

        let moved = config.remove_host(1).unwrap();
        config.insert_host(0, moved);
        assert!(!config.is_dirty());
    }

    #[test]
    fn crlf_blocks_stay_crlf() {
        let mut config = parse("Host a\r\n  Port 22\r\n", "/tmp/config").unwrap();
        let host = config.host_mut(0).unwrap();
        host.set_option("User", "bob");
        host.set_patterns(["a", "b"]);
        assert_eq!(
            serialize(&config),
            "Host a b\r\n  Port 22\r\n    User bob\r\n\r\n"
        );

        let mut config = parse("Host a\r\n  Port 22\r\n", "/tmp/config").unwrap();
        let idx = config.add_host(Host::new(["c"]));
        config.host_mut(idx).unwrap().set_option("User", "x");
        assert_eq!(
            serialize(&config),
            "Host a\r\n  Port 22\r\n\r\nHost c\r\n    User x\r\n\r\n"
        );
    }

    #[test]
    fn filter_hosts_searches_patterns_and_common_fields() {
        let config = sample();
        assert_eq!(config.filter_hosts(""), vec![0, 1]);
        assert_eq!(config.filter_hosts("DEPLOY"), vec![0]);
        assert_eq!(config.filter_hosts(".ssh/db"), vec![1]);
        assert!(config.filter_hosts("nothing").is_empty());
    }

    #[test]
    fn unique_pattern_counts_up() {
        let mut config = Config::new("/tmp/config");
        assert_eq!(config.unique_pattern("new-host"), "new-host");
        config.add_host(Host::new(["new-host"]));
        config.add_host(Host::new(["new-host-1"]));
        assert_eq!(config.unique_pattern("new-host"), "new-host-2");
    }

    #[test]
    fn global_option_reads_preamble() {
        let config = sample();
        assert_eq!(config.global_option("user"), Some("root".to_string()));
        assert_eq!(config.global_option("Port"), None);
        assert_eq!(config.find_host("web.local"), Some(0));
    }

    #[test]
    fn revert_restores_snapshot() {
        let mut config = sample();
        config.host_mut(0).unwrap().set_option("Port", "2200");
        assert!(config.is_dirty());
        config.revert();
        assert!(!config.is_dirty());
        assert_eq!(config.hosts()[0].get_option("Port"), None);
    }
}
