//! Line-oriented parser for the ssh_config grammar.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ParseError};
use crate::model::{Config, Host, SshOption};

pub(crate) const NO_HOST_DECLARATION: &str = "No Host declaration found";
const EMPTY_HOST_LINE: &str = "Host declaration has no patterns";
const SECOND_HOST_LINE: &str = "Only one Host declaration is allowed per block";

/// How a single source line participates in the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LineKind {
    Blank,
    Comment,
    Host(Vec<String>),
    HostWithoutPatterns,
    Directive(SshOption),
    // Text that is neither a comment nor a `Key Value` pair, e.g. `=value`.
    Other,
}

pub(crate) fn classify(line: &str) -> LineKind {
    let content = line.trim_start();
    if content.trim_end().is_empty() {
        return LineKind::Blank;
    }
    if content.starts_with('#') {
        return LineKind::Comment;
    }
    let indentation = &line[..line.len() - content.len()];

    let key_end = content
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(content.len());
    let key = &content[..key_end];
    if key.is_empty() {
        return LineKind::Other;
    }

    let rest = &content[key_end..];
    let separator_len = separator_len(rest);
    let (separator, tail) = rest.split_at(separator_len);
    let value = tail.trim_end();
    let trailing = &tail[value.len()..];

    if key.eq_ignore_ascii_case("host") {
        let patterns: Vec<String> = value.split_whitespace().map(str::to_string).collect();
        if patterns.is_empty() {
            return LineKind::HostWithoutPatterns;
        }
        return LineKind::Host(patterns);
    }

    LineKind::Directive(SshOption::parsed(
        indentation,
        key,
        separator,
        value,
        trailing,
    ))
}

// Whitespace, at most one `=`, then whitespace again.
fn separator_len(rest: &str) -> usize {
    let after_space = rest.trim_start();
    let mut len = rest.len() - after_space.len();
    if let Some(after_eq) = after_space.strip_prefix('=') {
        len += 1;
        len += after_eq.len() - after_eq.trim_start().len();
    }
    len
}

/// Parses a whole file's text.
///
/// Lines before the first `Host` form the preamble; every later line belongs
/// to the most recent `Host` block.
pub fn parse(text: &str, path: impl Into<PathBuf>) -> Result<Config, ParseError> {
    let trailing_newline = text.is_empty() || text.ends_with('\n');
    let mut lines: Vec<&str> = if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    };
    if text.ends_with('\n') {
        lines.pop();
    }

    let mut preamble = Vec::new();
    let mut hosts = Vec::new();
    let mut current: Option<HostBuilder> = None;

    for (idx, line) in lines.iter().enumerate() {
        match classify(line) {
            LineKind::HostWithoutPatterns => {
                return Err(ParseError::at(idx + 1, EMPTY_HOST_LINE));
            }
            LineKind::Host(patterns) => {
                if let Some(builder) = current.take() {
                    hosts.push(builder.finish());
                }
                current = Some(HostBuilder::start(patterns, line));
            }
            kind => match current.as_mut() {
                Some(builder) => builder.push(line, kind),
                None => preamble.push((*line).to_string()),
            },
        }
    }
    if let Some(builder) = current {
        hosts.push(builder.finish());
    }

    tracing::debug!(
        hosts = hosts.len(),
        preamble_lines = preamble.len(),
        "parsed ssh config"
    );
    Ok(Config::from_parts(
        path.into(),
        preamble,
        hosts,
        trailing_newline,
    ))
}

/// Reads and parses `path`. A file that does not exist yet yields an empty
/// config bound to that path.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(text) => Ok(parse(&text, path)?),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "config file missing, starting empty");
            Ok(Config::new(path))
        }
        Err(err) => Err(ConfigError::io(
            format!("read {}", path.display()),
            err,
        )),
    }
}

/// Parses one host block, as typed into a raw-text editor.
///
/// Blank and comment lines may precede the `Host` line; anything else
/// before it is an error, as is a second `Host` line.
pub fn parse_host<S: AsRef<str>>(lines: &[S]) -> Result<Host, ParseError> {
    let mut builder: Option<HostBuilder> = None;
    let mut leading = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        match classify(line) {
            LineKind::HostWithoutPatterns => {
                return Err(ParseError::at(idx + 1, EMPTY_HOST_LINE));
            }
            LineKind::Host(patterns) => {
                if builder.is_some() {
                    return Err(ParseError::at(idx + 1, SECOND_HOST_LINE));
                }
                let mut started = HostBuilder::start(patterns, line);
                started.prepend(std::mem::take(&mut leading));
                builder = Some(started);
            }
            kind => match builder.as_mut() {
                Some(started) => started.push(line, kind),
                None if matches!(kind, LineKind::Blank | LineKind::Comment) => {
                    leading.push(line.to_string());
                }
                None => return Err(ParseError::at(idx + 1, NO_HOST_DECLARATION)),
            },
        }
    }

    builder
        .map(HostBuilder::finish)
        .ok_or_else(|| ParseError::new(NO_HOST_DECLARATION))
}

struct HostBuilder {
    patterns: Vec<String>,
    options: Vec<SshOption>,
    raw_lines: Vec<String>,
    header: usize,
}

impl HostBuilder {
    fn start(patterns: Vec<String>, line: &str) -> Self {
        Self {
            patterns,
            options: Vec::new(),
            raw_lines: vec![line.to_string()],
            header: 0,
        }
    }

    fn prepend(&mut self, leading: Vec<String>) {
        let shift = leading.len();
        self.header += shift;
        for option in &mut self.options {
            if let Some(line) = option.line.as_mut() {
                *line += shift;
            }
        }
        self.raw_lines.splice(0..0, leading);
    }

    fn push(&mut self, line: &str, kind: LineKind) {
        if let LineKind::Directive(mut option) = kind {
            option.line = Some(self.raw_lines.len());
            self.options.push(option);
        }
        self.raw_lines.push(line.to_string());
    }

    fn finish(self) -> Host {
        Host::from_parts(self.patterns, self.options, self.raw_lines, self.header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::serialize;

    #[test]
    fn classify_splits_key_separator_and_value() {
        let LineKind::Directive(option) = classify("  ProxyCommand  ssh -W %h:%p bastion  ") else {
            panic!("expected directive");
        };
        assert_eq!(option.key(), "ProxyCommand");
        assert_eq!(option.value(), "ssh -W %h:%p bastion");
        assert_eq!(option.indentation(), "  ");
        assert_eq!(option.to_string(), "  ProxyCommand  ssh -W %h:%p bastion  ");
    }

    #[test]
    fn classify_accepts_equals_syntax() {
        let LineKind::Directive(option) = classify("Port = 2222") else {
            panic!("expected directive");
        };
        assert_eq!(option.key(), "Port");
        assert_eq!(option.value(), "2222");
        assert_eq!(option.to_string(), "Port = 2222");
        assert_eq!(
            classify("Host=alpha beta"),
            LineKind::Host(vec!["alpha".into(), "beta".into()])
        );
    }

    #[test]
    fn classify_recognises_blank_comment_and_host() {
        assert_eq!(classify(""), LineKind::Blank);
        assert_eq!(classify("  \t"), LineKind::Blank);
        assert_eq!(classify("   # note"), LineKind::Comment);
        assert_eq!(classify("HOST a"), LineKind::Host(vec!["a".into()]));
        assert_eq!(classify("Host   "), LineKind::HostWithoutPatterns);
        assert_eq!(classify("=oops"), LineKind::Other);
        assert!(matches!(classify("HostName a"), LineKind::Directive(_)));
    }

    #[test]
    fn parse_builds_hosts_and_preamble() {
        let config = parse(
            "Include ~/.ssh/extra\n\nHost foo bar\n    HostName example.com\n    Port 22\n",
            "/tmp/config",
        )
        .unwrap();
        assert_eq!(config.preamble(), &["Include ~/.ssh/extra", ""]);
        assert_eq!(config.hosts().len(), 1);
        let host = &config.hosts()[0];
        assert_eq!(host.patterns(), &["foo", "bar"]);
        let pairs: Vec<(&str, &str)> = host
            .options()
            .iter()
            .map(|option| (option.key(), option.value()))
            .collect();
        assert_eq!(pairs, vec![("HostName", "example.com"), ("Port", "22")]);
        assert!(!config.is_dirty());
    }

    #[test]
    fn parse_keeps_quotes_verbatim() {
        let config = parse(
            "Host q\n  IdentityFile \"~/My Keys/id\"\n",
            "/tmp/config",
        )
        .unwrap();
        assert_eq!(
            config.hosts()[0].get_option("IdentityFile"),
            Some("\"~/My Keys/id\"")
        );
    }

    #[test]
    fn parse_rejects_host_without_patterns() {
        let err = parse("Host a\n  Port 1\nHost\n", "/tmp/config").unwrap_err();
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn parse_without_hosts_is_all_preamble() {
        let text = "# only globals\nServerAliveInterval 30\n";
        let config = parse(text, "/tmp/config").unwrap();
        assert!(config.hosts().is_empty());
        assert_eq!(serialize(&config), text);
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let samples = [
            "",
            "\n",
            "Host a",
            "Host a\n  Port 22",
            "Host foo\n    HostName example.com\n    Port 22\n",
            "# top\r\nHost win\r\n  User me\r\n",
            "Host a\n\tUser x\n\n\n# trailing\n\nHost b c\n  IdentityFile one\n  IdentityFile two\n",
            "Host=eq\n  Port=22\n  User = x  \n",
        ];
        for text in samples {
            let config = parse(text, "/tmp/config").unwrap();
            assert_eq!(serialize(&config), text, "round trip of {text:?}");
        }
    }

    #[test]
    fn parse_host_requires_host_line() {
        let err = parse_host(&["not a host line"]).unwrap_err();
        assert!(err.to_string().contains("No Host declaration found"));
        let err = parse_host::<&str>(&[]).unwrap_err();
        assert_eq!(err.message, NO_HOST_DECLARATION);
        let err = parse_host(&["# only a comment", ""]).unwrap_err();
        assert_eq!(err.message, NO_HOST_DECLARATION);
    }

    #[test]
    fn parse_host_allows_leading_comments() {
        let host = parse_host(&["# bastion", "Host jump", "  User ops"]).unwrap();
        assert_eq!(host.patterns(), &["jump"]);
        assert_eq!(host.raw_lines().len(), 3);
        assert_eq!(host.options()[0].line, Some(2));
    }

    #[test]
    fn parse_host_rejects_second_host_line() {
        let err = parse_host(&["Host a", "Host b"]).unwrap_err();
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn parse_file_missing_is_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        let config = parse_file(&path).unwrap();
        assert!(config.hosts().is_empty());
        assert_eq!(config.path(), path.as_path());
    }
}
