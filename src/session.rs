//! Per-host edit session: the snapshot a host is compared and reverted
//! against, and the set of form fields the user actually touched.
//!
//! A session never owns the host it edits. Callers pass the live
//! `&mut Host` borrowed from `Config::host_mut` into each operation, so two
//! sessions over two hosts share nothing.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::directives;
use crate::error::ParseError;
use crate::model::Host;
use crate::parser;
use crate::tracker::{self, Opcode};

/// Directive values treated as the protocol default, keyed by lowercase
/// directive name. Writing a default removes the directive instead.
const BUILTIN_DEFAULTS: &[(&str, &[&str])] = &[
    ("AddKeysToAgent", &["no"]),
    ("CanonicalizeHostname", &["no"]),
    ("Compression", &["no"]),
    ("ConnectTimeout", &["0"]),
    ("ControlMaster", &["no"]),
    ("ForwardAgent", &["no"]),
    ("GSSAPIAuthentication", &["no"]),
    ("KbdInteractiveAuthentication", &["yes"]),
    ("LogLevel", &["INFO"]),
    ("PasswordAuthentication", &["yes"]),
    ("PubkeyAuthentication", &["yes"]),
    ("RequestTTY", &["auto"]),
    ("ServerAliveCountMax", &["3"]),
    ("ServerAliveInterval", &["0"]),
    ("StrictHostKeyChecking", &["ask"]),
    ("TCPKeepAlive", &["yes"]),
    ("VerifyHostKeyDNS", &["no"]),
];

// Numeric fields the host form checks before allowing a save.
const FORM_NUMERIC_FIELDS: [&str; 3] = ["Port", "ServerAliveInterval", "ServerAliveCountMax"];

/// Which values count as "default" and are therefore omitted from output.
///
/// OpenSSH defaults differ between versions, so this is a policy table the
/// user may override rather than a statement about the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultPolicy {
    defaults: HashMap<String, Vec<String>>,
}

impl DefaultPolicy {
    pub fn builtin() -> Self {
        let defaults = BUILTIN_DEFAULTS
            .iter()
            .map(|(key, values)| {
                (
                    key.to_lowercase(),
                    values.iter().map(|value| value.to_lowercase()).collect(),
                )
            })
            .collect();
        Self { defaults }
    }

    /// An empty list for a key disables omission for that key.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, Vec<String>>) -> Self {
        for (key, values) in overrides {
            let values: Vec<String> = values.iter().map(|value| value.to_lowercase()).collect();
            if values.is_empty() {
                self.defaults.remove(&key.to_lowercase());
            } else {
                self.defaults.insert(key.to_lowercase(), values);
            }
        }
        self
    }

    pub fn is_default(&self, key: &str, value: &str) -> bool {
        self.defaults
            .get(&key.to_lowercase())
            .is_some_and(|values| values.iter().any(|default| default.eq_ignore_ascii_case(value)))
    }

    pub fn defaults_for(&self, key: &str) -> &[String] {
        self.defaults
            .get(&key.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self::builtin()
    }
}

/// A form field of the structured host editor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    Patterns,
    Directive(String),
}

impl Field {
    /// A directive field, spelled the documented way when the name is known.
    pub fn directive(name: &str) -> Self {
        Self::Directive(directives::display_name(name))
    }

    fn id(&self) -> String {
        match self {
            Self::Patterns => "\0patterns".to_string(),
            Self::Directive(name) => name.to_lowercase(),
        }
    }
}

/// A form-level problem that blocks saving this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct EditSession {
    original: Host,
    touched: BTreeSet<String>,
    policy: DefaultPolicy,
}

impl EditSession {
    pub fn begin(host: &Host) -> Self {
        Self::with_policy(host, DefaultPolicy::default())
    }

    pub fn with_policy(host: &Host, policy: DefaultPolicy) -> Self {
        Self {
            original: host.clone(),
            touched: BTreeSet::new(),
            policy,
        }
    }

    pub fn original(&self) -> &Host {
        &self.original
    }

    pub fn policy(&self) -> &DefaultPolicy {
        &self.policy
    }

    pub fn touch(&mut self, field: &Field) {
        self.touched.insert(field.id());
    }

    pub fn is_touched(&self, field: &Field) -> bool {
        self.touched.contains(&field.id())
    }

    pub fn has_touched_fields(&self) -> bool {
        !self.touched.is_empty()
    }

    /// Marks `field` touched and writes `value` into the host.
    pub fn edit_field(&mut self, host: &mut Host, field: Field, value: &str) {
        self.touch(&field);
        self.write_field(host, &field, value);
    }

    /// Writes the form values of touched fields only; untouched fields are
    /// never written, whatever the form holds.
    pub fn apply_fields(&self, host: &mut Host, values: &[(Field, String)]) {
        for (field, value) in values {
            if self.is_touched(field) {
                self.write_field(host, field, value);
            }
        }
    }

    fn write_field(&self, host: &mut Host, field: &Field, value: &str) {
        let value = value.trim();
        match field {
            Field::Patterns => host.set_patterns(value.split_whitespace()),
            Field::Directive(key) => {
                if value.is_empty() || self.policy.is_default(key, value) {
                    host.remove_option(key);
                } else {
                    host.set_option(key, value);
                }
            }
        }
    }

    /// Re-derives the whole host from raw text. The host is replaced only if
    /// the text parses; on error it is left exactly as it was.
    pub fn apply_raw<S: AsRef<str>>(&self, host: &mut Host, lines: &[S]) -> Result<(), ParseError> {
        let parsed = parser::parse_host(lines)?;
        *host = parsed;
        Ok(())
    }

    /// Problems that should block saving this host.
    pub fn field_errors(&self, host: &Host) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if host.patterns().is_empty() {
            errors.push(FieldError {
                field: Field::Patterns,
                message: "Host name (patterns) is required.".to_string(),
            });
        }
        for key in FORM_NUMERIC_FIELDS {
            let (Some(value), Some((min, max))) =
                (host.get_option(key), directives::numeric_range(key))
            else {
                continue;
            };
            let message = match value.parse::<i64>() {
                Err(_) => Some(format!("{key} must be numeric.")),
                Ok(n) if n < min || max.is_some_and(|max| n > max) => Some(match max {
                    Some(max) => format!("{key} must be between {min} and {max}."),
                    None => format!("{key} must be >= {min}."),
                }),
                Ok(_) => None,
            };
            if let Some(message) = message {
                errors.push(FieldError {
                    field: Field::directive(key),
                    message,
                });
            }
        }
        errors
    }

    pub fn is_dirty(&self, host: &Host) -> bool {
        tracker::host_is_dirty(host, &self.original)
    }

    /// Line diff of the host's text against the session snapshot.
    pub fn diff(&self, host: &Host) -> Vec<Opcode> {
        tracker::diff(self.original.raw_lines(), host.raw_lines())
    }

    /// Restores the snapshot and forgets which fields were touched.
    pub fn revert(&mut self, host: &mut Host) {
        *host = self.original.clone();
        self.touched.clear();
    }

    /// Adopts the host's current state as the new baseline, after a save.
    pub fn commit(&mut self, host: &Host) {
        self.original = host.clone();
        self.touched.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, parse_host};
    use crate::serializer::{serialize, serialize_host};
    use crate::tracker::OpTag;

    const TEXT: &str = "Host app\n    HostName app.internal\n    Port 22\n";

    #[test]
    fn untouched_fields_are_never_written() {
        let mut config = parse(TEXT, "/tmp/config").unwrap();
        let host = config.host_mut(0).unwrap();
        let session = EditSession::begin(host);
        let form = vec![
            (Field::Patterns, "app".to_string()),
            (Field::directive("HostName"), "app.internal".to_string()),
            (Field::directive("Port"), "22".to_string()),
            (Field::directive("TCPKeepAlive"), "yes".to_string()),
            (Field::directive("User"), String::new()),
        ];
        session.apply_fields(host, &form);
        assert!(!session.is_dirty(host));
        assert_eq!(serialize(&config), TEXT);
    }

    #[test]
    fn touched_field_is_written() {
        let mut host = parse_host(&["Host app", "    Port 22"]).unwrap();
        let mut session = EditSession::begin(&host);
        session.edit_field(&mut host, Field::directive("user"), " alice ");
        assert_eq!(host.get_option("User"), Some("alice"));
        assert_eq!(host.options()[1].key(), "User");
        assert!(session.is_touched(&Field::directive("USER")));
        assert!(session.is_dirty(&host));
    }

    #[test]
    fn default_value_is_omitted() {
        let mut host = parse_host(&["Host app", "    Port 22"]).unwrap();
        let mut session = EditSession::begin(&host);
        session.edit_field(&mut host, Field::directive("TCPKeepAlive"), "yes");
        assert_eq!(host.get_option("TCPKeepAlive"), None);
        assert!(!session.is_dirty(&host));

        session.edit_field(&mut host, Field::directive("TCPKeepAlive"), "no");
        assert_eq!(host.get_option("TCPKeepAlive"), Some("no"));

        session.edit_field(&mut host, Field::directive("TCPKeepAlive"), "YES");
        assert_eq!(host.get_option("TCPKeepAlive"), None);
    }

    #[test]
    fn policy_overrides_replace_builtin_defaults() {
        let mut overrides = BTreeMap::new();
        overrides.insert("PasswordAuthentication".to_string(), vec!["no".to_string()]);
        overrides.insert("TCPKeepAlive".to_string(), vec![]);
        let policy = DefaultPolicy::builtin().with_overrides(&overrides);
        assert!(policy.is_default("passwordauthentication", "no"));
        assert!(!policy.is_default("PasswordAuthentication", "yes"));
        assert!(!policy.is_default("TCPKeepAlive", "yes"));
        assert_eq!(policy.defaults_for("LogLevel"), &["info".to_string()]);
        assert!(policy.defaults_for("User").is_empty());
    }

    #[test]
    fn revert_is_indistinguishable_from_no_edit() {
        let mut host = parse_host(&["Host app", "  # keep", "    Port 22"]).unwrap();
        let original_lines = serialize_host(&host);
        let mut session = EditSession::begin(&host);
        session.edit_field(&mut host, Field::Patterns, "app app2");
        session.edit_field(&mut host, Field::directive("Port"), "2200");
        session.edit_field(&mut host, Field::directive("User"), "root");
        assert!(session.is_dirty(&host));

        session.revert(&mut host);
        assert!(!session.is_dirty(&host));
        assert!(!session.has_touched_fields());
        assert_eq!(serialize_host(&host), original_lines);
        assert_eq!(&host, session.original());
    }

    #[test]
    fn raw_edit_replaces_host_atomically() {
        let mut host = parse_host(&["Host app", "    Port 22"]).unwrap();
        let session = EditSession::begin(&host);
        session
            .apply_raw(&mut host, &["Host api", "    Port 2022", "    User svc"])
            .unwrap();
        assert_eq!(host.patterns(), &["api"]);
        assert_eq!(host.get_option("User"), Some("svc"));
        assert_eq!(host.raw_lines(), &["Host api", "    Port 2022", "    User svc"]);

        let before = host.clone();
        let err = session
            .apply_raw(&mut host, &["Port 1", "Host broken"])
            .unwrap_err();
        assert!(err.to_string().contains("No Host declaration found"));
        assert_eq!(host, before);
    }

    #[test]
    fn diff_reports_changed_lines() {
        let mut host = parse_host(&["Host app", "    Port 22", ""]).unwrap();
        let mut session = EditSession::begin(&host);
        session.edit_field(&mut host, Field::directive("Port"), "2222");
        let opcodes = session.diff(&host);
        assert!(
            opcodes
                .iter()
                .any(|opcode| opcode.tag == OpTag::Replace && opcode.new == (1..2))
        );
        session.commit(&host);
        assert!(!session.is_dirty(&host));
        assert!(session.diff(&host).iter().all(|opcode| opcode.tag == OpTag::Equal));
    }

    #[test]
    fn field_errors_flag_bad_numbers_and_missing_patterns() {
        let mut host = parse_host(&[
            "Host app",
            "  Port 70000",
            "  ServerAliveInterval soon",
            "  ServerAliveCountMax 0",
        ])
        .unwrap();
        let session = EditSession::begin(&host);
        let errors = session.field_errors(&host);
        let messages: Vec<&str> = errors.iter().map(|error| error.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Port must be between 1 and 65535.",
                "ServerAliveInterval must be numeric.",
                "ServerAliveCountMax must be >= 1.",
            ]
        );

        host.set_patterns(Vec::<String>::new());
        assert_eq!(session.field_errors(&host)[0].field, Field::Patterns);
    }
}
