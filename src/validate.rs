//! Advisory checks over a whole config. Nothing here blocks a save.

use std::collections::HashMap;
use std::fmt;

use crate::directives;
use crate::model::{Config, Host, SshOption};
use crate::parser::{self, LineKind};

const MASTER_ENABLED: &[&str] = &["yes", "ask", "auto", "autoask"];

/// A semantic problem worth showing to the user.
///
/// `host` is the index of the offending block, or `None` for global lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub host: Option<usize>,
    pub message: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub fn validate(config: &Config) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let globals: Vec<SshOption> = config
        .preamble()
        .iter()
        .filter_map(|line| match parser::classify(line) {
            LineKind::Directive(option) => Some(option),
            _ => None,
        })
        .collect();
    check_options("Global options", None, &globals, &mut warnings);

    let mut seen: HashMap<Vec<&str>, usize> = HashMap::new();
    for (idx, host) in config.hosts().iter().enumerate() {
        if host.patterns().is_empty() {
            warnings.push(ValidationWarning {
                host: Some(idx),
                message: format!("Host block #{} has no patterns", idx + 1),
            });
        } else {
            let mut key: Vec<&str> = host.patterns().iter().map(String::as_str).collect();
            key.sort_unstable();
            key.dedup();
            if let Some(first) = seen.get(&key) {
                warnings.push(ValidationWarning {
                    host: Some(idx),
                    message: format!(
                        "Duplicate host patterns '{}' (also defined in block #{})",
                        host.label(),
                        first + 1
                    ),
                });
            } else {
                seen.insert(key, idx);
            }
        }

        let label = format!("Host '{}'", host.label());
        check_options(&label, Some(idx), host.options(), &mut warnings);
        check_multiplexing(&label, idx, host, &mut warnings);
    }

    tracing::debug!(warnings = warnings.len(), "validated ssh config");
    warnings
}

fn check_options(
    label: &str,
    host: Option<usize>,
    options: &[SshOption],
    warnings: &mut Vec<ValidationWarning>,
) {
    let mut push = |message: String| warnings.push(ValidationWarning { host, message });
    let mut counts: Vec<(String, &str, usize)> = Vec::new();

    for option in options {
        let key = option.key();
        let value = option.value();

        match counts
            .iter_mut()
            .find(|(lower, _, _)| lower.eq_ignore_ascii_case(key))
        {
            Some((_, _, count)) => *count += 1,
            None => counts.push((key.to_lowercase(), key, 1)),
        }

        if value.is_empty() {
            push(format!("{label}: {key} has no value"));
            continue;
        }

        if let Some((min, max)) = directives::numeric_range(key) {
            match value.parse::<i64>() {
                Err(_) => push(format!("{label}: {key} must be numeric, got '{value}'")),
                Ok(n) if n < min || max.is_some_and(|max| n > max) => {
                    let range = match max {
                        Some(max) => format!("{min}-{max}"),
                        None => format!(">= {min}"),
                    };
                    push(format!("{label}: {key} {value} is outside {range}"));
                }
                Ok(_) => {}
            }
        }

        if let Some(allowed) = directives::allowed_values(key) {
            let lowered = value.to_lowercase();
            if !allowed.contains(&lowered.as_str()) {
                push(format!(
                    "{label}: {key} has unexpected value '{value}' (expected one of: {})",
                    allowed.join(", ")
                ));
            }
        }
    }

    for (_, key, count) in counts {
        if count > 1 && !directives::is_multi_valued(key) {
            push(format!(
                "{label}: {key} is set {count} times; ssh only uses the first"
            ));
        }
    }
}

fn check_multiplexing(label: &str, idx: usize, host: &Host, warnings: &mut Vec<ValidationWarning>) {
    let master = host.get_option("ControlMaster").map(str::to_lowercase);
    let enabled = master
        .as_deref()
        .is_some_and(|value| MASTER_ENABLED.contains(&value));
    let path = host.get_option("ControlPath");

    if enabled {
        let message = match path {
            None => Some(format!(
                "{label}: ControlMaster is enabled but no ControlPath is set"
            )),
            Some(path) if path.eq_ignore_ascii_case("none") => Some(format!(
                "{label}: ControlMaster is enabled but ControlPath is none"
            )),
            Some(_) => None,
        };
        if let Some(message) = message {
            warnings.push(ValidationWarning {
                host: Some(idx),
                message,
            });
        }
        return;
    }

    for key in ["ControlPath", "ControlPersist"] {
        if host.get_option(key).is_some() {
            warnings.push(ValidationWarning {
                host: Some(idx),
                message: format!("{label}: {key} has no effect while ControlMaster is off"),
            });
        }
    }
}
