//! Turns the model back into ssh_config text.
//!
//! Hosts keep their `raw_lines` in sync with every structured edit, so the
//! serializer only has to stitch blocks together in model order.

use crate::model::{Config, Host};

/// The whole file: preamble first, then every host block in order.
pub fn serialize(config: &Config) -> String {
    let mut lines: Vec<&str> = config.preamble().iter().map(String::as_str).collect();
    for host in config.hosts() {
        lines.extend(host.raw_lines().iter().map(String::as_str));
    }

    let mut text = lines.join("\n");
    if config.trailing_newline() && !lines.is_empty() {
        text.push('\n');
    }
    tracing::debug!(
        hosts = config.hosts().len(),
        bytes = text.len(),
        "serialized ssh config"
    );
    text
}

/// The lines one host block occupies in the file.
pub fn serialize_host(host: &Host) -> Vec<String> {
    host.raw_lines().to_vec()
}

/// A host block as text for a raw editing pane, newline terminated.
pub fn render_host(host: &Host) -> String {
    let mut text = host.raw_lines().join("\n");
    text.push('\n');
    text
}

pub(crate) fn render_header(patterns: &[String]) -> String {
    if patterns.is_empty() {
        "Host".to_string()
    } else {
        format!("Host {}", patterns.join(" "))
    }
}
