use std::path::Path;

use ss_config::{Host, OpTag, diff};

use crate::app::constants::DIFF_CONTEXT_LINES;

/// Unified-style listing of the changes from `old` to `new`: `-` for removed
/// lines, `+` for added lines, `~` for the new side of a replacement.
/// Unchanged lines further than the context window from a change are folded.
pub(crate) fn render_diff(old: &[&str], new: &[&str]) -> Vec<String> {
    let opcodes = diff(old, new);
    if opcodes.iter().all(|opcode| opcode.tag == OpTag::Equal) {
        return Vec::new();
    }

    let mut lines = Vec::new();
    let last = opcodes.len().saturating_sub(1);
    for (idx, opcode) in opcodes.iter().enumerate() {
        match opcode.tag {
            OpTag::Equal => {
                let range = opcode.new.clone();
                let head = if idx == 0 { 0 } else { DIFF_CONTEXT_LINES };
                let tail = if idx == last { 0 } else { DIFF_CONTEXT_LINES };
                if range.len() > head + tail {
                    for line in range.start..range.start + head {
                        lines.push(format!("  {}", new[line]));
                    }
                    let start = range.end - tail;
                    lines.push(format!("@@ line {} @@", start + 1));
                    for line in start..range.end {
                        lines.push(format!("  {}", new[line]));
                    }
                } else {
                    for line in range {
                        lines.push(format!("  {}", new[line]));
                    }
                }
            }
            OpTag::Delete => {
                for line in opcode.old.clone() {
                    lines.push(format!("- {}", old[line]));
                }
            }
            OpTag::Insert => {
                for line in opcode.new.clone() {
                    lines.push(format!("+ {}", new[line]));
                }
            }
            OpTag::Replace => {
                for line in opcode.old.clone() {
                    lines.push(format!("- {}", old[line]));
                }
                for line in opcode.new.clone() {
                    lines.push(format!("~ {}", new[line]));
                }
            }
        }
    }
    lines
}

/// Splits file text into lines the way the config parser does.
pub(crate) fn text_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<&str> = text.split('\n').collect();
    if text.ends_with('\n') {
        lines.pop();
    }
    lines
}

/// Quotes argv elements that a shell would split or expand.
pub(crate) fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            let plain = !arg.is_empty()
                && arg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,~".contains(c));
            if plain {
                arg.clone()
            } else {
                format!("'{}'", arg.replace('\'', r"'\''"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `~/...` form of a path under the home directory, as ssh_config accepts.
pub(crate) fn home_relative(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            return format!("~/{}", rest.display());
        }
    }
    path.display().to_string()
}

/// One row of the host listing.
pub(crate) fn host_row(host: &Host) -> String {
    let hostname = host.get_option("HostName").unwrap_or("-");
    let user = host.get_option("User").unwrap_or("-");
    let port = host.get_option("Port").map(|port| format!(":{port}")).unwrap_or_default();
    format!("{:<24} {user}@{hostname}{port}", host.label())
}
