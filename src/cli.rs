use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ss_config::ssh::{DEFAULT_RSA_BITS, KeyType};

#[derive(Parser, Debug)]
#[command(
    name = "ss-config",
    version,
    about = "Super simple SSH config editor",
    long_about = "Edits ~/.ssh/config host by host while keeping comments, spacing and order intact.\nEvery save makes a timestamped backup, writes atomically and re-reads the file to verify it.",
    after_help = "EXAMPLES:\n  List hosts:              ss-config list\n  Add a host:              ss-config add web -s HostName=10.0.0.5 -s User=deploy\n  Preview a change:        ss-config set web Port 2222 --dry-run\n  Test a connection:       ss-config test web"
)]
pub(crate) struct Cli {
    #[arg(
        short = 'c',
        long,
        value_name = "PATH",
        help = "SSH config file to edit [default: from preferences, else ~/.ssh/config]"
    )]
    pub(crate) config: Option<PathBuf>,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase log verbosity (-v, -vv); RUST_LOG is used otherwise"
    )]
    pub(crate) verbose: u8,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Args, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SaveArgs {
    #[arg(long, help = "Print the pending change as a diff instead of saving")]
    pub(crate) dry_run: bool,

    #[arg(long, help = "Do not back up the current file before saving")]
    pub(crate) no_backup: bool,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    #[command(about = "List hosts, optionally filtered by pattern, HostName, User or IdentityFile")]
    List { query: Option<String> },

    #[command(about = "Show one host block")]
    Show {
        pattern: String,
        #[arg(long, help = "Print the block exactly as it appears in the file")]
        raw: bool,
    },

    #[command(about = "Add a new host block")]
    Add {
        #[arg(required = true)]
        patterns: Vec<String>,
        #[arg(
            short = 's',
            long = "set",
            value_name = "KEY=VALUE",
            value_parser = parse_assignment,
            help = "Directive to set on the new host (repeatable)"
        )]
        set: Vec<(String, String)>,
        #[command(flatten)]
        save: SaveArgs,
    },

    #[command(about = "Copy a host block, suffixing its patterns with -copy")]
    Duplicate {
        pattern: String,
        #[command(flatten)]
        save: SaveArgs,
    },

    #[command(about = "Delete a host block")]
    Remove {
        pattern: String,
        #[command(flatten)]
        save: SaveArgs,
    },

    #[command(about = "Set a directive; a default value removes it instead")]
    Set {
        pattern: String,
        key: String,
        value: String,
        #[command(flatten)]
        save: SaveArgs,
    },

    #[command(about = "Remove every occurrence of a directive")]
    Unset {
        pattern: String,
        key: String,
        #[command(flatten)]
        save: SaveArgs,
    },

    #[command(about = "Replace a host block with raw text read from a file ('-' for stdin)")]
    Edit {
        pattern: String,
        #[arg(short = 'f', long, value_name = "PATH")]
        file: PathBuf,
        #[command(flatten)]
        save: SaveArgs,
    },

    #[command(about = "Report duplicate hosts, out-of-range values and similar problems")]
    Validate,

    #[command(about = "Check that the file on disk survives a parse and serialize unchanged")]
    Check,

    #[command(about = "List backups of the config file, newest first")]
    Backups,

    #[command(about = "Try a non-interactive connection to a host")]
    Test {
        pattern: String,
        #[arg(long, help = "Print the ssh command instead of running it")]
        dry_run: bool,
    },

    #[command(about = "List private keys in a directory [default: ~/.ssh]")]
    Keys {
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    #[command(about = "Generate a key with ssh-keygen and use it as the host's IdentityFile")]
    Keygen {
        pattern: String,
        #[arg(short = 't', long = "type", default_value = "ed25519")]
        key_type: KeyType,
        #[arg(long, help = "Key file name [default: id_<type>]")]
        name: Option<String>,
        #[arg(long, default_value_t = DEFAULT_RSA_BITS, help = "Key size for RSA keys")]
        bits: u32,
        #[arg(long, help = "Key comment [default: ss-config]")]
        comment: Option<String>,
        #[arg(long, help = "Prompt for a passphrase instead of leaving the key unencrypted")]
        passphrase: bool,
        #[arg(long, value_name = "DIR", help = "Where to create the key [default: ~/.ssh]")]
        dir: Option<PathBuf>,
        #[command(flatten)]
        save: SaveArgs,
    },
}

fn parse_assignment(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{input}'"))?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(format!("invalid directive name '{key}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
