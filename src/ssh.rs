//! Boundaries to the external ssh tooling: the batch-mode connection test
//! and key generation. The config model never interprets their output.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use crate::error::{ConfigError, Result};
use crate::model::Host;

pub const DEFAULT_RSA_BITS: u32 = 2048;
pub const DEFAULT_KEY_COMMENT: &str = "ss-config";

// Directives turned into dedicated ssh flags rather than `-o` options.
const FLAG_DIRECTIVES: &[&str] = &["Host", "HostName", "User", "Port", "IdentityFile", "ProxyJump"];

// Applied only when the host leaves them unset.
const TEST_DEFAULTS: &[(&str, &str)] = &[
    ("ConnectTimeout", "8"),
    ("StrictHostKeyChecking", "accept-new"),
    ("ControlMaster", "no"),
    ("ControlPath", "none"),
    ("ControlPersist", "no"),
];

const NOT_KEYS: &[&str] = &["config", "known_hosts", "authorized_keys"];

pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Result of running a connection test command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProbeOutcome {
    /// One line suitable for a status bar.
    pub fn summary(&self) -> String {
        if self.success {
            return "Connection succeeded".to_string();
        }
        let detail = self
            .stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .find(|line| !line.is_empty());
        match (detail, self.exit_code) {
            (Some(detail), _) => format!("Connection failed: {detail}"),
            (None, Some(code)) => format!("Connection failed (exit code {code})"),
            (None, None) => "Connection failed".to_string(),
        }
    }
}

pub trait ConnectionProbe: Send + Sync {
    fn probe(&self, argv: &[String]) -> Result<ProbeOutcome>;
}

/// Runs the argv as a child process with stdin closed.
#[derive(Debug, Default)]
pub struct SshProcessProbe;

impl ConnectionProbe for SshProcessProbe {
    fn probe(&self, argv: &[String]) -> Result<ProbeOutcome> {
        let (program, args) = argv.split_first().ok_or_else(|| ConfigError::External {
            program: "ssh".to_string(),
            message: "empty command".to_string(),
        })?;
        tracing::debug!(?argv, "running connection test");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| spawn_error(program, err))?;
        Ok(ProbeOutcome {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn spawn_error(program: &str, err: io::Error) -> ConfigError {
    if err.kind() == io::ErrorKind::NotFound {
        ConfigError::External {
            program: program.to_string(),
            message: format!("{program} not found"),
        }
    } else {
        ConfigError::io(format!("run {program}"), err)
    }
}

/// `ssh`, or `flatpak-spawn --host ssh` when running inside a Flatpak sandbox.
pub fn ssh_executable() -> Vec<String> {
    if std::env::var_os("FLATPAK_ID").is_some_and(|id| !id.is_empty()) {
        vec!["flatpak-spawn".into(), "--host".into(), "ssh".into()]
    } else {
        vec!["ssh".into()]
    }
}

fn is_concrete(pattern: &str) -> bool {
    !pattern.is_empty() && !pattern.starts_with('!') && !pattern.contains(['*', '?'])
}

/// Address a connection to this host should use: HostName, else the first
/// pattern. Wildcard-only hosts have no target.
pub fn connection_target(host: &Host) -> Option<String> {
    if let Some(hostname) = host.get_option("HostName").filter(|name| !name.is_empty()) {
        return Some(hostname.to_string());
    }
    host.patterns()
        .first()
        .filter(|pattern| is_concrete(pattern))
        .cloned()
}

/// The command a user would type to connect through the config file.
pub fn ssh_command(host: &Host) -> Option<String> {
    host.patterns()
        .iter()
        .find(|pattern| is_concrete(pattern))
        .map(|pattern| format!("ssh {pattern}"))
}

pub fn connection_test_argv(host: &Host) -> Option<Vec<String>> {
    connection_test_argv_with(host, &ssh_executable())
}

/// Non-interactive `ssh ... <target> exit` that fails fast instead of
/// prompting. Every host directive is passed explicitly so the test does
/// not depend on the file having been saved.
pub fn connection_test_argv_with(host: &Host, ssh_exec: &[String]) -> Option<Vec<String>> {
    let target = connection_target(host)?;
    let mut argv: Vec<String> = ssh_exec.to_vec();
    argv.extend(
        ["-q", "-T", "-o", "BatchMode=yes", "-o", "NumberOfPasswordPrompts=0"]
            .map(String::from),
    );

    let flags = [
        ("-l", "User"),
        ("-p", "Port"),
        ("-i", "IdentityFile"),
        ("-J", "ProxyJump"),
    ];
    for (flag, key) in flags {
        if let Some(value) = host.get_option(key).filter(|value| !value.is_empty()) {
            argv.push(flag.to_string());
            argv.push(value.to_string());
        }
    }

    let mut passed: Vec<String> = Vec::new();
    for option in host.options() {
        let key = option.key();
        if option.value().is_empty()
            || FLAG_DIRECTIVES.iter().any(|flag| flag.eq_ignore_ascii_case(key))
            || passed.iter().any(|seen| seen.eq_ignore_ascii_case(key))
        {
            continue;
        }
        passed.push(key.to_string());
        argv.push("-o".to_string());
        argv.push(format!("{key}={}", option.value()));
    }
    for (key, value) in TEST_DEFAULTS {
        if !passed.iter().any(|seen| seen.eq_ignore_ascii_case(key)) {
            argv.push("-o".to_string());
            argv.push(format!("{key}={value}"));
        }
    }

    argv.push(target);
    argv.push("exit".to_string());
    Some(argv)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyType {
    #[default]
    Ed25519,
    Rsa,
    Ecdsa,
}

impl KeyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::Rsa => "rsa",
            Self::Ecdsa => "ecdsa",
        }
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "ed25519" => Ok(Self::Ed25519),
            "rsa" => Ok(Self::Rsa),
            "ecdsa" => Ok(Self::Ecdsa),
            other => Err(format!("unsupported key type '{other}'")),
        }
    }
}

/// How a new private key is protected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Passphrase {
    /// Unencrypted key (`-N ""`).
    #[default]
    Empty,
    /// ssh-keygen asks on the controlling terminal, so the secret never
    /// shows up in an argument list.
    Prompt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeygenRequest {
    pub key_type: KeyType,
    pub rsa_bits: u32,
    pub directory: PathBuf,
    pub name: Option<String>,
    pub comment: String,
    pub passphrase: Passphrase,
}

impl KeygenRequest {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            key_type: KeyType::default(),
            rsa_bits: DEFAULT_RSA_BITS,
            directory: directory.into(),
            name: None,
            comment: DEFAULT_KEY_COMMENT.to_string(),
            passphrase: Passphrase::default(),
        }
    }

    /// First free path for the requested name (`id_<type>` by default),
    /// adding `_1`, `_2`, ... when the name is taken.
    pub fn key_path(&self) -> PathBuf {
        let base = self
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("id_{}", self.key_type.as_str()));
        let mut candidate = self.directory.join(&base);
        let mut n = 0;
        while candidate.exists() {
            n += 1;
            candidate = self.directory.join(format!("{base}_{n}"));
        }
        candidate
    }

    pub fn argv(&self, key_path: &Path) -> Vec<String> {
        let mut argv = vec![
            "ssh-keygen".to_string(),
            "-t".to_string(),
            self.key_type.as_str().to_string(),
        ];
        if self.key_type == KeyType::Rsa {
            argv.push("-b".to_string());
            argv.push(self.rsa_bits.to_string());
        }
        argv.extend(["-f".to_string(), key_path.display().to_string()]);
        if self.passphrase == Passphrase::Empty {
            argv.extend(["-N".to_string(), String::new()]);
        }
        argv.extend(["-C".to_string(), self.comment.clone()]);
        argv
    }
}

pub trait KeyGenerator: Send + Sync {
    /// Creates a key pair and returns the private key path.
    fn generate(&self, request: &KeygenRequest) -> Result<PathBuf>;
}

#[derive(Debug, Default)]
pub struct SshKeygen;

impl KeyGenerator for SshKeygen {
    fn generate(&self, request: &KeygenRequest) -> Result<PathBuf> {
        fs::create_dir_all(&request.directory).map_err(|err| {
            ConfigError::io(format!("create {}", request.directory.display()), err)
        })?;
        let key_path = request.key_path();
        let argv = request.argv(&key_path);
        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(match request.passphrase {
                Passphrase::Empty => Stdio::null(),
                Passphrase::Prompt => Stdio::inherit(),
            })
            .output()
            .map_err(|err| spawn_error("ssh-keygen", err))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ConfigError::External {
                program: "ssh-keygen".to_string(),
                message: if stderr.is_empty() {
                    format!("exited with {}", output.status)
                } else {
                    stderr
                },
            });
        }
        tracing::info!(key = %key_path.display(), "generated ssh key");
        Ok(key_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFile {
    pub private: PathBuf,
    pub public: Option<PathBuf>,
}

/// Private key candidates in `dir`, sorted by file name. A missing
/// directory has no keys.
pub fn identity_candidates(dir: &Path) -> Result<Vec<KeyFile>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(ConfigError::io(format!("list {}", dir.display()), err)),
    };

    let mut keys: Vec<KeyFile> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_none())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| !NOT_KEYS.contains(&name) && !name.starts_with('.'))
        })
        .map(|private| {
            let mut public = private.clone().into_os_string();
            public.push(".pub");
            let public = PathBuf::from(public);
            KeyFile {
                public: public.is_file().then_some(public),
                private,
            }
        })
        .collect();
    keys.sort_by(|a, b| a.private.cmp(&b.private));
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_host;

    fn ssh() -> Vec<String> {
        vec!["ssh".to_string()]
    }

    #[test]
    fn expand_tilde_uses_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde("~/.ssh/config"), home.join(".ssh/config"));
        assert_eq!(expand_tilde("~"), home);
        assert_eq!(expand_tilde("/etc/ssh"), PathBuf::from("/etc/ssh"));
    }

    #[test]
    fn test_argv_maps_flags_and_defaults() {
        let host = parse_host(&[
            "Host web",
            "    HostName 10.0.0.5",
            "    User deploy",
            "    Port 2222",
            "    IdentityFile ~/.ssh/web",
            "    ConnectTimeout 3",
            "    Compression yes",
            "    compression no",
        ])
        .unwrap();
        let argv = connection_test_argv_with(&host, &ssh()).unwrap();
        assert_eq!(
            argv,
            vec![
                "ssh",
                "-q",
                "-T",
                "-o",
                "BatchMode=yes",
                "-o",
                "NumberOfPasswordPrompts=0",
                "-l",
                "deploy",
                "-p",
                "2222",
                "-i",
                "~/.ssh/web",
                "-o",
                "ConnectTimeout=3",
                "-o",
                "Compression=yes",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-o",
                "ControlMaster=no",
                "-o",
                "ControlPath=none",
                "-o",
                "ControlPersist=no",
                "10.0.0.5",
                "exit",
            ]
        );
    }

    #[test]
    fn flatpak_prefix_is_kept_in_front() {
        let host = parse_host(&["Host jump"]).unwrap();
        let exec: Vec<String> = ["flatpak-spawn", "--host", "ssh"].map(String::from).to_vec();
        let argv = connection_test_argv_with(&host, &exec).unwrap();
        assert_eq!(&argv[..3], exec.as_slice());
        assert_eq!(&argv[argv.len() - 2..], ["jump", "exit"]);
    }

    #[test]
    fn wildcard_hosts_have_no_target() {
        let host = parse_host(&["Host *.internal", "  User ops"]).unwrap();
        assert_eq!(connection_target(&host), None);
        assert!(connection_test_argv_with(&host, &ssh()).is_none());
        assert_eq!(ssh_command(&host), None);

        let host = parse_host(&["Host * bastion"]).unwrap();
        assert_eq!(ssh_command(&host), Some("ssh bastion".to_string()));
    }

    #[test]
    fn probe_summary_prefers_stderr() {
        let outcome = ProbeOutcome {
            success: false,
            exit_code: Some(255),
            stdout: String::new(),
            stderr: "\nPermission denied (publickey).\n".to_string(),
        };
        assert_eq!(
            outcome.summary(),
            "Connection failed: Permission denied (publickey)."
        );
        let outcome = ProbeOutcome {
            stderr: String::new(),
            ..outcome
        };
        assert_eq!(outcome.summary(), "Connection failed (exit code 255)");
    }

    #[test]
    fn keygen_argv_matches_key_type() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = KeygenRequest::new(dir.path());
        let path = request.key_path();
        assert_eq!(path, dir.path().join("id_ed25519"));
        assert_eq!(
            request.argv(&path),
            vec![
                "ssh-keygen".to_string(),
                "-t".into(),
                "ed25519".into(),
                "-f".into(),
                path.display().to_string(),
                "-N".into(),
                String::new(),
                "-C".into(),
                "ss-config".into(),
            ]
        );

        request.key_type = "RSA".parse().unwrap();
        request.rsa_bits = 4096;
        let argv = request.argv(&path);
        assert_eq!(&argv[1..5], ["-t", "rsa", "-b", "4096"]);

        request.passphrase = Passphrase::Prompt;
        let argv = request.argv(&path);
        assert!(!argv.iter().any(|arg| arg == "-N"));
        assert_eq!(&argv[argv.len() - 2..], ["-C", "ss-config"]);
        assert!("dsa".parse::<KeyType>().is_err());
    }

    #[test]
    fn key_path_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("work"), "").unwrap();
        fs::write(dir.path().join("work_1"), "").unwrap();
        let mut request = KeygenRequest::new(dir.path());
        request.name = Some("work".to_string());
        assert_eq!(request.key_path(), dir.path().join("work_2"));
    }

    #[test]
    fn identity_candidates_pairs_public_keys() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["id_ed25519", "id_ed25519.pub", "legacy", "config", "known_hosts", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let keys = identity_candidates(dir.path()).unwrap();
        assert_eq!(
            keys,
            vec![
                KeyFile {
                    private: dir.path().join("id_ed25519"),
                    public: Some(dir.path().join("id_ed25519.pub")),
                },
                KeyFile {
                    private: dir.path().join("legacy"),
                    public: None,
                },
            ]
        );
        assert!(identity_candidates(&dir.path().join("missing")).unwrap().is_empty());
    }
}
