//! Static knowledge about ssh_config directives: canonical spelling, which
//! ones may repeat, and the value domains the validator checks.

const KNOWN_DIRECTIVES: &[&str] = &[
    "AddKeysToAgent",
    "AddressFamily",
    "BatchMode",
    "BindAddress",
    "CanonicalDomains",
    "CanonicalizeHostname",
    "CertificateFile",
    "CheckHostIP",
    "Ciphers",
    "Compression",
    "ConnectionAttempts",
    "ConnectTimeout",
    "ControlMaster",
    "ControlPath",
    "ControlPersist",
    "DynamicForward",
    "ForwardAgent",
    "ForwardX11",
    "GSSAPIAuthentication",
    "HostKeyAlgorithms",
    "HostName",
    "IdentitiesOnly",
    "IdentityAgent",
    "IdentityFile",
    "Include",
    "KbdInteractiveAuthentication",
    "LocalForward",
    "LogLevel",
    "Match",
    "NumberOfPasswordPrompts",
    "PasswordAuthentication",
    "Port",
    "PreferredAuthentications",
    "ProxyCommand",
    "ProxyJump",
    "PubkeyAuthentication",
    "RemoteCommand",
    "RemoteForward",
    "RequestTTY",
    "SendEnv",
    "ServerAliveCountMax",
    "ServerAliveInterval",
    "SetEnv",
    "StrictHostKeyChecking",
    "TCPKeepAlive",
    "User",
    "UserKnownHostsFile",
    "VerifyHostKeyDNS",
];

// ssh accumulates these instead of taking the first occurrence.
const MULTI_VALUED: &[&str] = &[
    "CertificateFile",
    "DynamicForward",
    "IdentityFile",
    "Include",
    "LocalForward",
    "Match",
    "RemoteForward",
    "SendEnv",
    "SetEnv",
];

/// Integer directives with an inclusive lower bound and optional upper bound.
pub(crate) const NUMERIC_RANGES: &[(&str, i64, Option<i64>)] = &[
    ("Port", 1, Some(65535)),
    ("ConnectTimeout", 0, None),
    ("ServerAliveInterval", 0, None),
    ("ServerAliveCountMax", 1, None),
    ("ConnectionAttempts", 1, None),
    ("NumberOfPasswordPrompts", 0, None),
];

const YES_NO: &[&str] = &["yes", "no"];

pub(crate) const ENUMERATED: &[(&str, &[&str])] = &[
    ("AddKeysToAgent", &["yes", "no", "ask", "confirm"]),
    ("BatchMode", YES_NO),
    ("CanonicalizeHostname", &["yes", "no", "always", "none"]),
    ("CheckHostIP", YES_NO),
    ("Compression", YES_NO),
    ("ControlMaster", &["yes", "no", "ask", "auto", "autoask"]),
    ("ForwardX11", YES_NO),
    ("GSSAPIAuthentication", YES_NO),
    ("IdentitiesOnly", YES_NO),
    ("KbdInteractiveAuthentication", YES_NO),
    (
        "LogLevel",
        &[
            "quiet", "fatal", "error", "info", "verbose", "debug", "debug1", "debug2", "debug3",
        ],
    ),
    ("PasswordAuthentication", YES_NO),
    ("PubkeyAuthentication", &["yes", "no", "unbound", "host-bound"]),
    ("RequestTTY", &["yes", "no", "force", "auto"]),
    ("StrictHostKeyChecking", &["yes", "no", "ask", "accept-new", "off"]),
    ("TCPKeepAlive", YES_NO),
    ("VerifyHostKeyDNS", &["yes", "no", "ask"]),
];

/// Returns the documented spelling of a directive, if it is one we know.
pub fn canonical_name(name: &str) -> Option<&'static str> {
    KNOWN_DIRECTIVES
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(name))
}

/// Spelling to use when writing a new directive line.
pub(crate) fn display_name(name: &str) -> String {
    canonical_name(name).map_or_else(|| name.to_string(), str::to_string)
}

pub(crate) fn is_multi_valued(name: &str) -> bool {
    MULTI_VALUED
        .iter()
        .any(|multi| multi.eq_ignore_ascii_case(name))
}

pub(crate) fn numeric_range(name: &str) -> Option<(i64, Option<i64>)> {
    NUMERIC_RANGES
        .iter()
        .find(|(key, _, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, min, max)| (*min, *max))
}

pub(crate) fn allowed_values(name: &str) -> Option<&'static [&'static str]> {
    ENUMERATED
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, values)| *values)
}
