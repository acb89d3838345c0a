use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use ss_config::serializer::render_host;
use ss_config::ssh::{self, KeygenRequest, Passphrase, expand_tilde};
use ss_config::{EditSession, Field, Host, parse, serialize, validate};

use crate::app::App;
use crate::app::constants::{
    NO_BACKUPS_MESSAGE, NO_HOSTS_MESSAGE, NO_KEYS_MESSAGE, NO_WARNINGS_MESSAGE, STATUS_DRY_RUN,
    STATUS_NO_CHANGES,
};
use crate::app::helpers::{home_relative, host_row, render_diff, shell_join, text_lines};
use crate::cli::{Commands, SaveArgs};
use crate::storage::default_keys_dir;

impl App {
    pub(crate) fn run(&mut self, command: Commands, out: &mut dyn Write) -> Result<()> {
        match command {
            Commands::List { query } => self.list_hosts(query.as_deref().unwrap_or_default(), out),
            Commands::Show { pattern, raw } => self.show_host(&pattern, raw, out),
            Commands::Add {
                patterns,
                set,
                save,
            } => self.add_host(&patterns, &set, save, out),
            Commands::Duplicate { pattern, save } => self.duplicate_host(&pattern, save, out),
            Commands::Remove { pattern, save } => self.remove_host(&pattern, save, out),
            Commands::Set {
                pattern,
                key,
                value,
                save,
            } => self.set_directive(&pattern, &key, &value, save, out),
            Commands::Unset { pattern, key, save } => {
                self.set_directive(&pattern, &key, "", save, out)
            }
            Commands::Edit {
                pattern,
                file,
                save,
            } => self.edit_raw(&pattern, &file, save, out),
            Commands::Validate => self.print_warnings(out),
            Commands::Check => self.check_round_trip(out),
            Commands::Backups => self.list_backups(out),
            Commands::Test { pattern, dry_run } => self.test_connection(&pattern, dry_run, out),
            Commands::Keys { dir } => self.list_keys(dir, out),
            Commands::Keygen {
                pattern,
                key_type,
                name,
                bits,
                comment,
                passphrase,
                dir,
                save,
            } => {
                let mut request = KeygenRequest::new(self.keys_dir_or(dir));
                request.key_type = key_type;
                request.rsa_bits = bits;
                request.name = name;
                if let Some(comment) = comment {
                    request.comment = comment;
                }
                if passphrase {
                    request.passphrase = Passphrase::Prompt;
                }
                self.generate_key(&pattern, &request, save, out)
            }
        }
    }

    fn host_index(&self, pattern: &str) -> Result<usize> {
        self.config
            .find_host(pattern)
            .ok_or_else(|| anyhow!("No host matches '{pattern}'"))
    }

    fn keys_dir_or(&self, dir: Option<PathBuf>) -> PathBuf {
        dir.map(|dir| expand_tilde(&dir.to_string_lossy()))
            .or_else(|| self.keys_dir.clone())
            .unwrap_or_else(default_keys_dir)
    }

    fn list_hosts(&self, query: &str, out: &mut dyn Write) -> Result<()> {
        let matches = self.config.filter_hosts(query);
        if matches.is_empty() {
            writeln!(out, "{NO_HOSTS_MESSAGE}")?;
        }
        for idx in matches {
            writeln!(out, "{}", host_row(&self.config.hosts()[idx]))?;
        }
        Ok(())
    }

    fn show_host(&self, pattern: &str, raw: bool, out: &mut dyn Write) -> Result<()> {
        let idx = self.host_index(pattern)?;
        let host = &self.config.hosts()[idx];
        if raw {
            write!(out, "{}", render_host(host))?;
            return Ok(());
        }
        writeln!(out, "Host {}", host.label())?;
        for option in host.options() {
            writeln!(out, "  {} {}", option.key(), option.value())?;
        }
        if let Some(command) = ssh::ssh_command(host) {
            writeln!(out, "Connect with: {command}")?;
        }
        for warning in validate(&self.config)
            .into_iter()
            .filter(|warning| warning.host == Some(idx))
        {
            writeln!(out, "warning: {warning}")?;
        }
        Ok(())
    }

    /// Runs `edit` inside an edit session for host `idx`. Field errors undo
    /// the edit and fail the command.
    fn edit_host<F>(&mut self, idx: usize, edit: F) -> Result<()>
    where
        F: FnOnce(&mut EditSession, &mut Host) -> Result<()>,
    {
        let policy = self.policy.clone();
        let host = self
            .config
            .host_mut(idx)
            .ok_or_else(|| anyhow!("Host #{} does not exist", idx + 1))?;
        let mut session = EditSession::with_policy(host, policy);
        edit(&mut session, host)?;

        let errors = session.field_errors(host);
        if errors.is_empty() {
            return Ok(());
        }
        session.revert(host);
        let messages = errors
            .iter()
            .map(|error| error.message.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        self.set_status(format!(
            "Reverted edit of {}: {messages}",
            session.original().label()
        ));
        bail!("{messages}")
    }

    fn add_host(
        &mut self,
        patterns: &[String],
        assignments: &[(String, String)],
        save: SaveArgs,
        out: &mut dyn Write,
    ) -> Result<()> {
        if let Some(taken) = patterns
            .iter()
            .find(|pattern| self.config.find_host(pattern).is_some())
        {
            bail!("Host '{taken}' already exists");
        }
        let idx = self.config.add_host(Host::new(patterns.iter().cloned()));
        self.edit_host(idx, |session, host| {
            for (key, value) in assignments {
                session.edit_field(host, Field::directive(key), value);
            }
            Ok(())
        })?;
        self.finish(format!("Added host {}", patterns.join(" ")), save, out)
    }

    fn duplicate_host(&mut self, pattern: &str, save: SaveArgs, out: &mut dyn Write) -> Result<()> {
        let idx = self.host_index(pattern)?;
        let original = &self.config.hosts()[idx];
        let mut copy = original.duplicate();
        let original_label = original.label();
        let patterns: Vec<String> = copy
            .patterns()
            .iter()
            .map(|pattern| self.config.unique_pattern(pattern))
            .collect();
        copy.set_patterns(patterns);
        let label = copy.label();
        self.config.add_host(copy);
        self.finish(format!("Duplicated {original_label} as {label}"), save, out)
    }

    fn remove_host(&mut self, pattern: &str, save: SaveArgs, out: &mut dyn Write) -> Result<()> {
        let idx = self.host_index(pattern)?;
        let removed = self
            .config
            .remove_host(idx)
            .ok_or_else(|| anyhow!("No host matches '{pattern}'"))?;
        self.finish(format!("Removed host {}", removed.label()), save, out)
    }

    fn set_directive(
        &mut self,
        pattern: &str,
        key: &str,
        value: &str,
        save: SaveArgs,
        out: &mut dyn Write,
    ) -> Result<()> {
        let idx = self.host_index(pattern)?;
        let field = Field::directive(key);
        let Field::Directive(name) = &field else {
            bail!("'{key}' is not a directive");
        };
        let name = name.clone();
        self.edit_host(idx, |session, host| {
            session.edit_field(host, field, value);
            Ok(())
        })?;

        let host = &self.config.hosts()[idx];
        let summary = match host.get_option(&name) {
            Some(current) => format!("Set {name}={current} on {}", host.label()),
            None => format!("Cleared {name} on {}", host.label()),
        };
        self.finish(summary, save, out)
    }

    fn edit_raw(
        &mut self,
        pattern: &str,
        file: &Path,
        save: SaveArgs,
        out: &mut dyn Write,
    ) -> Result<()> {
        let idx = self.host_index(pattern)?;
        let text = if file == Path::new("-") {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("read host block from stdin")?;
            text
        } else {
            fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?
        };
        let lines = text_lines(&text);
        self.edit_host(idx, |session, host| {
            session
                .apply_raw(host, lines.as_slice())
                .map_err(|err| anyhow!("Invalid host block: {err}"))
        })?;
        let label = self.config.hosts()[idx].label();
        self.finish(format!("Edited host {label}"), save, out)
    }

    /// Validates, then saves or (with `--dry-run`) prints the pending diff.
    fn finish(&mut self, summary: String, save: SaveArgs, out: &mut dyn Write) -> Result<()> {
        if !self.config.is_dirty() {
            self.status = STATUS_NO_CHANGES.to_string();
            writeln!(out, "{STATUS_NO_CHANGES}")?;
            return Ok(());
        }

        for warning in validate(&self.config) {
            writeln!(out, "warning: {warning}")?;
        }

        if save.dry_run {
            let on_disk = read_existing(self.config_path())?;
            let pending = serialize(&self.config);
            for line in render_diff(&text_lines(&on_disk), &text_lines(&pending)) {
                writeln!(out, "{line}")?;
            }
            self.status = STATUS_DRY_RUN.to_string();
            writeln!(out, "{STATUS_DRY_RUN}")?;
            return Ok(());
        }

        let backup = self.prefs.auto_backup && !save.no_backup;
        let report = match self.persister.write(&mut self.config, backup) {
            Ok(report) => report,
            Err(err) => {
                self.set_status(format!("Save failed: {err}"));
                return Err(err)
                    .with_context(|| format!("save {}", self.config.path().display()));
            }
        };
        if let Some(backup) = &report.backup {
            self.set_status(format!("Backup created at {}", backup.display()));
        }
        self.set_status(format!(
            "{summary}; saved {} ({} bytes)",
            report.path.display(),
            report.bytes
        ));
        writeln!(out, "{}", self.status)?;
        Ok(())
    }

    fn print_warnings(&self, out: &mut dyn Write) -> Result<()> {
        let warnings = validate(&self.config);
        if warnings.is_empty() {
            writeln!(out, "{NO_WARNINGS_MESSAGE}")?;
        }
        for warning in warnings {
            writeln!(out, "warning: {warning}")?;
        }
        Ok(())
    }

    fn check_round_trip(&self, out: &mut dyn Write) -> Result<()> {
        let path = self.config_path();
        let text = read_existing(path)?;
        let parsed =
            parse(&text, path).with_context(|| format!("parse {}", path.display()))?;
        let rendered = serialize(&parsed);
        if rendered == text {
            writeln!(
                out,
                "Round trip OK: {} hosts, {} bytes",
                parsed.hosts().len(),
                text.len()
            )?;
            return Ok(());
        }
        for line in render_diff(&text_lines(&text), &text_lines(&rendered)) {
            writeln!(out, "{line}")?;
        }
        bail!("{} does not survive a round trip", path.display())
    }

    fn list_backups(&self, out: &mut dyn Write) -> Result<()> {
        let backups = self.persister.list_backups(self.config_path())?;
        if backups.is_empty() {
            writeln!(out, "{NO_BACKUPS_MESSAGE}")?;
        }
        for backup in backups {
            writeln!(out, "{}", backup.display())?;
        }
        Ok(())
    }

    fn test_connection(&mut self, pattern: &str, dry_run: bool, out: &mut dyn Write) -> Result<()> {
        let idx = self.host_index(pattern)?;
        let host = &self.config.hosts()[idx];
        let label = host.label();
        let argv = ssh::connection_test_argv(host)
            .ok_or_else(|| anyhow!("Host '{label}' has no concrete target to connect to"))?;
        if dry_run {
            writeln!(out, "{}", shell_join(&argv))?;
            return Ok(());
        }

        let outcome = self
            .probe
            .probe(&argv)
            .with_context(|| format!("test connection to {label}"))?;
        self.set_status(format!("{label}: {}", outcome.summary()));
        writeln!(out, "{}", self.status)?;
        if !outcome.success {
            bail!("connection test for {label} failed");
        }
        Ok(())
    }

    fn list_keys(&self, dir: Option<PathBuf>, out: &mut dyn Write) -> Result<()> {
        let dir = self.keys_dir_or(dir);
        let keys = ssh::identity_candidates(&dir)?;
        if keys.is_empty() {
            writeln!(out, "{NO_KEYS_MESSAGE}")?;
        }
        for key in keys {
            let public = key
                .public
                .as_deref()
                .map_or_else(|| "(no .pub)".to_string(), home_relative);
            writeln!(out, "{}  {public}", home_relative(&key.private))?;
        }
        Ok(())
    }

    fn generate_key(
        &mut self,
        pattern: &str,
        request: &KeygenRequest,
        save: SaveArgs,
        out: &mut dyn Write,
    ) -> Result<()> {
        let idx = self.host_index(pattern)?;
        let key_path = self.keygen.generate(request).context("generate key")?;
        self.set_status(format!("Generated key {}", key_path.display()));
        writeln!(out, "{}", self.status)?;

        let identity = home_relative(&key_path);
        self.edit_host(idx, |session, host| {
            session.edit_field(host, Field::directive("IdentityFile"), &identity);
            Ok(())
        })?;
        let label = self.config.hosts()[idx].label();
        self.finish(format!("Set IdentityFile={identity} on {label}"), save, out)
    }
}

fn read_existing(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}
