use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ss_config::ssh::{ConnectionProbe, KeyGenerator, SshKeygen, SshProcessProbe};
use ss_config::{Config, DefaultPolicy, Persister};

use crate::app::constants::STATUS_READY;
use crate::app::logging::prune_log_file;
use crate::storage::{Preferences, load_or_init_preferences, log_path, preferences_path};

mod constants;
mod handlers;
mod helpers;
mod logging;

pub(crate) struct App {
    pub(crate) prefs: Preferences,
    pub(crate) config: Config,
    pub(crate) persister: Persister,
    pub(crate) policy: DefaultPolicy,
    pub(crate) log_path: PathBuf,
    pub(crate) status: String,
    pub(crate) keys_dir: Option<PathBuf>,
    pub(crate) probe: Arc<dyn ConnectionProbe>,
    pub(crate) keygen: Arc<dyn KeyGenerator>,
}

impl App {
    /// Loads preferences and the ssh config. `config_override` wins over the
    /// path stored in preferences.
    pub(crate) fn load(config_override: Option<PathBuf>) -> Result<Self> {
        let prefs_path = preferences_path()?;
        let prefs = load_or_init_preferences(&prefs_path)?;
        let log_path = log_path()?;
        prune_log_file(&log_path);

        let config_path = match config_override {
            Some(path) => ss_config::ssh::expand_tilde(&path.to_string_lossy()),
            None => prefs.ssh_config_path(),
        };
        let config = Config::load(&config_path)
            .with_context(|| format!("load {}", config_path.display()))?;
        tracing::debug!(path = %config_path.display(), hosts = config.hosts().len(), "loaded config");

        Ok(Self::with_parts(
            prefs,
            config,
            log_path,
            Arc::new(SshProcessProbe),
            Arc::new(SshKeygen),
        ))
    }

    fn with_parts(
        prefs: Preferences,
        config: Config,
        log_path: PathBuf,
        probe: Arc<dyn ConnectionProbe>,
        keygen: Arc<dyn KeyGenerator>,
    ) -> Self {
        let persister = prefs.persister();
        let policy = prefs.default_policy();
        Self {
            prefs,
            config,
            persister,
            policy,
            log_path,
            status: STATUS_READY.to_string(),
            keys_dir: None,
            probe,
            keygen,
        }
    }

    /// Config file path the app edits.
    pub(crate) fn config_path(&self) -> &Path {
        self.config.path()
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use ss_config::ConfigError;
    use ss_config::ssh::{ConnectionProbe, KeyGenerator, KeygenRequest, ProbeOutcome};

    #[derive(Default)]
    pub(crate) struct MockProbe {
        outcomes: Mutex<VecDeque<ProbeOutcome>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl MockProbe {
        pub(crate) fn push_outcome(&self, outcome: ProbeOutcome) {
            self.outcomes.lock().unwrap().push_back(outcome);
        }

        pub(crate) fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ConnectionProbe for MockProbe {
        fn probe(&self, argv: &[String]) -> ss_config::Result<ProbeOutcome> {
            self.calls.lock().unwrap().push(argv.to_vec());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ConfigError::External {
                    program: "ssh".to_string(),
                    message: "no outcome queued".to_string(),
                })
        }
    }

    #[derive(Default)]
    pub(crate) struct MockKeygen {
        requests: Mutex<Vec<KeygenRequest>>,
        error: Mutex<Option<String>>,
    }

    impl MockKeygen {
        pub(crate) fn set_error(&self, message: &str) {
            *self.error.lock().unwrap() = Some(message.to_string());
        }

        pub(crate) fn requests(&self) -> Vec<KeygenRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl KeyGenerator for MockKeygen {
        fn generate(&self, request: &KeygenRequest) -> ss_config::Result<PathBuf> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(message) = self.error.lock().unwrap().clone() {
                return Err(ConfigError::External {
                    program: "ssh-keygen".to_string(),
                    message,
                });
            }
            Ok(request.key_path())
        }
    }
}

#[cfg(test)]
impl App {
    /// App over `dir/config` with mock collaborators and a log inside `dir`.
    pub(crate) fn for_test(dir: &Path) -> Self {
        Self::for_test_with(
            dir,
            Arc::new(mocks::MockProbe::default()),
            Arc::new(mocks::MockKeygen::default()),
        )
    }

    pub(crate) fn for_test_with(
        dir: &Path,
        probe: Arc<dyn ConnectionProbe>,
        keygen: Arc<dyn KeyGenerator>,
    ) -> Self {
        let config = Config::load(dir.join("config")).unwrap();
        let mut app = Self::with_parts(
            Preferences::default(),
            config,
            dir.join("activity.log"),
            probe,
            keygen,
        );
        app.keys_dir = Some(dir.join("keys"));
        app
    }

    pub(crate) fn reload(&mut self) {
        self.config = Config::load(self.config.path()).unwrap();
    }
}
